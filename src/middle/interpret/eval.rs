//! Body evaluation
//!
//! Executes a body statement by statement over `Memory`. Every local gets
//! its own allocation, so references to locals are ordinary pointers and a
//! `StorageDead` turns them dangling.

use crate::middle::const_safety::value::ValueValidator;
use crate::middle::interpret::error::{
    InterpError, InterpResult, ResourceExhaustionInfo, UndefinedBehaviorInfo, UnsupportedOp,
};
use crate::middle::interpret::memory::{Memory, MemoryKind};
use crate::middle::interpret::operator::{float_binary_op, int_binary_op, numeric_cast, unary_op};
use crate::middle::interpret::value::{AllocId, Pointer, Scalar, Value};
use crate::middle::ir::{
    AggregateKind, BasicBlock, BinOp, Body, CastKind, ConstKind, Constant, Local,
    Operand, Place, ProjectionElem, Rvalue, Statement, StatementKind, Terminator,
    TerminatorKind,
};
use crate::middle::qualifs::{NeedsDrop, Qualif};
use crate::middle::ty::{AdtKind, FnKind, ModuleIR, Mutability, StaticId, Ty, POINTER_BITS};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Bit width of enum tags and discriminants
const TAG_BITS: u32 = POINTER_BITS;

/// Evaluator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpConfig {
    /// Statements and terminators executed per top-level evaluation
    pub step_limit: u64,
    /// Nested const fn calls
    pub stack_limit: usize,
    /// Elements a single array value may hold
    pub max_alloc_elems: u64,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            step_limit: 1_000_000,
            stack_limit: 64,
            max_alloc_elems: 1 << 20,
        }
    }
}

/// Result of a const, static or promoted body. Pointers inside `value`
/// refer to interned allocations of the interpreter that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedConst {
    pub value: Value,
    pub ty: Ty,
}

#[derive(Debug, Clone, Copy)]
enum LocalState {
    Live(AllocId),
    Dead,
}

struct Frame<'b> {
    body: &'b Body,
    locals: Vec<LocalState>,
}

impl Frame<'_> {
    fn local_alloc(
        &self,
        local: Local,
    ) -> InterpResult<AllocId> {
        match self.locals.get(local.index()) {
            Some(LocalState::Live(id)) => Ok(*id),
            _ => Err(UndefinedBehaviorInfo::DeadLocal(local).into()),
        }
    }
}

/// A place resolved to memory; `meta` is the length behind wide pointers
#[derive(Debug, Clone)]
struct MPlace {
    ptr: Pointer,
    meta: Option<u64>,
}

enum Next {
    Block(BasicBlock),
    Return,
}

pub struct Interpreter<'m> {
    module: &'m ModuleIR,
    memory: Memory,
    config: InterpConfig,
    steps: u64,
    depth: usize,
    statics: HashMap<StaticId, AllocId>,
    statics_in_progress: HashSet<StaticId>,
}

impl<'m> Interpreter<'m> {
    pub fn new(
        module: &'m ModuleIR,
        config: InterpConfig,
    ) -> Self {
        Self {
            module,
            memory: Memory::with_elem_limit(config.max_alloc_elems),
            config,
            steps: 0,
            depth: 0,
            statics: HashMap::new(),
            statics_in_progress: HashSet::new(),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn module(&self) -> &'m ModuleIR {
        self.module
    }

    /// Steps taken by the last top-level evaluation
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Evaluate a body that takes no arguments and intern its result
    pub fn eval_const_body(
        &mut self,
        body: &Body,
    ) -> InterpResult<EvaluatedConst> {
        if self.depth == 0 {
            self.steps = 0;
        }
        debug!("evaluating `{}`", body.display_name());
        let value = self.eval_frame(body, Vec::new(), true)?;
        Ok(EvaluatedConst {
            value,
            ty: body.return_ty().clone(),
        })
    }

    /// Evaluate a `const` or `static` initializer and check that the result
    /// is a valid value of its type
    pub fn eval_const_item(
        &mut self,
        body: &Body,
    ) -> InterpResult<EvaluatedConst> {
        let result = self.eval_const_body(body)?;
        ValueValidator::new(self.module, &self.memory)
            .validate(&result.value, &result.ty)
            .map_err(|err| UndefinedBehaviorInfo::InvalidValue(err.to_string()))?;
        Ok(result)
    }

    /// Evaluate a call of `body` with `args`
    pub fn eval_fn(
        &mut self,
        body: &Body,
        args: Vec<Value>,
    ) -> InterpResult<Value> {
        if self.depth == 0 {
            self.steps = 0;
        }
        self.eval_frame(body, args, false)
    }

    fn eval_frame(
        &mut self,
        body: &Body,
        args: Vec<Value>,
        root: bool,
    ) -> InterpResult<Value> {
        if self.depth >= self.config.stack_limit {
            return Err(ResourceExhaustionInfo::StackOverflow(self.config.stack_limit).into());
        }
        self.depth += 1;

        let locals = body
            .local_decls
            .iter()
            .map(|decl| {
                LocalState::Live(self.memory.allocate(
                    Value::Uninit,
                    decl.ty.clone(),
                    Mutability::Mut,
                    MemoryKind::Stack,
                ))
            })
            .collect();
        let mut frame = Frame { body, locals };
        let result = self.run_frame(&mut frame, args);

        let keep: HashSet<AllocId> = match &result {
            Ok(value) if root => self
                .memory
                .intern(None, value, Mutability::Not)
                .into_iter()
                .collect(),
            _ => HashSet::new(),
        };
        for state in &frame.locals {
            if let LocalState::Live(id) = state {
                if !keep.contains(id) {
                    self.memory.deallocate(*id);
                }
            }
        }

        self.depth -= 1;
        result
    }

    fn run_frame(
        &mut self,
        frame: &mut Frame<'_>,
        args: Vec<Value>,
    ) -> InterpResult<Value> {
        for (index, arg) in args.into_iter().enumerate() {
            let id = frame.local_alloc(Local(index + 1))?;
            self.memory.write(&Pointer::root(id), arg, self.module)?;
        }

        let body = frame.body;
        let mut block = BasicBlock::START;
        loop {
            let data = body.block(block);
            for statement in &data.statements {
                self.tick()?;
                self.eval_statement(frame, statement)?;
            }
            self.tick()?;
            match self.eval_terminator(frame, &data.terminator)? {
                Next::Block(target) => block = target,
                Next::Return => {
                    let id = frame.local_alloc(Local::RETURN_PLACE)?;
                    return self.memory.read(&Pointer::root(id));
                }
            }
        }
    }

    fn tick(&mut self) -> InterpResult<()> {
        self.steps += 1;
        if self.steps > self.config.step_limit {
            return Err(ResourceExhaustionInfo::StepLimitReached(self.config.step_limit).into());
        }
        Ok(())
    }

    fn eval_statement(
        &mut self,
        frame: &mut Frame<'_>,
        statement: &Statement,
    ) -> InterpResult<()> {
        match &statement.kind {
            StatementKind::Assign(assign) => {
                let (place, rvalue) = &**assign;
                let value = self.eval_rvalue(frame, rvalue)?;
                let dest = self.eval_place(frame, place)?;
                trace!("{:?} = {}", place, value);
                self.memory.write(&dest.ptr, value, self.module)
            }
            StatementKind::StorageLive(local) => {
                if let Some(LocalState::Live(old)) = frame.locals.get(local.index()) {
                    self.memory.deallocate(*old);
                }
                let ty = frame.body.local_decls[local.index()].ty.clone();
                let id = self
                    .memory
                    .allocate(Value::Uninit, ty, Mutability::Mut, MemoryKind::Stack);
                frame.locals[local.index()] = LocalState::Live(id);
                Ok(())
            }
            StatementKind::StorageDead(local) => {
                if let Some(LocalState::Live(id)) = frame.locals.get(local.index()) {
                    self.memory.deallocate(*id);
                }
                frame.locals[local.index()] = LocalState::Dead;
                Ok(())
            }
            StatementKind::Nop => Ok(()),
        }
    }

    fn eval_terminator(
        &mut self,
        frame: &mut Frame<'_>,
        terminator: &Terminator,
    ) -> InterpResult<Next> {
        match &terminator.kind {
            TerminatorKind::Goto { target } => Ok(Next::Block(*target)),
            TerminatorKind::SwitchInt {
                discr,
                targets,
                otherwise,
            } => {
                let bits = self.eval_operand(frame, discr)?.to_scalar()?.to_bits()?;
                let target = targets
                    .iter()
                    .find(|(value, _)| *value == bits)
                    .map(|(_, bb)| *bb)
                    .unwrap_or(*otherwise);
                Ok(Next::Block(target))
            }
            TerminatorKind::Return => Ok(Next::Return),
            TerminatorKind::Unreachable => Err(UndefinedBehaviorInfo::Unreachable.into()),
            TerminatorKind::Drop { place, target } => {
                let ty = frame.body.place_ty(self.module, place);
                if NeedsDrop::in_any_value_of_ty(self.module, &ty) {
                    let mplace = self.eval_place(frame, place)?;
                    let value = self.memory.read(&mplace.ptr)?;
                    if value_needs_drop(self.module, &ty, &value) {
                        return Err(UnsupportedOp::NonConstDrop(self.module.ty_name(&ty)).into());
                    }
                }
                Ok(Next::Block(*target))
            }
            TerminatorKind::Assert {
                cond,
                expected,
                msg,
                target,
            } => {
                let value = self.eval_operand(frame, cond)?.to_scalar()?.to_bool()?;
                if value == *expected {
                    Ok(Next::Block(*target))
                } else {
                    Err(InterpError::Panic(msg.description()))
                }
            }
            TerminatorKind::Call {
                func,
                args,
                destination,
                target,
            } => {
                self.eval_call(frame, func, args, destination)?;
                match target {
                    Some(target) => Ok(Next::Block(*target)),
                    None => Err(UndefinedBehaviorInfo::DivergingCallReturned.into()),
                }
            }
        }
    }

    fn eval_call(
        &mut self,
        frame: &mut Frame<'_>,
        func: &Operand,
        args: &[Operand],
        destination: &Place,
    ) -> InterpResult<()> {
        let module = self.module;
        let callee = match frame.body.operand_ty(module, func) {
            Ty::FnDef(id) => id,
            Ty::FnPtr => {
                let value = self.eval_operand(frame, func)?;
                let ptr = value.to_scalar()?.to_pointer()?.clone();
                self.memory.function_at(&ptr)?
            }
            _ => return Err(UndefinedBehaviorInfo::InvalidFnPointer.into()),
        };
        let decl = module.function(callee);
        match decl.kind {
            FnKind::Panic => return Err(InterpError::Panic(format!("explicit panic in `{}`", decl.name))),
            FnKind::AddressSensitive => {
                return Err(UnsupportedOp::AddressSensitiveCall(decl.name.clone()).into())
            }
            FnKind::Normal => {}
        }
        if !decl.is_const {
            return Err(UnsupportedOp::NonConstFnCall(decl.name.clone()).into());
        }
        let Some(body_id) = decl.body else {
            return Err(UnsupportedOp::MissingBody(decl.name.clone()).into());
        };

        let values = args
            .iter()
            .map(|arg| self.eval_operand(frame, arg))
            .collect::<InterpResult<Vec<_>>>()?;
        trace!("call `{}` with {} argument(s)", decl.name, values.len());
        let result = self.eval_frame(module.body(body_id), values, false)?;
        let dest = self.eval_place(frame, destination)?;
        self.memory.write(&dest.ptr, result, module)
    }

    fn eval_place(
        &self,
        frame: &Frame<'_>,
        place: &Place,
    ) -> InterpResult<MPlace> {
        let mut mplace = MPlace {
            ptr: Pointer::root(frame.local_alloc(place.local)?),
            meta: None,
        };
        for elem in &place.projection {
            match elem {
                ProjectionElem::Deref => {
                    mplace = match self.memory.read(&mplace.ptr)? {
                        Value::Scalar(scalar) => MPlace {
                            ptr: scalar.to_pointer()?.clone(),
                            meta: None,
                        },
                        Value::Wide { ptr, len } => MPlace {
                            ptr: ptr.to_pointer()?.clone(),
                            meta: Some(len.to_u64()?),
                        },
                        Value::Uninit => return Err(UndefinedBehaviorInfo::UninitRead.into()),
                        other => {
                            return Err(UndefinedBehaviorInfo::InvalidValue(format!(
                                "dereferencing non-pointer {}",
                                other
                            ))
                            .into())
                        }
                    };
                    if !self.memory.is_live(mplace.ptr.alloc) {
                        return Err(UndefinedBehaviorInfo::DanglingPointer.into());
                    }
                }
                ProjectionElem::Field(index) => {
                    mplace.ptr.path.push(*index as u64);
                    mplace.meta = None;
                }
                ProjectionElem::Index(local) => {
                    let id = frame.local_alloc(*local)?;
                    let index = self.memory.read(&Pointer::root(id))?.to_scalar()?.to_u64()?;
                    self.project_index(&mut mplace, index)?;
                }
                ProjectionElem::ConstantIndex(index) => self.project_index(&mut mplace, *index)?,
                ProjectionElem::Downcast(_) => {}
            }
        }
        Ok(mplace)
    }

    fn project_index(
        &self,
        mplace: &mut MPlace,
        index: u64,
    ) -> InterpResult<()> {
        let len = self.sequence_len(mplace)?;
        if index >= len {
            return Err(UndefinedBehaviorInfo::OutOfBounds { index, len }.into());
        }
        mplace.ptr.path.push(index);
        mplace.meta = None;
        Ok(())
    }

    fn sequence_len(
        &self,
        mplace: &MPlace,
    ) -> InterpResult<u64> {
        if let Some(len) = mplace.meta {
            return Ok(len);
        }
        match self.memory.read(&mplace.ptr)? {
            Value::Aggregate(elems) => Ok(elems.len() as u64),
            _ => Err(UndefinedBehaviorInfo::UninitRead.into()),
        }
    }

    fn eval_operand(
        &mut self,
        frame: &Frame<'_>,
        operand: &Operand,
    ) -> InterpResult<Value> {
        match operand {
            Operand::Copy(place) | Operand::Move(place) => {
                let mplace = self.eval_place(frame, place)?;
                self.memory.read(&mplace.ptr)
            }
            Operand::Constant(constant) => self.eval_constant(frame, constant),
        }
    }

    fn eval_constant(
        &mut self,
        frame: &Frame<'_>,
        constant: &Constant,
    ) -> InterpResult<Value> {
        let width = constant.ty.scalar_bits().unwrap_or(128);
        let value = match &constant.kind {
            ConstKind::Int(bits) => Value::Scalar(Scalar::from_uint(*bits, width)),
            ConstKind::Bool(b) => Value::from_bool(*b),
            ConstKind::Char(c) => Value::Scalar(Scalar::from_char(*c)),
            ConstKind::Float(bits) => Value::Scalar(Scalar::from_uint(*bits as u128, width)),
            ConstKind::ZeroSized => Value::unit(),
            ConstKind::Fn(id) => match constant.ty {
                Ty::FnPtr => {
                    let alloc = self.memory.function_alloc(*id);
                    Value::Scalar(Scalar::Ptr(Pointer::root(alloc)))
                }
                _ => Value::unit(),
            },
            ConstKind::Static(id) => {
                let alloc = self.static_alloc(*id)?;
                Value::Scalar(Scalar::Ptr(Pointer::root(alloc)))
            }
            ConstKind::Promoted(id) => {
                let body = frame.body;
                let promoted = body.promoted.get(id.0).ok_or_else(|| {
                    UndefinedBehaviorInfo::InvalidValue(format!("missing promoted[{}]", id.0))
                })?;
                self.eval_const_body(promoted)?.value
            }
        };
        Ok(value)
    }

    /// Allocation of a static, evaluating its initializer on first use
    fn static_alloc(
        &mut self,
        id: StaticId,
    ) -> InterpResult<AllocId> {
        if let Some(alloc) = self.statics.get(&id) {
            return Ok(*alloc);
        }
        let module = self.module;
        let def = module.static_def(id);
        if def.thread_local {
            return Err(UnsupportedOp::ThreadLocalAccess.into());
        }
        let Some(init) = def.init else {
            return Err(UnsupportedOp::StaticWithoutInit(def.name.clone()).into());
        };
        if !self.statics_in_progress.insert(id) {
            return Err(UnsupportedOp::StaticCycle(def.name.clone()).into());
        }
        let result = self.eval_const_body(module.body(init));
        self.statics_in_progress.remove(&id);

        let value = result?.value;
        let alloc = self.memory.allocate(
            value.clone(),
            def.ty.clone(),
            def.mutability,
            MemoryKind::Static(id),
        );
        self.memory.intern(Some(alloc), &value, def.mutability);
        self.statics.insert(id, alloc);
        Ok(alloc)
    }

    fn eval_rvalue(
        &mut self,
        frame: &Frame<'_>,
        rvalue: &Rvalue,
    ) -> InterpResult<Value> {
        let module = self.module;
        match rvalue {
            Rvalue::Use(operand) => self.eval_operand(frame, operand),
            Rvalue::Repeat(operand, count) => {
                let value = self.eval_operand(frame, operand)?;
                let len = self.memory.checked_len(*count)?;
                Ok(Value::Aggregate(vec![value; len]))
            }
            Rvalue::Ref(_, place) | Rvalue::AddressOf(_, place) => {
                let mplace = self.eval_place(frame, place)?;
                let ptr = Scalar::Ptr(mplace.ptr);
                Ok(match mplace.meta {
                    Some(len) => Value::Wide {
                        ptr,
                        len: Scalar::from_usize(len),
                    },
                    None => Value::Scalar(ptr),
                })
            }
            Rvalue::ThreadLocalRef(_) => Err(UnsupportedOp::ThreadLocalAccess.into()),
            Rvalue::HeapAlloc(_) => Err(UnsupportedOp::HeapAllocation.into()),
            Rvalue::Len(place) => {
                let mplace = self.eval_place(frame, place)?;
                Ok(Value::Scalar(Scalar::from_usize(self.sequence_len(&mplace)?)))
            }
            Rvalue::Cast(kind, operand, to) => {
                let from = frame.body.operand_ty(module, operand);
                self.eval_cast(frame, *kind, operand, &from, to)
            }
            Rvalue::BinaryOp(op, operands) | Rvalue::CheckedBinaryOp(op, operands) => {
                let checked = matches!(rvalue, Rvalue::CheckedBinaryOp(..));
                let lhs_ty = frame.body.operand_ty(module, &operands.0);
                let rhs_ty = frame.body.operand_ty(module, &operands.1);
                let lhs = self.eval_operand(frame, &operands.0)?.to_scalar()?.clone();
                let rhs = self.eval_operand(frame, &operands.1)?.to_scalar()?.clone();

                if lhs.is_ptr() || rhs.is_ptr() {
                    return Err(match op {
                        BinOp::Offset => UnsupportedOp::PtrOffset,
                        op if op.is_comparison() => UnsupportedOp::PtrComparison,
                        _ => UnsupportedOp::ReadPointerAsBytes,
                    }
                    .into());
                }
                let (l, r) = (lhs.to_bits()?, rhs.to_bits()?);

                if let Ty::Float(float) = lhs_ty {
                    return Ok(Value::Scalar(float_binary_op(*op, l, r, float)?));
                }
                let (result, overflow) = int_binary_op(*op, l, r, &lhs_ty, &rhs_ty)?;
                if checked {
                    Ok(Value::Aggregate(vec![
                        Value::Scalar(result),
                        Value::from_bool(overflow),
                    ]))
                } else if overflow && matches!(op, BinOp::Div | BinOp::Rem) {
                    Err(UndefinedBehaviorInfo::DivisionOverflow.into())
                } else {
                    Ok(Value::Scalar(result))
                }
            }
            Rvalue::UnaryOp(op, operand) => {
                let ty = frame.body.operand_ty(module, operand);
                let value = self.eval_operand(frame, operand)?;
                let (result, _) = unary_op(*op, value.to_scalar()?, &ty)?;
                Ok(Value::Scalar(result))
            }
            Rvalue::Discriminant(place) => {
                let mplace = self.eval_place(frame, place)?;
                let tag = match self.memory.read(&mplace.ptr)? {
                    Value::Variant { tag, .. } => tag.to_bits()?,
                    Value::Uninit => return Err(UndefinedBehaviorInfo::UninitRead.into()),
                    _ => 0,
                };
                Ok(Value::Scalar(Scalar::from_uint(tag, TAG_BITS)))
            }
            Rvalue::Aggregate(kind, operands) => {
                let mut fields = operands
                    .iter()
                    .map(|operand| self.eval_operand(frame, operand))
                    .collect::<InterpResult<Vec<_>>>()?;
                match kind {
                    AggregateKind::Tuple | AggregateKind::Array(_) => Ok(Value::Aggregate(fields)),
                    AggregateKind::Adt {
                        adt,
                        variant,
                        active_field,
                    } => match module.adt(*adt).kind {
                        AdtKind::Struct => Ok(Value::Aggregate(fields)),
                        AdtKind::Enum => Ok(Value::Variant {
                            tag: Scalar::from_uint(*variant as u128, TAG_BITS),
                            fields,
                        }),
                        AdtKind::Union => Ok(Value::Union {
                            field: active_field.unwrap_or(0),
                            value: Box::new(fields.pop().unwrap_or(Value::Uninit)),
                        }),
                    },
                }
            }
        }
    }

    fn eval_cast(
        &mut self,
        frame: &Frame<'_>,
        kind: CastKind,
        operand: &Operand,
        from: &Ty,
        to: &Ty,
    ) -> InterpResult<Value> {
        if kind == CastKind::ReifyFnPointer {
            let Ty::FnDef(id) = from else {
                return Err(UndefinedBehaviorInfo::InvalidFnPointer.into());
            };
            let alloc = self.memory.function_alloc(*id);
            return Ok(Value::Scalar(Scalar::Ptr(Pointer::root(alloc))));
        }

        let value = self.eval_operand(frame, operand)?;
        match kind {
            CastKind::IntToInt
            | CastKind::IntToFloat
            | CastKind::FloatToInt
            | CastKind::FloatToFloat => Ok(Value::Scalar(numeric_cast(value.to_scalar()?, from, to)?)),
            CastKind::PtrToPtr => Ok(value),
            CastKind::PointerExposeAddress => match value.to_scalar()? {
                Scalar::Ptr(_) => Err(UnsupportedOp::PtrToIntCast.into()),
                Scalar::Int { data, .. } => Ok(Value::Scalar(Scalar::from_uint(
                    *data,
                    to.scalar_bits().unwrap_or(POINTER_BITS),
                ))),
            },
            CastKind::PointerFromExposedAddress => {
                let bits = value.to_scalar()?.to_bits()?;
                Ok(Value::Scalar(Scalar::from_uint(bits, POINTER_BITS)))
            }
            CastKind::Unsize => {
                let len = match from.builtin_deref() {
                    Some(Ty::Array(_, len)) => *len,
                    _ => {
                        return Err(UndefinedBehaviorInfo::InvalidValue(format!(
                            "cannot unsize {}",
                            from
                        ))
                        .into())
                    }
                };
                Ok(Value::Wide {
                    ptr: value.to_scalar()?.clone(),
                    len: Scalar::from_usize(len),
                })
            }
            CastKind::ReifyFnPointer => unreachable!("handled above"),
        }
    }
}

/// Whether dropping `value` of type `ty` would run a destructor. Sharper
/// than the type-level answer for enums: `None::<Resource>` needs no drop.
pub fn value_needs_drop(
    module: &ModuleIR,
    ty: &Ty,
    value: &Value,
) -> bool {
    if !NeedsDrop::in_any_value_of_ty(module, ty) {
        return false;
    }
    if let (Ty::Adt(id), Value::Variant { tag, .. }) = (ty, value) {
        let adt = module.adt(*id);
        if !adt.has_drop_impl {
            if let Ok(tag) = tag.to_bits() {
                if let Some(variant) = adt.variants.get(tag as usize) {
                    return variant
                        .fields
                        .iter()
                        .any(|field| NeedsDrop::in_any_value_of_ty(module, field));
                }
            }
        }
    }
    true
}
