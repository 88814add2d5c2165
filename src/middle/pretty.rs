//! MIR 文本输出
//!
//! Renders bodies in a rustc-like textual form for `dump` and `promote`.
//! Item references are resolved by name through the module.

use crate::middle::ir::{
    AggregateKind, BasicBlock, BasicBlockData, Body, BodyKind, BorrowKind, CastKind, ConstKind,
    Constant, LocalKind, Operand, Place, ProjectionElem, Rvalue, Safety, Statement, StatementKind,
    TerminatorKind, UnOp, sign_extend,
};
use crate::middle::ty::{FloatTy, ModuleIR, Mutability, Ty};
use std::fmt::{self, Write};

const INDENT: &str = "    ";

/// Pretty printer bound to the module the bodies refer into
pub struct MirPrinter<'a> {
    module: &'a ModuleIR,
}

impl<'a> MirPrinter<'a> {
    pub fn new(module: &'a ModuleIR) -> Self {
        Self { module }
    }

    /// Every body of the module, each followed by its promoted bodies
    pub fn module_to_string(&self) -> String {
        let mut out = String::new();
        for (i, body) in self.module.bodies.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&self.body_to_string(body));
        }
        out
    }

    pub fn body_to_string(
        &self,
        body: &Body,
    ) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_body(&mut out, body);
        out
    }

    pub fn write_body(
        &self,
        out: &mut impl Write,
        body: &Body,
    ) -> fmt::Result {
        self.write_header(out, body)?;
        writeln!(out, " {{")?;

        for local in body.locals() {
            if local.index() > 0 && local.index() <= body.arg_count {
                continue;
            }
            let decl = &body.local_decls[local.index()];
            let mutbl = if decl.mutability.is_mut() { "mut " } else { "" };
            write!(out, "{}let {}{}: {};", INDENT, mutbl, local, self.module.ty_name(&decl.ty))?;
            if body.local_kind(local) == LocalKind::Var {
                write!(out, " // var")?;
            }
            writeln!(out)?;
        }

        for (index, scope) in body.source_scopes.iter().enumerate().skip(1) {
            let parent = scope.parent.map_or(0, |p| p.0);
            let safety = match scope.safety {
                Safety::Safe => "",
                Safety::Unconst => " (unconst)",
            };
            writeln!(out, "{}scope {} in {}{}", INDENT, index, parent, safety)?;
        }

        for (index, block) in body.basic_blocks.iter().enumerate() {
            writeln!(out)?;
            self.write_block(out, BasicBlock(index), block)?;
        }
        writeln!(out, "}}")?;

        for promoted in &body.promoted {
            writeln!(out)?;
            self.write_body(out, promoted)?;
        }
        Ok(())
    }

    fn write_header(
        &self,
        out: &mut impl Write,
        body: &Body,
    ) -> fmt::Result {
        let ret = self.module.ty_name(body.return_ty());
        if body.is_promoted() {
            return write!(out, "const {}: {} =", body.display_name(), ret);
        }
        match body.source.kind {
            BodyKind::Fn | BodyKind::ConstFn => {
                let prefix = if body.source.kind == BodyKind::ConstFn { "const fn" } else { "fn" };
                write!(out, "{} {}(", prefix, body.source.owner)?;
                for i in 1..=body.arg_count {
                    if i > 1 {
                        write!(out, ", ")?;
                    }
                    let ty = &body.local_decls[i].ty;
                    write!(out, "_{}: {}", i, self.module.ty_name(ty))?;
                }
                write!(out, ") -> {}", ret)
            }
            BodyKind::Const => write!(out, "const {}: {} =", body.source.owner, ret),
            BodyKind::Static(Mutability::Not) => {
                write!(out, "static {}: {} =", body.source.owner, ret)
            }
            BodyKind::Static(Mutability::Mut) => {
                write!(out, "static mut {}: {} =", body.source.owner, ret)
            }
        }
    }

    fn write_block(
        &self,
        out: &mut impl Write,
        bb: BasicBlock,
        block: &BasicBlockData,
    ) -> fmt::Result {
        writeln!(out, "{}{}: {{", INDENT, bb)?;
        for statement in &block.statements {
            if let Some(line) = self.statement(statement) {
                writeln!(out, "{}{}{};", INDENT, INDENT, line)?;
            }
        }
        writeln!(out, "{}{}{};", INDENT, INDENT, self.terminator(&block.terminator.kind))?;
        writeln!(out, "{}}}", INDENT)
    }

    fn statement(
        &self,
        statement: &Statement,
    ) -> Option<String> {
        match &statement.kind {
            StatementKind::Assign(assign) => Some(format!(
                "{} = {}",
                self.place(&assign.0),
                self.rvalue(&assign.1)
            )),
            StatementKind::StorageLive(local) => Some(format!("StorageLive({})", local)),
            StatementKind::StorageDead(local) => Some(format!("StorageDead({})", local)),
            StatementKind::Nop => None,
        }
    }

    pub fn terminator(
        &self,
        kind: &TerminatorKind,
    ) -> String {
        match kind {
            TerminatorKind::Goto { target } => format!("goto -> {}", target),
            TerminatorKind::SwitchInt {
                discr,
                targets,
                otherwise,
            } => {
                let mut arms: Vec<String> =
                    targets.iter().map(|(v, bb)| format!("{}: {}", v, bb)).collect();
                arms.push(format!("otherwise: {}", otherwise));
                format!("switchInt({}) -> [{}]", self.operand(discr), arms.join(", "))
            }
            TerminatorKind::Return => "return".to_string(),
            TerminatorKind::Unreachable => "unreachable".to_string(),
            TerminatorKind::Drop { place, target } => {
                format!("drop({}) -> {}", self.place(place), target)
            }
            TerminatorKind::Call {
                func,
                args,
                destination,
                target,
            } => {
                let args: Vec<String> = args.iter().map(|a| self.operand(a)).collect();
                let call = format!(
                    "{} = {}({})",
                    self.place(destination),
                    self.operand(func),
                    args.join(", ")
                );
                match target {
                    Some(target) => format!("{} -> {}", call, target),
                    None => format!("{} -> unwind", call),
                }
            }
            TerminatorKind::Assert {
                cond,
                expected,
                msg,
                target,
            } => {
                let not = if *expected { "" } else { "!" };
                format!(
                    "assert({}{}, \"{}\") -> {}",
                    not,
                    self.operand(cond),
                    msg.description(),
                    target
                )
            }
        }
    }

    pub fn place(
        &self,
        place: &Place,
    ) -> String {
        let mut out = place.local.to_string();
        for elem in &place.projection {
            out = match elem {
                ProjectionElem::Deref => format!("(*{})", out),
                ProjectionElem::Field(index) => format!("{}.{}", out, index),
                ProjectionElem::Index(local) => format!("{}[{}]", out, local),
                ProjectionElem::ConstantIndex(index) => format!("{}[{} of ..]", out, index),
                ProjectionElem::Downcast(variant) => format!("({} as variant#{})", out, variant),
            };
        }
        out
    }

    pub fn operand(
        &self,
        operand: &Operand,
    ) -> String {
        match operand {
            Operand::Copy(place) => format!("copy {}", self.place(place)),
            Operand::Move(place) => format!("move {}", self.place(place)),
            Operand::Constant(constant) => format!("const {}", self.constant(constant)),
        }
    }

    pub fn constant(
        &self,
        constant: &Constant,
    ) -> String {
        match (&constant.kind, &constant.ty) {
            (ConstKind::Int(bits), Ty::Int(int)) => {
                format!("{}_{}", sign_extend(*bits, int.bit_width()), int.name_str())
            }
            (ConstKind::Int(bits), Ty::Uint(uint)) => format!("{}_{}", bits, uint.name_str()),
            (ConstKind::Int(bits), ty) => format!("{:#x}_{}", bits, self.module.ty_name(ty)),
            (ConstKind::Bool(b), _) => b.to_string(),
            (ConstKind::Char(c), _) => format!("{:?}", c),
            (ConstKind::Float(bits), Ty::Float(FloatTy::F32)) => {
                format!("{:?}_f32", f32::from_bits(*bits as u32))
            }
            (ConstKind::Float(bits), _) => format!("{:?}_f64", f64::from_bits(*bits)),
            (ConstKind::ZeroSized, Ty::Unit) => "()".to_string(),
            (ConstKind::ZeroSized, ty) => format!("<ZST: {}>", self.module.ty_name(ty)),
            (ConstKind::Fn(id), _) => self
                .module
                .functions
                .get(id.0)
                .map_or_else(|| format!("fn#{}", id.0), |decl| decl.name.clone()),
            (ConstKind::Static(id), _) => {
                let name = self
                    .module
                    .statics
                    .get(id.0)
                    .map_or_else(|| format!("static#{}", id.0), |def| def.name.clone());
                format!("&{}", name)
            }
            (ConstKind::Promoted(id), _) => format!("promoted[{}]", id.0),
        }
    }

    pub fn rvalue(
        &self,
        rvalue: &Rvalue,
    ) -> String {
        match rvalue {
            Rvalue::Use(operand) => self.operand(operand),
            Rvalue::Repeat(operand, count) => format!("[{}; {}]", self.operand(operand), count),
            Rvalue::Ref(kind, place) => {
                let kind = match kind {
                    BorrowKind::Shared => "",
                    BorrowKind::Mut => "mut ",
                    BorrowKind::Shallow => "shallow ",
                };
                format!("&{}{}", kind, self.place(place))
            }
            Rvalue::AddressOf(mutbl, place) => {
                let mutbl = match mutbl {
                    Mutability::Not => "const",
                    Mutability::Mut => "mut",
                };
                format!("&raw {} {}", mutbl, self.place(place))
            }
            Rvalue::ThreadLocalRef(id) => {
                let name = self
                    .module
                    .statics
                    .get(id.0)
                    .map_or_else(|| format!("static#{}", id.0), |def| def.name.clone());
                format!("&/*tls*/ {}", name)
            }
            Rvalue::Len(place) => format!("Len({})", self.place(place)),
            Rvalue::Cast(kind, operand, ty) => {
                let kind = match kind {
                    CastKind::IntToInt => "IntToInt",
                    CastKind::IntToFloat => "IntToFloat",
                    CastKind::FloatToInt => "FloatToInt",
                    CastKind::FloatToFloat => "FloatToFloat",
                    CastKind::PtrToPtr => "PtrToPtr",
                    CastKind::PointerExposeAddress => "PointerExposeAddress",
                    CastKind::PointerFromExposedAddress => "PointerFromExposedAddress",
                    CastKind::ReifyFnPointer => "ReifyFnPointer",
                    CastKind::Unsize => "Unsize",
                };
                format!(
                    "{} as {} ({})",
                    self.operand(operand),
                    self.module.ty_name(ty),
                    kind
                )
            }
            Rvalue::BinaryOp(op, operands) => format!(
                "{} {} {}",
                self.operand(&operands.0),
                op.symbol(),
                self.operand(&operands.1)
            ),
            Rvalue::CheckedBinaryOp(op, operands) => format!(
                "Checked({} {} {})",
                self.operand(&operands.0),
                op.symbol(),
                self.operand(&operands.1)
            ),
            Rvalue::UnaryOp(op, operand) => {
                let op = match op {
                    UnOp::Not => "!",
                    UnOp::Neg => "-",
                };
                format!("{}{}", op, self.operand(operand))
            }
            Rvalue::Discriminant(place) => format!("discriminant({})", self.place(place)),
            Rvalue::Aggregate(kind, operands) => {
                let fields: Vec<String> = operands.iter().map(|o| self.operand(o)).collect();
                let fields = fields.join(", ");
                match kind {
                    AggregateKind::Tuple => format!("({})", fields),
                    AggregateKind::Array(_) => format!("[{}]", fields),
                    AggregateKind::Adt {
                        adt,
                        variant,
                        active_field,
                    } => {
                        let def = self.module.adts.get(adt.0);
                        let name = def.map_or_else(|| format!("adt#{}", adt.0), |d| d.name.clone());
                        let variant_name = def
                            .filter(|d| d.is_enum())
                            .and_then(|d| d.variants.get(*variant))
                            .map(|v| format!("::{}", v.name))
                            .unwrap_or_default();
                        match active_field {
                            Some(field) => format!("{} {{ .{} = {} }}", name, field, fields),
                            None => format!("{}{} {{ {} }}", name, variant_name, fields),
                        }
                    }
                }
            }
            Rvalue::HeapAlloc(ty) => format!("box <{}>", self.module.ty_name(ty)),
        }
    }
}
