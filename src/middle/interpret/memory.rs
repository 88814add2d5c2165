//! Compile-time memory
//!
//! Allocations never move and ids are never reused, so a pointer to a freed
//! allocation stays recognisably dangling for the rest of the evaluation.

use crate::middle::interpret::error::{
    InterpResult, ResourceExhaustionInfo, UndefinedBehaviorInfo, UnsupportedOp,
};
use crate::middle::interpret::value::{AllocId, Pointer, Scalar, Value};
use crate::middle::ty::{AdtKind, FnId, ModuleIR, Mutability, StaticId, Ty};
use std::collections::{HashMap, HashSet};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    /// Local of a running frame
    Stack,
    /// Global: static or interned constant result
    Global,
    Static(StaticId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub value: Value,
    pub ty: Ty,
    pub mutability: Mutability,
    pub kind: MemoryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalAlloc {
    Data(Allocation),
    Function(FnId),
    Freed,
}

#[derive(Debug)]
pub struct Memory {
    allocs: Vec<GlobalAlloc>,
    functions: HashMap<FnId, AllocId>,
    /// Largest array value that may be materialized
    elem_limit: u64,
}

impl Default for Memory {
    fn default() -> Self {
        Self::with_elem_limit(1 << 20)
    }
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elem_limit(elem_limit: u64) -> Self {
        Self {
            allocs: Vec::new(),
            functions: HashMap::new(),
            elem_limit,
        }
    }

    /// `len` as a vector length, if an array that long may be built
    pub fn checked_len(
        &self,
        len: u64,
    ) -> InterpResult<usize> {
        match usize::try_from(len) {
            Ok(n) if len <= self.elem_limit => Ok(n),
            _ => Err(ResourceExhaustionInfo::AllocationTooLarge {
                len,
                limit: self.elem_limit,
            }
            .into()),
        }
    }

    pub fn allocate(
        &mut self,
        value: Value,
        ty: Ty,
        mutability: Mutability,
        kind: MemoryKind,
    ) -> AllocId {
        self.allocs.push(GlobalAlloc::Data(Allocation {
            value,
            ty,
            mutability,
            kind,
        }));
        AllocId(self.allocs.len() - 1)
    }

    /// The one allocation standing for `func`; repeated requests agree
    pub fn function_alloc(
        &mut self,
        func: FnId,
    ) -> AllocId {
        if let Some(id) = self.functions.get(&func) {
            return *id;
        }
        self.allocs.push(GlobalAlloc::Function(func));
        let id = AllocId(self.allocs.len() - 1);
        self.functions.insert(func, id);
        id
    }

    pub fn deallocate(
        &mut self,
        id: AllocId,
    ) {
        if let Some(slot) = self.allocs.get_mut(id.0) {
            trace!("free {}", id);
            *slot = GlobalAlloc::Freed;
        }
    }

    pub fn get_alloc(
        &self,
        id: AllocId,
    ) -> Option<&GlobalAlloc> {
        self.allocs.get(id.0)
    }

    pub fn is_live(
        &self,
        id: AllocId,
    ) -> bool {
        matches!(
            self.allocs.get(id.0),
            Some(GlobalAlloc::Data(_) | GlobalAlloc::Function(_))
        )
    }

    pub fn get(
        &self,
        id: AllocId,
    ) -> InterpResult<&Allocation> {
        match self.allocs.get(id.0) {
            Some(GlobalAlloc::Data(alloc)) => Ok(alloc),
            Some(GlobalAlloc::Function(_)) => Err(UndefinedBehaviorInfo::InvalidValue(
                "accessing a function as data".to_string(),
            )
            .into()),
            Some(GlobalAlloc::Freed) | None => Err(UndefinedBehaviorInfo::DanglingPointer.into()),
        }
    }

    fn get_mut(
        &mut self,
        id: AllocId,
    ) -> InterpResult<&mut Allocation> {
        match self.allocs.get_mut(id.0) {
            Some(GlobalAlloc::Data(alloc)) => {
                if alloc.mutability == Mutability::Not {
                    return Err(UndefinedBehaviorInfo::WriteToReadOnly.into());
                }
                Ok(alloc)
            }
            Some(GlobalAlloc::Function(_)) => Err(UndefinedBehaviorInfo::WriteToReadOnly.into()),
            Some(GlobalAlloc::Freed) | None => Err(UndefinedBehaviorInfo::DanglingPointer.into()),
        }
    }

    /// Function a pointer designates, if any
    pub fn function_at(
        &self,
        ptr: &Pointer,
    ) -> InterpResult<FnId> {
        match self.allocs.get(ptr.alloc.0) {
            Some(GlobalAlloc::Function(func)) if ptr.path.is_empty() => Ok(*func),
            Some(GlobalAlloc::Freed) => Err(UndefinedBehaviorInfo::DanglingPointer.into()),
            _ => Err(UndefinedBehaviorInfo::InvalidFnPointer.into()),
        }
    }

    /// Value stored at `ptr`
    pub fn read(
        &self,
        ptr: &Pointer,
    ) -> InterpResult<Value> {
        let mut value = &self.get(ptr.alloc)?.value;
        for index in &ptr.path {
            value = value.field(*index)?;
        }
        Ok(value.clone())
    }

    /// Store `new` at `ptr`. Uninitialized values met along the path are
    /// expanded into their fields first, so a single field can be written.
    pub fn write(
        &mut self,
        ptr: &Pointer,
        new: Value,
        module: &ModuleIR,
    ) -> InterpResult<()> {
        let elem_limit = self.elem_limit;
        let alloc = self.get_mut(ptr.alloc)?;
        let mut ty = alloc.ty.clone();
        let mut slot = &mut alloc.value;
        for index in &ptr.path {
            if *slot == Value::Uninit {
                *slot = skeleton(module, &ty, elem_limit)?;
            }
            let i = *index as usize;
            slot = match slot {
                Value::Aggregate(fields) => {
                    ty = field_ty(module, &ty, None, i)?;
                    let len = fields.len() as u64;
                    fields
                        .get_mut(i)
                        .ok_or(UndefinedBehaviorInfo::OutOfBounds { index: *index, len })?
                }
                Value::Variant { tag, fields } => {
                    ty = field_ty(module, &ty, Some(tag.to_bits()? as usize), i)?;
                    let len = fields.len() as u64;
                    fields
                        .get_mut(i)
                        .ok_or(UndefinedBehaviorInfo::OutOfBounds { index: *index, len })?
                }
                Value::Union { field, value } => {
                    ty = field_ty(module, &ty, None, i)?;
                    // Writing any union field makes it the active one.
                    if *field != i {
                        *field = i;
                        **value = Value::Uninit;
                    }
                    &mut **value
                }
                _ => return Err(UndefinedBehaviorInfo::UninitRead.into()),
            };
        }
        *slot = new;
        Ok(())
    }

    /// Freeze everything reachable from `root`: the allocations become
    /// globals that outlive the evaluation. `root_mutability` applies to
    /// `root_alloc` only; everything else turns read-only.
    pub fn intern(
        &mut self,
        root_alloc: Option<AllocId>,
        root: &Value,
        root_mutability: Mutability,
    ) -> Vec<AllocId> {
        let mut seen = HashSet::new();
        let mut work = Vec::new();
        collect_pointers(root, &mut work);
        if let Some(id) = root_alloc {
            work.push(id);
        }

        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(GlobalAlloc::Data(alloc)) = self.allocs.get_mut(id.0) {
                // Other statics were interned on their own terms.
                if matches!(alloc.kind, MemoryKind::Static(_)) && Some(id) != root_alloc {
                    continue;
                }
                alloc.mutability = if Some(id) == root_alloc {
                    root_mutability
                } else {
                    Mutability::Not
                };
                if alloc.kind == MemoryKind::Stack {
                    alloc.kind = MemoryKind::Global;
                }
                collect_pointers(&alloc.value, &mut work);
            }
        }

        let mut interned: Vec<AllocId> = seen.into_iter().collect();
        interned.sort();
        trace!("interned {} allocation(s)", interned.len());
        interned
    }
}

/// Uninitialized fields of a value of type `ty`
fn skeleton(
    module: &ModuleIR,
    ty: &Ty,
    elem_limit: u64,
) -> InterpResult<Value> {
    match ty {
        Ty::Tuple(fields) => Ok(Value::Aggregate(vec![Value::Uninit; fields.len()])),
        Ty::Array(_, len) if *len > elem_limit => Err(ResourceExhaustionInfo::AllocationTooLarge {
            len: *len,
            limit: elem_limit,
        }
        .into()),
        Ty::Array(_, len) => Ok(Value::Aggregate(vec![Value::Uninit; *len as usize])),
        Ty::Adt(id) => {
            let adt = module.adt(*id);
            match adt.kind {
                AdtKind::Struct => Ok(Value::Aggregate(vec![
                    Value::Uninit;
                    adt.non_enum_variant().fields.len()
                ])),
                AdtKind::Union => Ok(Value::Union {
                    field: 0,
                    value: Box::new(Value::Uninit),
                }),
                AdtKind::Enum => Err(UnsupportedOp::PartialEnumInit.into()),
            }
        }
        _ => Err(UndefinedBehaviorInfo::InvalidValue(format!(
            "projecting into a value of type {}",
            ty
        ))
        .into()),
    }
}

fn field_ty(
    module: &ModuleIR,
    ty: &Ty,
    variant: Option<usize>,
    index: usize,
) -> InterpResult<Ty> {
    if let Some(elem) = ty.sequence_element() {
        return Ok(elem);
    }
    module
        .field_tys(ty, variant)
        .and_then(|fields| fields.get(index).cloned())
        .ok_or_else(|| {
            UndefinedBehaviorInfo::InvalidValue(format!("type {} has no field {}", ty, index)).into()
        })
}

fn collect_pointers(
    value: &Value,
    out: &mut Vec<AllocId>,
) {
    match value {
        Value::Uninit => {}
        Value::Scalar(scalar) => {
            if let Scalar::Ptr(ptr) = scalar {
                out.push(ptr.alloc);
            }
        }
        Value::Wide { ptr, .. } => {
            if let Scalar::Ptr(ptr) = ptr {
                out.push(ptr.alloc);
            }
        }
        Value::Aggregate(fields) | Value::Variant { fields, .. } => {
            for field in fields {
                collect_pointers(field, out);
            }
        }
        Value::Union { value, .. } => collect_pointers(value, out),
    }
}
