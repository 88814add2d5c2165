//! Value qualifications
//!
//! A qualif is a conservative property of a value: "may need a destructor
//! run", "may be mutated through a shared reference". Type-based answers
//! hold for any value of the type; value-based answers (`in_rvalue`) are
//! sharper, e.g. `None::<Resource>` needs no drop even though
//! `Option<Resource>` does.

use crate::middle::const_check::ConstCx;
use crate::middle::ir::{ConstKind, Local, Operand, Place, ProjectionElem, Rvalue};
use crate::middle::ir::AggregateKind;
use crate::middle::ty::{AdtDef, AdtId, ModuleIR, Ty};
use std::collections::HashSet;

pub trait Qualif {
    const NAME: &'static str;

    /// The qualif is set on the ADT itself, whatever its fields hold
    fn in_adt_inherently(adt: &AdtDef) -> bool;

    /// Whether looking through references is part of the qualif
    fn looks_through_refs() -> bool {
        false
    }

    fn in_any_value_of_ty(
        module: &ModuleIR,
        ty: &Ty,
    ) -> bool {
        let mut visiting = HashSet::new();
        ty_has_qualif::<Self>(module, ty, &mut visiting)
    }
}

/// Values whose scope exit runs a destructor
pub struct NeedsDrop;

impl Qualif for NeedsDrop {
    const NAME: &'static str = "NeedsDrop";

    fn in_adt_inherently(adt: &AdtDef) -> bool {
        adt.has_drop_impl
    }
}

/// Values with cell-like contents that can change behind `&`
pub struct HasMutInterior;

impl Qualif for HasMutInterior {
    const NAME: &'static str = "HasMutInterior";

    fn in_adt_inherently(adt: &AdtDef) -> bool {
        adt.interior_mut
    }
}

fn ty_has_qualif<Q: Qualif + ?Sized>(
    module: &ModuleIR,
    ty: &Ty,
    visiting: &mut HashSet<AdtId>,
) -> bool {
    match ty {
        Ty::Unit
        | Ty::Never
        | Ty::Bool
        | Ty::Char
        | Ty::Int(_)
        | Ty::Uint(_)
        | Ty::Float(_)
        | Ty::Str
        | Ty::FnPtr
        | Ty::FnDef(_)
        | Ty::RawPtr(..) => false,
        Ty::Ref(_, pointee) => Q::looks_through_refs() && ty_has_qualif::<Q>(module, pointee, visiting),
        Ty::Tuple(fields) => fields
            .iter()
            .any(|field| ty_has_qualif::<Q>(module, field, visiting)),
        Ty::Array(_, 0) => false,
        Ty::Array(elem, _) | Ty::Slice(elem) => ty_has_qualif::<Q>(module, elem, visiting),
        Ty::Adt(id) => {
            let adt = module.adt(*id);
            if Q::in_adt_inherently(adt) {
                return true;
            }
            // recursive types: the cycle itself adds nothing
            if !visiting.insert(*id) {
                return false;
            }
            let result = adt.variants.iter().any(|variant| {
                variant
                    .fields
                    .iter()
                    .any(|field| ty_has_qualif::<Q>(module, field, visiting))
            });
            visiting.remove(id);
            result
        }
    }
}

pub fn in_rvalue<Q: Qualif>(
    cx: &ConstCx<'_>,
    in_local: &mut impl FnMut(Local) -> bool,
    rvalue: &Rvalue,
) -> bool {
    match rvalue {
        Rvalue::ThreadLocalRef(_) | Rvalue::HeapAlloc(_) => {
            Q::in_any_value_of_ty(cx.module, &cx.body.rvalue_ty(cx.module, rvalue))
        }

        Rvalue::Discriminant(_) | Rvalue::Len(_) => false,

        Rvalue::Use(operand) | Rvalue::Repeat(operand, _) | Rvalue::UnaryOp(_, operand) | Rvalue::Cast(_, operand, _) => {
            in_operand::<Q>(cx, in_local, operand)
        }

        Rvalue::BinaryOp(_, operands) | Rvalue::CheckedBinaryOp(_, operands) => {
            in_operand::<Q>(cx, in_local, &operands.0) || in_operand::<Q>(cx, in_local, &operands.1)
        }

        Rvalue::Ref(_, place) | Rvalue::AddressOf(_, place) => {
            // A reborrow `&*r` behaves like a copy of `r`.
            if let Some((base, ProjectionElem::Deref)) = place.last_projection() {
                if matches!(cx.body.place_ty(cx.module, &base), Ty::Ref(..)) {
                    return in_place::<Q>(cx, in_local, &base);
                }
            }
            in_place::<Q>(cx, in_local, place)
        }

        Rvalue::Aggregate(kind, operands) => {
            if let AggregateKind::Adt { adt, .. } = kind {
                if Q::in_adt_inherently(cx.module.adt(*adt)) {
                    return true;
                }
            }
            operands
                .iter()
                .any(|operand| in_operand::<Q>(cx, in_local, operand))
        }
    }
}

pub fn in_place<Q: Qualif>(
    cx: &ConstCx<'_>,
    in_local: &mut impl FnMut(Local) -> bool,
    place: &Place,
) -> bool {
    let mut place = place.clone();
    while let Some((base, elem)) = place.last_projection() {
        if let ProjectionElem::Index(index) = elem {
            if in_local(*index) {
                return true;
            }
        }
        let elem = elem.clone();
        let projected = cx.body.place_ty(cx.module, &base.clone().project(elem));
        if !Q::in_any_value_of_ty(cx.module, &projected) {
            return false;
        }
        place = base;
    }
    in_local(place.local)
}

pub fn in_operand<Q: Qualif>(
    cx: &ConstCx<'_>,
    in_local: &mut impl FnMut(Local) -> bool,
    operand: &Operand,
) -> bool {
    match operand {
        Operand::Copy(place) | Operand::Move(place) => in_place::<Q>(cx, in_local, place),
        Operand::Constant(constant) => match constant.kind {
            // Checked when the static itself was evaluated; conservatively
            // take whatever its type allows.
            ConstKind::Static(id) => {
                Q::in_any_value_of_ty(cx.module, &cx.module.static_def(id).ty)
            }
            ConstKind::Promoted(_) => false,
            _ => Q::in_any_value_of_ty(cx.module, &constant.ty),
        },
    }
}
