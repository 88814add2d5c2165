//! Candidate validation
//!
//! A candidate is promotable when the value it borrows, and everything that
//! value is computed from, would be accepted in an explicit constant and
//! cannot observe anything that differs between compile time and runtime.
//! Promotion happens without the user asking for it, so every rule here
//! errs on the side of leaving code alone.

use crate::middle::const_check::{ConstCx, ConstLegality, NotConst};
use crate::middle::const_safety::code::{unconst_op_in_call, unconst_op_in_rvalue, UnconstOp};
use crate::middle::ir::{
    BinOp, BorrowKind, Local, LocalKind, Operand, Place, ProjectionElem, Rvalue, StatementKind,
    TerminatorKind,
};
use crate::middle::promote::collect::{Candidate, TempState};
use crate::middle::qualifs::{in_rvalue, HasMutInterior, NeedsDrop, Qualif};
use crate::middle::ty::{Mutability, Ty};
use std::ops::Deref;
use thiserror::Error;
use tracing::debug;

/// Why a candidate stays runtime code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unpromotable {
    #[error("{0} is not a temporary assigned exactly once")]
    NotATemp(Local),
    #[error("dereferences a pointer")]
    Deref,
    #[error("reads an enum variant")]
    Downcast,
    #[error("reads a union field")]
    UnionField,
    #[error("index is not a constant within the array bounds")]
    NonConstIndex,
    #[error(transparent)]
    NotConst(#[from] NotConst),
    #[error("performs a {0}")]
    Unconst(UnconstOp),
    #[error("divides by a value not known to be non-zero")]
    Division,
    #[error("borrows a value with interior mutability")]
    MutInterior,
    #[error("mutably borrows a non-empty value")]
    MutBorrow,
    #[error("shallow borrows are never promoted")]
    ShallowBorrow,
    #[error("takes the address of a place")]
    AddressOf,
    #[error("the value needs to be dropped")]
    NeedsDrop,
    #[error("calls `{0}`, which is not promotable outside explicit constants")]
    NotPromotableFn(String),
    #[error("calls a function pointer")]
    FnPtrCall,
    #[error("not a borrow")]
    Malformed,
}

pub struct Validator<'a, 'b> {
    ccx: &'a ConstCx<'b>,
    rules: &'a dyn ConstLegality,
    temps: &'a [TempState],
    /// Explicit contexts accept any const fn call; implicit ones only
    /// calls marked promotable.
    explicit: bool,
}

impl<'b> Deref for Validator<'_, 'b> {
    type Target = ConstCx<'b>;

    fn deref(&self) -> &Self::Target {
        self.ccx
    }
}

impl<'a, 'b> Validator<'a, 'b> {
    pub fn new(
        ccx: &'a ConstCx<'b>,
        rules: &'a dyn ConstLegality,
        temps: &'a [TempState],
    ) -> Self {
        Self {
            ccx,
            rules,
            temps,
            explicit: false,
        }
    }

    pub fn validate_candidate(
        &mut self,
        candidate: Candidate,
    ) -> Result<(), Unpromotable> {
        self.explicit = candidate.forces_explicit_promotion()
            || self.const_kind.map_or(false, |kind| kind.is_explicit());

        match candidate {
            Candidate::Ref(location) => {
                let Some(statement) = self.body.stmt_at(location) else {
                    return Err(Unpromotable::Malformed);
                };
                let StatementKind::Assign(assign) = &statement.kind else {
                    return Err(Unpromotable::Malformed);
                };
                let Rvalue::Ref(kind, place) = &assign.1 else {
                    return Err(Unpromotable::Malformed);
                };

                // Projections stay in the source and are applied to the
                // promoted reference, so only the base needs checking.
                self.validate_local(place.local)?;
                self.validate_ref(*kind, place)?;

                if place.has_deref() {
                    return Err(Unpromotable::Deref);
                }
                if self.qualif_local::<NeedsDrop>(place.local) {
                    return Err(Unpromotable::NeedsDrop);
                }
                Ok(())
            }
            Candidate::Argument { block, index } => {
                let TerminatorKind::Call { args, .. } = &self.body.block(block).terminator.kind
                else {
                    return Err(Unpromotable::Malformed);
                };
                match args.get(index) {
                    Some(arg) => self.validate_operand(arg),
                    None => Err(Unpromotable::Malformed),
                }
            }
        }
    }

    /// Value-based qualif of a temp, looking at the rvalue that defines it
    fn qualif_local<Q: Qualif>(
        &self,
        local: Local,
    ) -> bool {
        let ty = &self.body.local_decls[local.index()].ty;
        let TempState::Defined { location, .. } = self.temps[local.index()] else {
            return Q::in_any_value_of_ty(self.module, ty);
        };
        match self.body.stmt_at(location).map(|stmt| &stmt.kind) {
            Some(StatementKind::Assign(assign)) => {
                in_rvalue::<Q>(self.ccx, &mut |l| self.qualif_local::<Q>(l), &assign.1)
            }
            // call results: nothing is known beyond the type
            _ => Q::in_any_value_of_ty(self.module, ty),
        }
    }

    fn validate_local(
        &self,
        local: Local,
    ) -> Result<(), Unpromotable> {
        if self.body.local_kind(local) != LocalKind::Temp {
            return Err(Unpromotable::NotATemp(local));
        }
        let TempState::Defined { location, uses } = self.temps[local.index()] else {
            return Err(Unpromotable::NotATemp(local));
        };
        if uses == 0 {
            return Err(Unpromotable::NotATemp(local));
        }

        match self.body.stmt_at(location).map(|stmt| &stmt.kind) {
            Some(StatementKind::Assign(assign)) => self.validate_rvalue(&assign.1),
            Some(_) => Err(Unpromotable::NotATemp(local)),
            None => match &self.body.block(location.block).terminator.kind {
                TerminatorKind::Call { func, args, .. } => self.validate_call(func, args),
                _ => Err(Unpromotable::NotATemp(local)),
            },
        }
    }

    fn validate_place(
        &self,
        place: &Place,
    ) -> Result<(), Unpromotable> {
        let Some((base, elem)) = place.last_projection() else {
            return self.validate_local(place.local);
        };

        match elem {
            ProjectionElem::Deref => {
                // `*&STATIC` inside another static initializer reads the
                // static itself, which is allowed there.
                let mut promotable = false;
                if let Some(local) = base.as_local() {
                    if let TempState::Defined { location, .. } = self.temps[local.index()] {
                        if let Some(StatementKind::Assign(assign)) =
                            self.body.stmt_at(location).map(|stmt| &stmt.kind)
                        {
                            if let Rvalue::Use(Operand::Constant(c)) = &assign.1 {
                                if let Some(id) = c.check_static_ptr() {
                                    promotable = self.is_static()
                                        && !self.module.static_def(id).thread_local;
                                }
                            }
                        }
                    }
                }
                if !promotable {
                    return Err(Unpromotable::Deref);
                }
            }
            ProjectionElem::Downcast(_) => return Err(Unpromotable::Downcast),
            ProjectionElem::ConstantIndex(_) => {}
            ProjectionElem::Index(index) => {
                let len = match self.body.place_ty(self.module, &base) {
                    Ty::Array(_, len) => len,
                    _ => return Err(Unpromotable::NonConstIndex),
                };
                let Some(value) = self.const_local_bits(*index) else {
                    return Err(Unpromotable::NonConstIndex);
                };
                if value >= len as u128 {
                    return Err(Unpromotable::NonConstIndex);
                }
                self.validate_local(*index)?;
            }
            ProjectionElem::Field(_) => {
                if let Ty::Adt(id) = self.body.place_ty(self.module, &base) {
                    if self.module.adt(id).is_union() {
                        return Err(Unpromotable::UnionField);
                    }
                }
            }
        }

        self.validate_place(&base)
    }

    /// Integer a temp is assigned from a literal, if it is
    fn const_local_bits(
        &self,
        local: Local,
    ) -> Option<u128> {
        let TempState::Defined { location, .. } = self.temps[local.index()] else {
            return None;
        };
        match &self.body.stmt_at(location)?.kind {
            StatementKind::Assign(assign) => match &assign.1 {
                Rvalue::Use(Operand::Constant(c)) => c.try_eval_bits(),
                _ => None,
            },
            _ => None,
        }
    }

    fn validate_operand(
        &self,
        operand: &Operand,
    ) -> Result<(), Unpromotable> {
        self.rules.check_operand(self.ccx, operand)?;
        match operand {
            Operand::Copy(place) | Operand::Move(place) => self.validate_place(place),
            Operand::Constant(_) => Ok(()),
        }
    }

    fn validate_ref(
        &self,
        kind: BorrowKind,
        place: &Place,
    ) -> Result<(), Unpromotable> {
        match kind {
            BorrowKind::Shallow => Err(Unpromotable::ShallowBorrow),
            BorrowKind::Shared => {
                if self.qualif_local::<HasMutInterior>(place.local) {
                    Err(Unpromotable::MutInterior)
                } else {
                    Ok(())
                }
            }
            // `&mut []` is the only mutable borrow that cannot be used to
            // mutate the shared constant.
            BorrowKind::Mut => {
                if self.body.place_ty(self.module, place).is_zero_length_array() {
                    Ok(())
                } else {
                    Err(Unpromotable::MutBorrow)
                }
            }
        }
    }

    fn validate_rvalue(
        &self,
        rvalue: &Rvalue,
    ) -> Result<(), Unpromotable> {
        self.rules.check_rvalue(self.ccx, rvalue)?;
        if let Some(op) = unconst_op_in_rvalue(self.ccx, rvalue) {
            return Err(Unpromotable::Unconst(op));
        }

        match rvalue {
            Rvalue::Use(operand) | Rvalue::Repeat(operand, _) | Rvalue::UnaryOp(_, operand) => {
                self.validate_operand(operand)
            }
            Rvalue::Cast(_, operand, _) => self.validate_operand(operand),
            Rvalue::Discriminant(place) | Rvalue::Len(place) => {
                self.rules.check_place(self.ccx, place)?;
                self.validate_place(place)
            }
            Rvalue::ThreadLocalRef(_) => Err(NotConst::ThreadLocal("promoted constants").into()),
            Rvalue::HeapAlloc(_) => Err(NotConst::HeapAllocation("promoted constants").into()),
            Rvalue::BinaryOp(op, operands) | Rvalue::CheckedBinaryOp(op, operands) => {
                let (lhs, rhs) = (&operands.0, &operands.1);
                let lhs_ty = self.body.operand_ty(self.module, lhs);
                if lhs_ty.is_integral() && matches!(op, BinOp::Div | BinOp::Rem) {
                    self.validate_division(&lhs_ty, lhs, rhs)?;
                }
                self.validate_operand(lhs)?;
                self.validate_operand(rhs)
            }
            Rvalue::AddressOf(_, place) => {
                // `&raw const *r` with `r` a reference is a cast of `r`.
                if let Some((base, ProjectionElem::Deref)) = place.last_projection() {
                    if matches!(self.body.place_ty(self.module, &base), Ty::Ref(..)) {
                        return self.validate_place(&base);
                    }
                }
                Err(Unpromotable::AddressOf)
            }
            Rvalue::Ref(kind, place) => {
                // A reborrow `&*r` of a shared reference is promotable when
                // `r` is; peel such derefs before looking at the place.
                let mut place = place.clone();
                while let Some((base, ProjectionElem::Deref)) = place.last_projection() {
                    match self.body.place_ty(self.module, &base) {
                        Ty::Ref(Mutability::Not, _) => place = base,
                        _ => break,
                    }
                }
                self.rules.check_place(self.ccx, &place)?;
                self.validate_place(&place)?;
                self.validate_ref(*kind, &place)
            }
            Rvalue::Aggregate(_, operands) => {
                for operand in operands {
                    self.validate_operand(operand)?;
                }
                Ok(())
            }
        }
    }

    /// Integer division and remainder only by a constant that can neither
    /// trap nor overflow
    fn validate_division(
        &self,
        ty: &Ty,
        lhs: &Operand,
        rhs: &Operand,
    ) -> Result<(), Unpromotable> {
        let Some(divisor) = constant_bits(rhs) else {
            return Err(Unpromotable::Division);
        };
        if divisor == 0 {
            return Err(Unpromotable::Division);
        }
        if let Some(bits) = ty.scalar_bits().filter(|_| ty.is_signed()) {
            // `MIN / -1` overflows
            let minus_one = crate::middle::ir::truncate(u128::MAX, bits);
            if divisor == minus_one {
                let min = 1u128 << (bits - 1);
                match constant_bits(lhs) {
                    Some(dividend) if dividend != min => {}
                    _ => return Err(Unpromotable::Division),
                }
            }
        }
        Ok(())
    }

    fn validate_call(
        &self,
        func: &Operand,
        args: &[Operand],
    ) -> Result<(), Unpromotable> {
        let fn_ty = self.body.operand_ty(self.module, func);
        let Ty::FnDef(id) = fn_ty else {
            return Err(Unpromotable::FnPtrCall);
        };
        self.rules.check_call(self.ccx, func)?;
        if let Some(op) = unconst_op_in_call(self.module, &fn_ty) {
            return Err(Unpromotable::Unconst(op));
        }

        let decl = self.module.function(id);
        if !self.explicit && !decl.promotable {
            return Err(Unpromotable::NotPromotableFn(decl.name.clone()));
        }

        self.validate_operand(func)?;
        for arg in args {
            self.validate_operand(arg)?;
        }
        Ok(())
    }
}

fn constant_bits(operand: &Operand) -> Option<u128> {
    match operand {
        Operand::Constant(c) => c.try_eval_bits(),
        _ => None,
    }
}

/// Split candidates into promotable ones and rejected ones with a reason
pub fn validate_candidates(
    ccx: &ConstCx<'_>,
    rules: &dyn ConstLegality,
    temps: &[TempState],
    candidates: &[Candidate],
) -> (Vec<Candidate>, Vec<(Candidate, Unpromotable)>) {
    let mut validator = Validator::new(ccx, rules, temps);
    let mut valid = Vec::new();
    let mut rejected = Vec::new();

    for &candidate in candidates {
        match validator.validate_candidate(candidate) {
            Ok(()) => valid.push(candidate),
            Err(reason) => {
                debug!(
                    "`{}`: {} not promotable: {}",
                    ccx.body.display_name(),
                    candidate,
                    reason
                );
                rejected.push((candidate, reason));
            }
        }
    }
    (valid, rejected)
}
