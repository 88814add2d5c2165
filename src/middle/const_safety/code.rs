//! Code-level const safety
//!
//! Some operations give different answers at compile time and at runtime,
//! because they observe addresses: comparing raw pointers, turning a pointer
//! into an integer, hashing an address. Const code may only perform them
//! inside an `unconst` block, where the author vouches for the result.

use crate::middle::const_check::ConstCx;
use crate::middle::ir::{BinOp, Body, CastKind, Location, Rvalue, Terminator, TerminatorKind};
use crate::middle::ty::{FnKind, ModuleIR, Ty};
use crate::middle::visit::Visitor;
use crate::util::span::Span;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnconstOp {
    #[error("comparison of raw pointers")]
    PtrComparison,
    #[error("raw pointer offset")]
    PtrOffset,
    #[error("cast of a pointer to an integer")]
    PtrToIntCast,
    #[error("call to address-sensitive function `{0}`")]
    AddressSensitiveCall(String),
}

/// Unconst operation performed by `rvalue`, if any
pub fn unconst_op_in_rvalue(
    cx: &ConstCx<'_>,
    rvalue: &Rvalue,
) -> Option<UnconstOp> {
    match rvalue {
        Rvalue::BinaryOp(op, operands) | Rvalue::CheckedBinaryOp(op, operands) => {
            let lhs_ty = cx.body.operand_ty(cx.module, &operands.0);
            if !lhs_ty.is_address_like() {
                return None;
            }
            match op {
                BinOp::Offset => Some(UnconstOp::PtrOffset),
                op if op.is_comparison() => Some(UnconstOp::PtrComparison),
                _ => None,
            }
        }
        Rvalue::Cast(CastKind::PointerExposeAddress, _, _) => Some(UnconstOp::PtrToIntCast),
        _ => None,
    }
}

/// Unconst operation performed by calling a value of type `func_ty`
pub fn unconst_op_in_call(
    module: &ModuleIR,
    func_ty: &Ty,
) -> Option<UnconstOp> {
    match func_ty {
        Ty::FnDef(id) => {
            let decl = module.function(*id);
            (decl.kind == FnKind::AddressSensitive)
                .then(|| UnconstOp::AddressSensitiveCall(decl.name.clone()))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconstViolation {
    pub op: UnconstOp,
    pub location: Location,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct UnconstChecker;

impl UnconstChecker {
    pub fn new() -> Self {
        Self
    }

    /// Unconst operations outside `unconst` blocks. Runtime functions are
    /// never checked.
    pub fn check_body(
        &self,
        module: &ModuleIR,
        body: &Body,
    ) -> Vec<UnconstViolation> {
        let cx = ConstCx::new(module, body);
        if cx.const_kind.is_none() {
            return Vec::new();
        }
        let mut visitor = UnconstVisitor {
            cx,
            violations: Vec::new(),
        };
        visitor.visit_body(body);
        debug!(
            "unconst check of `{}`: {} violation(s)",
            body.display_name(),
            visitor.violations.len()
        );
        visitor.violations
    }
}

struct UnconstVisitor<'a> {
    cx: ConstCx<'a>,
    violations: Vec<UnconstViolation>,
}

impl UnconstVisitor<'_> {
    fn record(
        &mut self,
        op: Option<UnconstOp>,
        location: Location,
    ) {
        let Some(op) = op else {
            return;
        };
        let info = self.cx.body.source_info(location);
        if self.cx.body.in_unconst_scope(info.scope) {
            return;
        }
        self.violations.push(UnconstViolation {
            op,
            location,
            span: info.span,
        });
    }
}

impl Visitor for UnconstVisitor<'_> {
    fn visit_rvalue(
        &mut self,
        rvalue: &Rvalue,
        location: Location,
    ) {
        let op = unconst_op_in_rvalue(&self.cx, rvalue);
        self.record(op, location);
        self.super_rvalue(rvalue, location);
    }

    fn visit_terminator(
        &mut self,
        terminator: &Terminator,
        location: Location,
    ) {
        if let TerminatorKind::Call { func, .. } = &terminator.kind {
            let func_ty = self.cx.body.operand_ty(self.cx.module, func);
            let op = unconst_op_in_call(self.cx.module, &func_ty);
            self.record(op, location);
        }
        self.super_terminator(terminator, location);
    }
}

#[cfg(test)]
mod tests;
