//! Allowed-in-constants rules
//!
//! What may appear inside a const, static or const fn body. Promotion
//! reuses the same rules: an expression is only promotable if it would
//! already be accepted inside an explicit constant.

use crate::middle::ir::{
    Body, BorrowKind, ConstContext, ConstKind, Location, Operand, Place,
    ProjectionElem, Rvalue, TerminatorKind,
};
use crate::middle::ty::{ModuleIR, Mutability, Ty};
use crate::middle::visit::{PlaceContext, Visitor};
use crate::util::span::Span;
use thiserror::Error;
use tracing::debug;

/// Body plus the const context it is checked in
#[derive(Clone, Copy)]
pub struct ConstCx<'a> {
    pub module: &'a ModuleIR,
    pub body: &'a Body,
    pub const_kind: Option<ConstContext>,
}

impl<'a> ConstCx<'a> {
    pub fn new(
        module: &'a ModuleIR,
        body: &'a Body,
    ) -> Self {
        Self {
            module,
            body,
            const_kind: body.const_context(),
        }
    }

    /// Context the rules are applied in. Code promoted out of a runtime
    /// function is evaluated like the body of a `const` item.
    pub fn legality_context(&self) -> ConstContext {
        self.const_kind.unwrap_or(ConstContext::Const)
    }

    pub fn is_static(&self) -> bool {
        matches!(self.const_kind, Some(ConstContext::Static(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotConst {
    #[error("heap allocations are not allowed in {0}")]
    HeapAllocation(&'static str),
    #[error("thread-local statics cannot be accessed in {0}")]
    ThreadLocal(&'static str),
    #[error("dereferencing raw pointers is not allowed in {0}")]
    RawPtrDeref(&'static str),
    #[error("cannot call non-const fn `{name}` in {context}")]
    NonConstFn { name: String, context: &'static str },
    #[error("function pointers cannot be called in {0}")]
    FnPtrCall(&'static str),
    #[error("mutable references are not allowed in {0}")]
    MutBorrow(&'static str),
    #[error("{context} cannot refer to static `{name}`")]
    StaticAccess { name: String, context: &'static str },
}

impl NotConst {
    /// The kind of const context the violation happened in
    pub fn context(&self) -> &'static str {
        match self {
            NotConst::HeapAllocation(context)
            | NotConst::ThreadLocal(context)
            | NotConst::RawPtrDeref(context)
            | NotConst::FnPtrCall(context)
            | NotConst::MutBorrow(context)
            | NotConst::NonConstFn { context, .. }
            | NotConst::StaticAccess { context, .. } => context,
        }
    }
}

fn context_name(kind: ConstContext) -> &'static str {
    match kind {
        ConstContext::ConstFn => "constant functions",
        ConstContext::Const => "constants",
        ConstContext::Static(Mutability::Not) => "statics",
        ConstContext::Static(Mutability::Mut) => "mutable statics",
    }
}

/// The rule set. Implementations must be pure: the same question always
/// gets the same answer.
pub trait ConstLegality: Send + Sync {
    fn check_rvalue(
        &self,
        cx: &ConstCx<'_>,
        rvalue: &Rvalue,
    ) -> Result<(), NotConst>;

    fn check_operand(
        &self,
        cx: &ConstCx<'_>,
        operand: &Operand,
    ) -> Result<(), NotConst>;

    fn check_place(
        &self,
        cx: &ConstCx<'_>,
        place: &Place,
    ) -> Result<(), NotConst>;

    fn check_call(
        &self,
        cx: &ConstCx<'_>,
        func: &Operand,
    ) -> Result<(), NotConst>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConstLegality;

impl ConstLegality for DefaultConstLegality {
    fn check_rvalue(
        &self,
        cx: &ConstCx<'_>,
        rvalue: &Rvalue,
    ) -> Result<(), NotConst> {
        let kind = cx.legality_context();
        let context = context_name(kind);
        match rvalue {
            Rvalue::HeapAlloc(_) => Err(NotConst::HeapAllocation(context)),
            Rvalue::ThreadLocalRef(_) => Err(NotConst::ThreadLocal(context)),
            // Address-observing operations are left to
            // `const_safety::code`, which honors `unconst` scopes.
            Rvalue::Ref(BorrowKind::Mut, place) | Rvalue::AddressOf(Mutability::Mut, place) => {
                let ty = cx.body.place_ty(cx.module, place);
                let allowed = ty.is_zero_length_array()
                    || matches!(
                        kind,
                        ConstContext::ConstFn | ConstContext::Static(Mutability::Mut)
                    );
                if allowed {
                    Ok(())
                } else {
                    Err(NotConst::MutBorrow(context))
                }
            }
            _ => Ok(()),
        }
    }

    fn check_operand(
        &self,
        cx: &ConstCx<'_>,
        operand: &Operand,
    ) -> Result<(), NotConst> {
        let Operand::Constant(constant) = operand else {
            return Ok(());
        };
        let ConstKind::Static(id) = constant.kind else {
            return Ok(());
        };
        let kind = cx.legality_context();
        let def = cx.module.static_def(id);
        if def.thread_local {
            return Err(NotConst::ThreadLocal(context_name(kind)));
        }
        // Only other statics may refer to statics, mutable ones included.
        match kind {
            ConstContext::Static(_) => Ok(()),
            _ => Err(NotConst::StaticAccess {
                name: def.name.clone(),
                context: context_name(kind),
            }),
        }
    }

    fn check_place(
        &self,
        cx: &ConstCx<'_>,
        place: &Place,
    ) -> Result<(), NotConst> {
        let context = context_name(cx.legality_context());
        let mut base = Place::local(place.local);
        for elem in &place.projection {
            if *elem == ProjectionElem::Deref && cx.body.place_ty(cx.module, &base).is_raw_ptr() {
                return Err(NotConst::RawPtrDeref(context));
            }
            base = base.project(elem.clone());
        }
        Ok(())
    }

    fn check_call(
        &self,
        cx: &ConstCx<'_>,
        func: &Operand,
    ) -> Result<(), NotConst> {
        let context = context_name(cx.legality_context());
        match cx.body.operand_ty(cx.module, func) {
            Ty::FnDef(id) => {
                let decl = cx.module.function(id);
                if decl.is_const_callable() {
                    Ok(())
                } else {
                    Err(NotConst::NonConstFn {
                        name: decl.name.clone(),
                        context,
                    })
                }
            }
            _ => Err(NotConst::FnPtrCall(context)),
        }
    }
}

/// A rule violation inside a const-context body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstViolation {
    pub error: NotConst,
    pub location: Location,
    pub span: Span,
}

/// Applies a `ConstLegality` rule set to every const-context body
pub struct ConstChecker<'r> {
    rules: &'r dyn ConstLegality,
}

impl<'r> ConstChecker<'r> {
    pub fn new(rules: &'r dyn ConstLegality) -> Self {
        Self { rules }
    }

    /// Violations in `body`; runtime functions have none by definition
    pub fn check_body(
        &self,
        module: &ModuleIR,
        body: &Body,
    ) -> Vec<ConstViolation> {
        let cx = ConstCx::new(module, body);
        if cx.const_kind.is_none() {
            return Vec::new();
        }

        let mut visitor = CheckVisitor {
            cx,
            rules: self.rules,
            violations: Vec::new(),
        };
        visitor.visit_body(body);
        debug!(
            "const check of `{}`: {} violation(s)",
            body.display_name(),
            visitor.violations.len()
        );
        visitor.violations
    }
}

struct CheckVisitor<'a, 'r> {
    cx: ConstCx<'a>,
    rules: &'r dyn ConstLegality,
    violations: Vec<ConstViolation>,
}

impl CheckVisitor<'_, '_> {
    fn record(
        &mut self,
        result: Result<(), NotConst>,
        location: Location,
    ) {
        if let Err(error) = result {
            let span = self.cx.body.source_info(location).span;
            self.violations.push(ConstViolation {
                error,
                location,
                span,
            });
        }
    }
}

impl Visitor for CheckVisitor<'_, '_> {
    fn visit_rvalue(
        &mut self,
        rvalue: &Rvalue,
        location: Location,
    ) {
        let result = self.rules.check_rvalue(&self.cx, rvalue);
        self.record(result, location);
        self.super_rvalue(rvalue, location);
    }

    fn visit_operand(
        &mut self,
        operand: &Operand,
        location: Location,
    ) {
        let result = self.rules.check_operand(&self.cx, operand);
        self.record(result, location);
        self.super_operand(operand, location);
    }

    fn visit_place(
        &mut self,
        place: &Place,
        context: PlaceContext,
        location: Location,
    ) {
        let result = self.rules.check_place(&self.cx, place);
        self.record(result, location);
        self.super_place(place, context, location);
    }

    fn visit_terminator(
        &mut self,
        terminator: &crate::middle::ir::Terminator,
        location: Location,
    ) {
        if let TerminatorKind::Call { func, .. } = &terminator.kind {
            let result = self.rules.check_call(&self.cx, func);
            self.record(result, location);
        }
        self.super_terminator(terminator, location);
    }
}

#[cfg(test)]
mod tests;
