//! Promotion of temporaries
//!
//! Borrows of values that can be computed at compile time are rewritten to
//! borrow a promoted constant instead, which lives for the whole program:
//! `&(1 + 2)` no longer dies at the end of its statement. The same
//! machinery turns arguments the callee requires to be constant into
//! compile-time values.
//!
//! The pass runs in four steps over one body:
//!
//! 1. [`collect`] finds every temp's assignment and uses, and the candidates.
//! 2. [`validate`] rejects candidates whose value could differ, fail or be
//!    observed differently at compile time.
//! 3. [`promoter`] moves what remains into new promoted bodies, and
//!    [`lifetime`] extends the temps of rejected `let x = &temp` borrows.
//! 4. Every promoted body is evaluated. A failure the runtime would also
//!    hit is kept as a runtime panic ([`runtime_failure`]); anything else
//!    is a hard error.

pub mod collect;
pub mod lifetime;
pub mod promoter;
pub mod runtime_failure;
pub mod validate;

pub use collect::{Candidate, TempState};
pub use lifetime::LifetimeExtension;
pub use runtime_failure::RuntimeFailure;
pub use validate::Unpromotable;

use crate::middle::const_check::{ConstCx, ConstLegality, DefaultConstLegality};
use crate::middle::const_safety::value::{ValidityError, ValueValidator};
use crate::middle::interpret::{
    value_needs_drop, EvaluatedConst, InterpConfig, InterpError, InterpResult, Interpreter, Value,
};
use crate::middle::ir::{Body, PromotedId};
use crate::middle::ty::{ModuleIR, Ty};
use crate::util::span::Span;
use thiserror::Error;
use tracing::{debug, warn};

static DEFAULT_RULES: DefaultConstLegality = DefaultConstLegality;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedCandidate {
    pub candidate: Candidate,
    pub id: PromotedId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCandidate {
    pub candidate: Candidate,
    pub reason: Unpromotable,
    pub span: Span,
}

/// What promotion did to one body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionReport {
    pub promoted: Vec<PromotedCandidate>,
    pub rejected: Vec<RejectedCandidate>,
    pub lifetime_extended: Vec<LifetimeExtension>,
    pub runtime_failures: Vec<RuntimeFailure>,
}

impl PromotionReport {
    /// Required-constant arguments that could not be promoted
    pub fn argument_errors(&self) -> impl Iterator<Item = &RejectedCandidate> {
        self.rejected
            .iter()
            .filter(|rejected| rejected.candidate.forces_explicit_promotion())
    }
}

/// Why a promoted body was unusable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionFailure {
    #[error(transparent)]
    Eval(#[from] InterpError),
    #[error("the value is not const safe: {0}")]
    Value(#[from] ValidityError),
    #[error("a value of type `{0}` would need to be dropped")]
    NeedsDrop(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    /// The promoted code does something no constant may do. Validation
    /// should have rejected it, so compilation cannot continue.
    #[error("invalid promotion `{body}` at {span}: {reason}")]
    InvalidPromotion {
        body: String,
        span: Span,
        #[source]
        reason: PromotionFailure,
    },
}

/// The promotion pass
#[derive(Clone, Copy)]
pub struct PromoteTemps<'r> {
    rules: &'r dyn ConstLegality,
    interp: InterpConfig,
    lifetime_extension: bool,
}

impl Default for PromoteTemps<'static> {
    fn default() -> Self {
        Self::new(&DEFAULT_RULES)
    }
}

impl<'r> PromoteTemps<'r> {
    pub fn new(rules: &'r dyn ConstLegality) -> Self {
        Self {
            rules,
            interp: InterpConfig::default(),
            lifetime_extension: true,
        }
    }

    pub fn with_interp_config(
        mut self,
        interp: InterpConfig,
    ) -> Self {
        self.interp = interp;
        self
    }

    pub fn with_lifetime_extension(
        mut self,
        enabled: bool,
    ) -> Self {
        self.lifetime_extension = enabled;
        self
    }

    pub fn run_pass(
        &self,
        module: &ModuleIR,
        body: &mut Body,
    ) -> Result<PromotionReport, PromotionError> {
        let mut report = PromotionReport::default();
        // Promoted bodies are already constants.
        if body.is_promoted() {
            return Ok(report);
        }

        let (mut temps, valid, extensions, spans) = {
            let ccx = ConstCx::new(module, body);
            let (temps, candidates) = collect::collect_temps_and_candidates(&ccx);
            let (valid, rejected) =
                validate::validate_candidates(&ccx, self.rules, &temps, &candidates);
            let extensions = if self.lifetime_extension {
                lifetime::plan_extensions(&ccx, &temps, rejected.iter().map(|(c, _)| c))
            } else {
                Vec::new()
            };
            report.rejected = rejected
                .into_iter()
                .map(|(candidate, reason)| RejectedCandidate {
                    candidate,
                    reason,
                    span: candidate.source_info(body).span,
                })
                .collect();
            let spans: Vec<Span> = valid
                .iter()
                .map(|candidate| candidate.source_info(body).span)
                .collect();
            (temps, valid, extensions, spans)
        };
        debug!(
            "`{}`: {} promotable, {} rejected",
            body.display_name(),
            valid.len(),
            report.rejected.len()
        );

        let promoted = promoter::promote_candidates(module, body, &mut temps, &valid);
        for (candidate, id) in &promoted {
            let span = valid
                .iter()
                .position(|c| c == candidate)
                .map_or(body.span, |index| spans[index]);
            report.promoted.push(PromotedCandidate {
                candidate: *candidate,
                id: *id,
                span,
            });
        }

        for extension in extensions {
            if temps[extension.temp.index()] == TempState::PromotedOut {
                continue;
            }
            lifetime::apply_extension(body, &extension);
            report.lifetime_extended.push(extension);
        }

        self.evaluate_promoted(module, body, &promoted, &mut report)?;
        Ok(report)
    }

    /// Evaluate each new promoted body and enforce what may come out of it
    fn evaluate_promoted(
        &self,
        module: &ModuleIR,
        body: &mut Body,
        promoted: &[(Candidate, PromotedId)],
        report: &mut PromotionReport,
    ) -> Result<(), PromotionError> {
        let mut interp = Interpreter::new(module, self.interp);
        for &(candidate, id) in promoted {
            let promoted_body = &body.promoted[id.0];
            let name = promoted_body.display_name();
            let span = promoted_body.span;

            let outcome = interp.eval_const_body(promoted_body);
            let failure = match outcome {
                Ok(result) => match check_result(&interp, candidate, &result) {
                    Ok(()) => continue,
                    Err(failure) => failure,
                },
                Err(err) if err.is_runtime_reachable() => {
                    warn!("`{}` will fail at runtime: {}", name, err);
                    match runtime_failure::insert_runtime_panic(body, id, &err) {
                        Some(failure) => report.runtime_failures.push(failure),
                        None => warn!("no use of `{}` left in `{}`", name, body.display_name()),
                    }
                    continue;
                }
                Err(err) => PromotionFailure::Eval(err),
            };
            return Err(PromotionError::InvalidPromotion {
                body: name,
                span,
                reason: failure,
            });
        }
        Ok(())
    }
}

/// The value a promoted body computes must be a valid constant that never
/// needs dropping
fn check_result(
    interp: &Interpreter<'_>,
    candidate: Candidate,
    result: &EvaluatedConst,
) -> Result<(), PromotionFailure> {
    let module = interp.module();
    ValueValidator::new(module, interp.memory()).validate(&result.value, &result.ty)?;

    // A borrow hands out the pointee; an argument is passed by value.
    let (ty, value) = match (candidate, &result.ty) {
        (Candidate::Ref(_), Ty::Ref(_, pointee)) => {
            ((**pointee).clone(), pointee_value(interp, result)?)
        }
        _ => (result.ty.clone(), result.value.clone()),
    };
    if value_needs_drop(module, &ty, &value) {
        return Err(PromotionFailure::NeedsDrop(module.ty_name(&ty)));
    }
    Ok(())
}

fn pointee_value(
    interp: &Interpreter<'_>,
    result: &EvaluatedConst,
) -> InterpResult<Value> {
    let ptr = result.value.to_scalar()?.to_pointer()?;
    interp.memory().read(ptr)
}

#[cfg(test)]
mod tests;
