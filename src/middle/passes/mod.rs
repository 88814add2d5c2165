//! 分析流水线
//!
//! `Analyzer` runs every pass over a module: the const checks on each
//! body, promotion of temporaries, and finally evaluation of `const` and
//! `static` items. Findings are turned into registered diagnostics.
//!
//! Bodies are independent of each other once the module is fixed, so
//! they are analyzed against an immutable snapshot of the module, on the
//! rayon thread pool unless `[analysis] parallel = false`.

use crate::middle::const_check::{ConstChecker, ConstLegality, ConstViolation, DefaultConstLegality};
use crate::middle::const_safety::{UnconstChecker, UnconstViolation};
use crate::middle::interpret::{render_value, InterpError, Interpreter};
use crate::middle::ir::{BasicBlock, Body, BodyKind, Local, LocalKind, StatementKind, TerminatorKind};
use crate::middle::promote::{Candidate, PromoteTemps, PromotionError, PromotionReport, RuntimeFailure};
use crate::middle::ty::{ModuleIR, Ty};
use crate::util::config::{Config, LintLevel};
use crate::util::diagnostic::{Diagnostic, ErrorCodeDefinition};
use crate::util::span::Span;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

static DEFAULT_RULES: DefaultConstLegality = DefaultConstLegality;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Promotion(#[from] PromotionError),
}

/// Everything the passes found in one body
#[derive(Debug, Clone)]
pub struct BodyReport {
    pub name: String,
    pub kind: BodyKind,
    pub const_violations: Vec<ConstViolation>,
    pub unconst_violations: Vec<UnconstViolation>,
    /// Empty when promotion did not run
    pub promotion: PromotionReport,
    pub diagnostics: Vec<Diagnostic>,
}

impl BodyReport {
    fn new(body: &Body) -> Self {
        Self {
            name: body.display_name(),
            kind: body.source.kind,
            const_violations: Vec::new(),
            unconst_violations: Vec::new(),
            promotion: PromotionReport::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn summary(&self) -> BodySummary {
        BodySummary {
            name: self.name.clone(),
            kind: self.kind,
            promoted: self.promotion.promoted.len(),
            rejected: self.promotion.rejected.len(),
            lifetime_extended: self.promotion.lifetime_extended.len(),
            runtime_failures: self.promotion.runtime_failures.clone(),
        }
    }
}

/// Serializable counts of a `BodyReport`, for JSON output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BodySummary {
    pub name: String,
    pub kind: BodyKind,
    pub promoted: usize,
    pub rejected: usize,
    pub lifetime_extended: usize,
    pub runtime_failures: Vec<RuntimeFailure>,
}

/// Value a `const` or `static` item evaluated to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemValue {
    pub name: String,
    pub ty: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// In the order of `ModuleIR::bodies`
    pub bodies: Vec<BodyReport>,
    pub items: Vec<ItemValue>,
    /// Every diagnostic of the run, body by body, item evaluation last
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }

    pub fn body(
        &self,
        name: &str,
    ) -> Option<&BodyReport> {
        self.bodies.iter().find(|report| report.name == name)
    }

    pub fn item(
        &self,
        name: &str,
    ) -> Option<&ItemValue> {
        self.items.iter().find(|item| item.name == name)
    }

    fn collect_diagnostics(&mut self) {
        self.diagnostics = self
            .bodies
            .iter()
            .flat_map(|report| report.diagnostics.iter().cloned())
            .collect();
    }
}

/// Runs the passes over a module with one configuration
pub struct Analyzer<'r> {
    config: Config,
    rules: &'r dyn ConstLegality,
}

impl Analyzer<'static> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            rules: &DEFAULT_RULES,
        }
    }
}

impl<'r> Analyzer<'r> {
    /// Use another rule set for const legality
    pub fn with_rules<'s>(
        self,
        rules: &'s dyn ConstLegality,
    ) -> Analyzer<'s> {
        Analyzer {
            config: self.config,
            rules,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn promoter(&self) -> PromoteTemps<'r> {
        PromoteTemps::new(self.rules)
            .with_interp_config(self.config.eval.into())
            .with_lifetime_extension(self.config.promotion.lifetime_extension)
    }

    /// Check, promote and evaluate. Bodies of `module` are rewritten in
    /// place; promoted constants are attached to the body they came from.
    pub fn run(
        &self,
        module: &mut ModuleIR,
    ) -> Result<AnalysisReport, AnalysisError> {
        let snapshot = module.clone();
        let analyze = |body: &mut Body| self.analyze_body(&snapshot, body);
        let bodies = if self.config.analysis.parallel {
            module
                .bodies
                .par_iter_mut()
                .map(analyze)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            module.bodies.iter_mut().map(analyze).collect::<Result<Vec<_>, _>>()?
        };

        let mut report = AnalysisReport {
            bodies,
            ..AnalysisReport::default()
        };
        report.collect_diagnostics();
        self.eval_items(module, &mut report);
        info!(
            "analyzed {} bodies: {} errors, {} warnings",
            report.bodies.len(),
            report.error_count(),
            report.warning_count()
        );
        Ok(report)
    }

    /// Const legality and const safety checks only; the module is not changed
    pub fn check(
        &self,
        module: &ModuleIR,
    ) -> AnalysisReport {
        let check = |body: &Body| {
            let mut report = BodyReport::new(body);
            self.check_body(module, body, &mut report);
            report
        };
        let bodies = if self.config.analysis.parallel {
            module.bodies.par_iter().map(check).collect()
        } else {
            module.bodies.iter().map(check).collect()
        };
        let mut report = AnalysisReport {
            bodies,
            ..AnalysisReport::default()
        };
        report.collect_diagnostics();
        report
    }

    /// Evaluate one `const` or `static` body and render its value
    pub fn eval_item(
        &self,
        module: &ModuleIR,
        body: &Body,
    ) -> Result<ItemValue, InterpError> {
        let mut interp = Interpreter::new(module, self.config.eval.into());
        let result = interp.eval_const_item(body)?;
        Ok(ItemValue {
            name: body.display_name(),
            ty: module.ty_name(&result.ty),
            value: render_value(module, interp.memory(), &result.value, &result.ty),
        })
    }

    fn check_body(
        &self,
        module: &ModuleIR,
        body: &Body,
        report: &mut BodyReport,
    ) {
        report.const_violations = ConstChecker::new(self.rules).check_body(module, body);
        for violation in &report.const_violations {
            let error = &violation.error;
            let diagnostic = ErrorCodeDefinition::not_const(error.to_string(), error.context())
                .at(violation.span)
                .in_item(&report.name)
                .build();
            report.diagnostics.push(diagnostic);
        }

        if self.config.lint.unconst == LintLevel::Allow {
            return;
        }
        report.unconst_violations = UnconstChecker::new().check_body(module, body);
        for violation in &report.unconst_violations {
            let op = violation.op.to_string();
            let builder = match self.config.lint.unconst {
                LintLevel::Warn => ErrorCodeDefinition::unconst_operation_warn(op),
                _ => ErrorCodeDefinition::unconst_operation(op),
            };
            let diagnostic = builder.at(violation.span).in_item(&report.name).build();
            report.diagnostics.push(diagnostic);
        }
    }

    fn analyze_body(
        &self,
        module: &ModuleIR,
        body: &mut Body,
    ) -> Result<BodyReport, PromotionError> {
        let mut report = BodyReport::new(body);
        self.check_body(module, body, &mut report);
        if !self.config.promotion.enabled {
            return Ok(report);
        }

        // Runtime failures split blocks, so callees are looked up first.
        let callees = callee_names(module, body);
        let origins = argument_origins(body);
        report.promotion = self.promoter().run_pass(module, body)?;
        debug!(
            "`{}`: promoted {}, rejected {}, extended {}",
            report.name,
            report.promotion.promoted.len(),
            report.promotion.rejected.len(),
            report.promotion.lifetime_extended.len()
        );

        for rejected in report.promotion.argument_errors() {
            let Candidate::Argument { block, index } = rejected.candidate else {
                continue;
            };
            let callee = callees.get(&block).map_or("<unknown>", String::as_str);
            let related = origins
                .get(&(block, index))
                .map(|span| ErrorCodeDefinition::argument_origin(index + 1).at(*span).build())
                .into_iter()
                .collect();
            let diagnostic =
                ErrorCodeDefinition::argument_not_const(index + 1, callee, rejected.reason.to_string())
                    .at(rejected.span)
                    .in_item(&report.name)
                    .with_related(related)
                    .build();
            report.diagnostics.push(diagnostic);
        }
        for failure in &report.promotion.runtime_failures {
            let diagnostic = ErrorCodeDefinition::unconditional_panic(&report.name, &failure.message)
                .at(failure.span)
                .in_item(&report.name)
                .build();
            report.diagnostics.push(diagnostic);
        }
        Ok(report)
    }

    /// Evaluate `const` and `static` initializers whose bodies passed the
    /// checks
    fn eval_items(
        &self,
        module: &ModuleIR,
        report: &mut AnalysisReport,
    ) {
        let items: Vec<&Body> = module
            .bodies
            .iter()
            .zip(&report.bodies)
            .filter(|(body, body_report)| {
                matches!(body.source.kind, BodyKind::Const | BodyKind::Static(_))
                    && !body.is_promoted()
                    && !body_report.has_errors()
            })
            .map(|(body, _)| body)
            .collect();

        let eval = |body: &&Body| {
            self.eval_item(module, body).map_err(|err| {
                let name = body.display_name();
                ErrorCodeDefinition::const_eval_failed(&name, err.to_string())
                    .at(body.span)
                    .in_item(name)
                    .build()
            })
        };
        let results: Vec<Result<ItemValue, Diagnostic>> = if self.config.analysis.parallel {
            items.par_iter().map(eval).collect()
        } else {
            items.iter().map(eval).collect()
        };

        for result in results {
            match result {
                Ok(item) => {
                    debug!("`{}` = {}", item.name, item.value);
                    report.items.push(item);
                }
                Err(diagnostic) => report.diagnostics.push(diagnostic),
            }
        }
    }
}

/// Name of the function each `Call` terminator calls
fn callee_names(
    module: &ModuleIR,
    body: &Body,
) -> HashMap<BasicBlock, String> {
    body.basic_blocks
        .iter()
        .enumerate()
        .filter_map(|(index, data)| match &data.terminator.kind {
            TerminatorKind::Call { func, .. } => {
                let name = match body.operand_ty(module, func) {
                    Ty::FnDef(id) => module.function(id).name.clone(),
                    other => module.ty_name(&other),
                };
                Some((BasicBlock(index), name))
            }
            _ => None,
        })
        .collect()
}

/// Where each call argument read from a local gets its value: the
/// parameter declaration, or the last assignment to the local
fn argument_origins(body: &Body) -> HashMap<(BasicBlock, usize), Span> {
    let mut assigned: HashMap<Local, Span> = HashMap::new();
    for data in &body.basic_blocks {
        for statement in &data.statements {
            if let StatementKind::Assign(assign) = &statement.kind {
                if let Some(local) = assign.0.as_local() {
                    assigned.insert(local, statement.source_info.span);
                }
            }
        }
    }

    let mut origins = HashMap::new();
    for (index, data) in body.basic_blocks.iter().enumerate() {
        let TerminatorKind::Call { args, .. } = &data.terminator.kind else {
            continue;
        };
        for (position, arg) in args.iter().enumerate() {
            let Some(local) = arg.place().and_then(|place| place.as_local()) else {
                continue;
            };
            let span = match body.local_kind(local) {
                LocalKind::Arg => Some(body.local_decls[local.index()].span),
                _ => assigned.get(&local).copied(),
            };
            if let Some(span) = span {
                origins.insert((BasicBlock(index), position), span);
            }
        }
    }
    origins
}

#[cfg(test)]
mod tests;
