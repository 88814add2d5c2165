//! 分析流水线测试

use crate::middle::builder::BodyBuilder;
use crate::middle::ir::{
    AssertKind, BinOp, Body, BodyKind, BorrowKind, Operand, Place, Rvalue, Safety,
    TerminatorKind,
};
use crate::middle::passes::{AnalysisReport, Analyzer};
use crate::middle::ty::{FnDecl, FnKind, IntTy, ModuleIR, Mutability, Ty, UintTy};
use crate::util::config::{Config, LintLevel};
use crate::util::diagnostic::Severity;
use crate::util::span::{Position, Span};

fn i32_ty() -> Ty {
    Ty::Int(IntTy::I32)
}

fn int(v: i128) -> Operand {
    Operand::int(i32_ty(), v)
}

fn add(
    lhs: Operand,
    rhs: Operand,
) -> Rvalue {
    Rvalue::BinaryOp(BinOp::Add, Box::new((lhs, rhs)))
}

fn sequential() -> Config {
    let mut config = Config::default();
    config.analysis.parallel = false;
    config
}

fn codes(report: &AnalysisReport) -> Vec<&str> {
    report.diagnostics.iter().map(|d| d.code.as_str()).collect()
}

/// `const NAME: i32 = <rvalue>;`
fn const_item(
    name: &str,
    rvalue: Rvalue,
) -> Body {
    let mut b = BodyBuilder::new(name, BodyKind::Const, i32_ty(), vec![]);
    b.assign(Place::return_place(), rvalue);
    b.ret();
    b.finish()
}

/// `fn f() -> i32 { let r = &(1 + 2); *r }`
fn borrowing_fn() -> Body {
    let mut b = BodyBuilder::new("f", BodyKind::Fn, i32_ty(), vec![]);
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(t, add(int(1), int(2)));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::Copy(Place::local(r).deref())));
    b.ret();
    b.finish()
}

/// Const fn calling an address-sensitive (but const) function
fn address_sensitive_module() -> ModuleIR {
    let mut module = ModuleIR::default();
    let hash = module.add_function(FnDecl {
        is_const: true,
        kind: FnKind::AddressSensitive,
        ..FnDecl::new("addr_hash", vec![], Ty::usize())
    });
    let mut b = BodyBuilder::new("g", BodyKind::ConstFn, Ty::usize(), vec![]);
    b.call(hash, vec![], Place::return_place());
    b.ret();
    module.add_body(b.finish());
    module
}

#[test]
fn test_promotes_and_evaluates() {
    let mut module = ModuleIR::default();
    module.add_body(borrowing_fn());
    module.add_body(const_item("ANSWER", add(int(40), int(2))));

    let report = Analyzer::new(sequential()).run(&mut module).unwrap();
    assert!(!report.has_errors(), "{:?}", report.diagnostics);
    assert_eq!(report.bodies.len(), 2);

    let f = report.body("f").unwrap();
    assert_eq!(f.promotion.promoted.len(), 1);
    assert_eq!(module.bodies[0].promoted.len(), 1);

    let answer = report.item("ANSWER").unwrap();
    assert_eq!(answer.ty, "i32");
    assert_eq!(answer.value, "42_i32");
    assert_eq!(report.items.len(), 1);
}

#[test]
fn test_parallel_run_matches_sequential() {
    let build = || {
        let mut module = address_sensitive_module();
        module.add_body(borrowing_fn());
        module.add_body(const_item("A", Rvalue::Use(int(1))));
        module.add_body(const_item("B", Rvalue::HeapAlloc(i32_ty())));
        module
    };
    let mut parallel_module = build();
    let mut sequential_module = build();
    let parallel = Analyzer::new(Config::default()).run(&mut parallel_module).unwrap();
    let sequential = Analyzer::new(sequential()).run(&mut sequential_module).unwrap();

    assert_eq!(parallel.diagnostics, sequential.diagnostics);
    assert_eq!(parallel.items, sequential.items);
    assert_eq!(parallel_module, sequential_module);
}

#[test]
fn test_not_const_operation_is_e0001() {
    let mut module = ModuleIR::default();
    module.add_body(const_item("BAD", Rvalue::HeapAlloc(i32_ty())));

    let report = Analyzer::new(sequential()).run(&mut module).unwrap();
    assert_eq!(codes(&report), vec!["E0001"]);
    let diagnostic = &report.diagnostics[0];
    assert_eq!(diagnostic.message, "heap allocations are not allowed in constants");
    assert_eq!(diagnostic.item.as_deref(), Some("BAD"));
    // the item is not evaluated on top of that
    assert!(report.items.is_empty());
}

#[test]
fn test_failing_item_is_e0002() {
    let mut module = ModuleIR::default();
    let mut b = BodyBuilder::new("BOOM", BodyKind::Const, i32_ty(), vec![]);
    b.assert(Operand::bool(false), true, AssertKind::Custom("boom".to_string()));
    b.assign(Place::return_place(), Rvalue::Use(int(0)));
    b.ret();
    module.add_body(b.finish());

    let report = Analyzer::new(sequential()).run(&mut module).unwrap();
    assert_eq!(codes(&report), vec!["E0002"]);
    assert_eq!(
        report.diagnostics[0].message,
        "evaluation of `BOOM` failed: evaluation panicked: boom"
    );
}

#[test]
fn test_runtime_argument_for_const_parameter_is_e0003() {
    let mut module = ModuleIR::default();
    let shuffle = module.add_function(FnDecl {
        required_const_args: vec![0],
        ..FnDecl::new("shuffle", vec![Ty::Uint(UintTy::U32)], Ty::Unit)
    });
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![Ty::Uint(UintTy::U32)]);
    let n = b.arg(0);
    b.call(shuffle, vec![Operand::Copy(Place::local(n))], Place::return_place());
    b.ret();
    module.add_body(b.finish());

    let report = Analyzer::new(sequential()).run(&mut module).unwrap();
    assert_eq!(codes(&report), vec!["E0003"]);
    assert_eq!(
        report.diagnostics[0].message,
        "argument 1 of `shuffle` must be a constant"
    );
}

#[test]
fn test_runtime_argument_links_to_its_origin() {
    let mut module = ModuleIR::default();
    let shuffle = module.add_function(FnDecl {
        required_const_args: vec![0],
        ..FnDecl::new("shuffle", vec![Ty::Uint(UintTy::U32)], Ty::Unit)
    });
    let computed = Span::new(Position::new(3, 13), Position::new(3, 18));
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![Ty::Uint(UintTy::U32)]);
    let n = b.arg(0);
    let t = b.temp(Ty::Uint(UintTy::U32));
    b.at(computed);
    b.assign(t, Rvalue::Use(Operand::Copy(Place::local(n))));
    b.at(Span::new(Position::new(4, 5), Position::new(4, 16)));
    b.call(shuffle, vec![Operand::Move(Place::local(t))], Place::return_place());
    b.ret();
    module.add_body(b.finish());

    let report = Analyzer::new(sequential()).run(&mut module).unwrap();
    assert_eq!(codes(&report), vec!["E0003"]);
    let related = &report.diagnostics[0].related;
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].code, "N0001");
    assert_eq!(related[0].severity, Severity::Hint);
    assert_eq!(related[0].message, "argument 1 gets its value here");
    assert_eq!(related[0].span, Some(computed));
}

#[test]
fn test_exhausted_promotion_becomes_runtime_panic() {
    let mut module = ModuleIR::default();
    module.add_body(borrowing_fn());
    let mut config = sequential();
    config.eval.step_limit = 1;

    let report = Analyzer::new(config).run(&mut module).unwrap();
    assert_eq!(codes(&report), vec!["W0001"]);
    assert!(!report.has_errors());
    assert!(report.diagnostics[0].message.contains("step limit of 1 reached"));

    let f = &module.bodies[0];
    assert_eq!(f.promoted.len(), 1);
    assert!(f.basic_blocks.iter().any(|data| matches!(
        &data.terminator.kind,
        TerminatorKind::Assert { cond, .. } if *cond == Operand::bool(false)
    )));
}

#[test]
fn test_panicking_promotion_is_w0001() {
    let mut module = ModuleIR::default();
    let mut callee = BodyBuilder::new("boom", BodyKind::ConstFn, i32_ty(), vec![]);
    callee.assert(Operand::bool(false), true, AssertKind::Custom("explicit panic".to_string()));
    callee.assign(Place::return_place(), Rvalue::Use(int(1)));
    callee.ret();
    let callee_body = module.add_body(callee.finish());
    let boom = module.add_function(FnDecl {
        is_const: true,
        promotable: true,
        body: Some(callee_body),
        ..FnDecl::new("boom", vec![], i32_ty())
    });

    let mut b = BodyBuilder::new("f", BodyKind::Fn, i32_ty(), vec![]);
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.call(boom, vec![], t);
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::Copy(Place::local(r).deref())));
    b.ret();
    module.add_body(b.finish());

    let report = Analyzer::new(sequential()).run(&mut module).unwrap();
    assert_eq!(codes(&report), vec!["W0001"]);
    assert!(!report.has_errors());
    assert_eq!(report.warning_count(), 1);
    assert!(report.diagnostics[0].message.contains("explicit panic"));
}

#[test]
fn test_unconst_lint_levels() {
    let level = |unconst: LintLevel| {
        let mut config = sequential();
        config.lint.unconst = unconst;
        let module = address_sensitive_module();
        Analyzer::new(config).check(&module)
    };

    let deny = level(LintLevel::Deny);
    assert_eq!(codes(&deny), vec!["E0004"]);
    assert!(deny.has_errors());

    let warn = level(LintLevel::Warn);
    assert_eq!(codes(&warn), vec!["W0002"]);
    assert_eq!(warn.diagnostics[0].severity, Severity::Warning);

    let allow = level(LintLevel::Allow);
    assert!(allow.diagnostics.is_empty());
    assert!(allow.bodies[0].unconst_violations.is_empty());
}

/// `const fn same(a: *const u8, b: *const u8) -> bool { a == b }`, the
/// comparison optionally inside an `unconst` block
fn pointer_comparison(unconst: bool) -> ModuleIR {
    let ptr_ty = Ty::RawPtr(Mutability::Not, Box::new(Ty::Uint(UintTy::U8)));
    let mut b = BodyBuilder::new("same", BodyKind::ConstFn, Ty::Bool, vec![ptr_ty.clone(), ptr_ty]);
    let (lhs, rhs) = (b.arg(0), b.arg(1));
    let scope = unconst.then(|| b.enter_scope(Safety::Unconst));
    b.assign(
        Place::return_place(),
        Rvalue::BinaryOp(
            BinOp::Eq,
            Box::new((Operand::Copy(Place::local(lhs)), Operand::Copy(Place::local(rhs)))),
        ),
    );
    if let Some(scope) = scope {
        b.exit_scope(scope);
    }
    b.ret();
    let mut module = ModuleIR::default();
    module.add_body(b.finish());
    module
}

#[test]
fn test_pointer_comparison_needs_unconst_block() {
    let report = Analyzer::new(sequential()).check(&pointer_comparison(false));
    assert_eq!(codes(&report), vec!["E0004"]);

    let report = Analyzer::new(sequential()).check(&pointer_comparison(true));
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);

    // a warning once the lint is lowered
    let mut config = sequential();
    config.lint.unconst = LintLevel::Warn;
    let report = Analyzer::new(config).check(&pointer_comparison(false));
    assert_eq!(codes(&report), vec!["W0002"]);
    assert!(!report.has_errors());
}

#[test]
fn test_check_leaves_module_unchanged() {
    let mut module = ModuleIR::default();
    module.add_body(borrowing_fn());
    let before = module.clone();

    let report = Analyzer::new(Config::default()).check(&module);
    assert!(report.diagnostics.is_empty());
    assert!(report.items.is_empty());
    assert_eq!(module, before);
}

#[test]
fn test_promotion_can_be_disabled() {
    let mut config = sequential();
    config.promotion.enabled = false;
    let mut module = ModuleIR::default();
    module.add_body(borrowing_fn());
    let before = module.clone();

    let report = Analyzer::new(config).run(&mut module).unwrap();
    assert!(report.bodies[0].promotion.promoted.is_empty());
    assert_eq!(module, before);
}

#[test]
fn test_body_summary() {
    let mut module = ModuleIR::default();
    module.add_body(borrowing_fn());
    let report = Analyzer::new(sequential()).run(&mut module).unwrap();

    let summary = report.bodies[0].summary();
    assert_eq!(summary.name, "f");
    assert_eq!(summary.promoted, 1);
    assert_eq!(summary.rejected, 0);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["kind"], "Fn");
}
