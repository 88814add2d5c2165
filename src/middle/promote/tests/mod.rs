//! 提升分析测试

use crate::middle::builder::BodyBuilder;
use crate::middle::const_check::NotConst;
use crate::middle::const_safety::code::UnconstOp;
use crate::middle::interpret::{
    FailureKind, InterpConfig, InterpError, Interpreter, Scalar, Value,
};
use crate::middle::ir::{
    AggregateKind, AssertKind, BasicBlock, BinOp, Body, BodyKind, BorrowKind, CastKind,
    ConstKind, Local, Location, Operand, Place, ProjectionElem, PromotedId, Rvalue, Safety,
    StatementKind, TerminatorKind,
};
use crate::middle::promote::{
    Candidate, PromoteTemps, PromotionError, PromotionReport, Unpromotable,
};
use crate::middle::ty::{
    AdtDef, AdtKind, BodyId, FnDecl, FnKind, IntTy, ModuleIR, Mutability, StaticDef, StaticId,
    Ty, UintTy, VariantDef,
};

fn i32_ty() -> Ty {
    Ty::Int(IntTy::I32)
}

fn int(v: i128) -> Operand {
    Operand::int(i32_ty(), v)
}

fn copy(local: Local) -> Operand {
    Operand::Copy(Place::local(local))
}

fn binary(
    op: BinOp,
    lhs: Operand,
    rhs: Operand,
) -> Rvalue {
    Rvalue::BinaryOp(op, Box::new((lhs, rhs)))
}

fn run(
    module: &ModuleIR,
    body: &mut Body,
) -> PromotionReport {
    PromoteTemps::default()
        .run_pass(module, body)
        .expect("promotion should succeed")
}

/// `_t = <rvalue>; _r = &_t; _0 = *_r` in a body of `kind`
fn borrow_of(
    kind: BodyKind,
    ty: Ty,
    rvalue: Rvalue,
) -> Body {
    let mut b = BodyBuilder::new("f", kind, ty.clone(), vec![]);
    let t = b.temp(ty.clone());
    let r = b.temp(Ty::shared_ref(ty));
    b.assign(t, rvalue);
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::Copy(Place::local(r).deref())));
    b.ret();
    b.finish()
}

fn rejection(report: &PromotionReport) -> Option<Unpromotable> {
    report.rejected.first().map(|rejected| rejected.reason.clone())
}

fn const_fn(
    name: &str,
    output: Ty,
    promotable: bool,
) -> FnDecl {
    FnDecl {
        name: name.to_string(),
        inputs: vec![],
        output,
        is_const: true,
        promotable,
        kind: FnKind::Normal,
        required_const_args: vec![],
        body: None,
    }
}

#[test]
fn test_promotes_borrow_of_constant_expression() {
    let module = ModuleIR::default();
    let mut body = borrow_of(BodyKind::Fn, i32_ty(), binary(BinOp::Add, int(1), int(2)));
    let report = run(&module, &mut body);

    assert_eq!(report.promoted.len(), 1);
    assert_eq!(report.promoted[0].id, PromotedId(0));
    assert_eq!(body.promoted.len(), 1);

    let promoted = &body.promoted[0];
    assert_eq!(promoted.source.promoted, Some(PromotedId(0)));
    assert_eq!(promoted.return_ty(), &Ty::shared_ref(i32_ty()));

    // `_3 = const promoted[0]; _2 = &(*_3); _0 = *_2`, the addition is gone
    let statements = &body.block(BasicBlock::START).statements;
    assert_eq!(statements.len(), 3);
    match &statements[0].kind {
        StatementKind::Assign(assign) => match &assign.1 {
            Rvalue::Use(Operand::Constant(c)) => {
                assert_eq!(c.kind, ConstKind::Promoted(PromotedId(0)))
            }
            other => panic!("unexpected rvalue {:?}", other),
        },
        other => panic!("unexpected statement {:?}", other),
    }
    match &statements[1].kind {
        StatementKind::Assign(assign) => {
            assert_eq!(
                assign.1,
                Rvalue::Ref(BorrowKind::Shared, Place::local(Local(3)).deref())
            );
        }
        other => panic!("unexpected statement {:?}", other),
    }

    let value = Interpreter::new(&module, InterpConfig::default())
        .eval_fn(&body, vec![])
        .unwrap();
    assert_eq!(value, Value::Scalar(Scalar::from_int(3, 32)));
}

#[test]
fn test_temp_with_other_uses_stays_in_source() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("f", BodyKind::Fn, i32_ty(), vec![]);
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(t, binary(BinOp::Mul, int(6), int(7)));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(copy(t)));
    b.ret();
    let mut body = b.finish();
    let before = Interpreter::new(&module, InterpConfig::default())
        .eval_fn(&body, vec![])
        .unwrap();

    let report = run(&module, &mut body);
    assert_eq!(report.promoted.len(), 1);
    let kept = body.block(BasicBlock::START).statements.iter().any(|s| {
        matches!(&s.kind, StatementKind::Assign(assign) if assign.0 == Place::local(t))
    });
    assert!(kept);

    // the direct read of `_t` still sees its value
    let after = Interpreter::new(&module, InterpConfig::default())
        .eval_fn(&body, vec![])
        .unwrap();
    assert_eq!(before, Value::Scalar(Scalar::from_int(42, 32)));
    assert_eq!(after, before);
}

#[test]
fn test_named_variables_are_never_promoted() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![]);
    let x = b.var(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(x, Rvalue::Use(int(1)));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(x)));
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(rejection(&report), Some(Unpromotable::NotATemp(x)));
}

#[test]
fn test_reassigned_temp_is_unpromotable() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![]);
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(t, Rvalue::Use(int(1)));
    b.assign(t, Rvalue::Use(int(2)));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert_eq!(rejection(&report), Some(Unpromotable::NotATemp(t)));
}

#[test]
fn test_interior_mutability_blocks_shared_borrow() {
    let mut module = ModuleIR::default();
    let cell = module.add_adt(AdtDef {
        name: "Cell".to_string(),
        kind: AdtKind::Struct,
        variants: vec![VariantDef {
            name: "Cell".to_string(),
            fields: vec![i32_ty()],
        }],
        has_drop_impl: false,
        interior_mut: true,
    });
    let mut body = borrow_of(
        BodyKind::Fn,
        Ty::Adt(cell),
        Rvalue::Aggregate(
            AggregateKind::Adt {
                adt: cell,
                variant: 0,
                active_field: None,
            },
            vec![int(3)],
        ),
    );

    let report = run(&module, &mut body);
    assert_eq!(rejection(&report), Some(Unpromotable::MutInterior));
}

#[test]
fn test_needs_drop_blocks_promotion() {
    let mut module = ModuleIR::default();
    let guard = module.add_adt(AdtDef {
        name: "Guard".to_string(),
        kind: AdtKind::Struct,
        variants: vec![VariantDef {
            name: "Guard".to_string(),
            fields: vec![],
        }],
        has_drop_impl: true,
        interior_mut: false,
    });
    let mut body = borrow_of(
        BodyKind::Fn,
        Ty::Adt(guard),
        Rvalue::Aggregate(
            AggregateKind::Adt {
                adt: guard,
                variant: 0,
                active_field: None,
            },
            vec![],
        ),
    );

    let report = run(&module, &mut body);
    assert_eq!(rejection(&report), Some(Unpromotable::NeedsDrop));
}

#[test]
fn test_division_needs_a_safe_constant_divisor() {
    let module = ModuleIR::default();

    let mut by_two = borrow_of(BodyKind::Fn, i32_ty(), binary(BinOp::Div, int(7), int(2)));
    assert_eq!(run(&module, &mut by_two).promoted.len(), 1);

    let mut by_zero = borrow_of(BodyKind::Fn, i32_ty(), binary(BinOp::Div, int(7), int(0)));
    assert_eq!(rejection(&run(&module, &mut by_zero)), Some(Unpromotable::Division));

    let mut overflow = borrow_of(
        BodyKind::Fn,
        i32_ty(),
        binary(BinOp::Rem, int(i32::MIN as i128), int(-1)),
    );
    assert_eq!(rejection(&run(&module, &mut overflow)), Some(Unpromotable::Division));

    // `-8 / -1` cannot overflow
    let mut negative = borrow_of(BodyKind::Fn, i32_ty(), binary(BinOp::Div, int(-8), int(-1)));
    assert_eq!(run(&module, &mut negative).promoted.len(), 1);
}

#[test]
fn test_division_by_runtime_value() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![i32_ty()]);
    let n = b.arg(0);
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(t, binary(BinOp::Div, int(10), copy(n)));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.ret();
    let mut body = b.finish();

    assert_eq!(rejection(&run(&module, &mut body)), Some(Unpromotable::Division));
}

#[test]
fn test_mutable_borrow_only_of_empty_array() {
    let module = ModuleIR::default();
    let build = |len: usize| {
        let ty = Ty::Array(Box::new(i32_ty()), len as u64);
        let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![]);
        let t = b.temp(ty.clone());
        let r = b.temp(Ty::Ref(Mutability::Mut, Box::new(ty)));
        b.assign(
            t,
            Rvalue::Aggregate(AggregateKind::Array(i32_ty()), vec![int(0); len]),
        );
        b.assign(r, Rvalue::Ref(BorrowKind::Mut, Place::local(t)));
        b.ret();
        b.finish()
    };

    let mut empty = build(0);
    let report = run(&module, &mut empty);
    assert_eq!(report.promoted.len(), 1);
    assert_eq!(
        empty.promoted[0].return_ty(),
        &Ty::Ref(Mutability::Mut, Box::new(Ty::Array(Box::new(i32_ty()), 0)))
    );

    let mut one = build(1);
    assert_eq!(rejection(&run(&module, &mut one)), Some(Unpromotable::MutBorrow));
}

#[test]
fn test_calls_need_promotable_fn_outside_constants() {
    let mut module = ModuleIR::default();
    let mut callee = BodyBuilder::new("len", BodyKind::ConstFn, Ty::usize(), vec![]);
    callee.assign(Place::return_place(), Rvalue::Use(Operand::int(Ty::usize(), 4)));
    callee.ret();
    let callee_body = module.add_body(callee.finish());
    let len = module.add_function(FnDecl {
        body: Some(callee_body),
        ..const_fn("len", Ty::usize(), false)
    });

    let build = |kind| {
        let mut b = BodyBuilder::new("ITEM", kind, Ty::shared_ref(Ty::usize()), vec![]);
        let t = b.temp(Ty::usize());
        b.call(len, vec![], t);
        b.assign(
            Place::return_place(),
            Rvalue::Ref(BorrowKind::Shared, Place::local(t)),
        );
        b.ret();
        b.finish()
    };

    let mut in_fn = build(BodyKind::Fn);
    assert_eq!(
        rejection(&run(&module, &mut in_fn)),
        Some(Unpromotable::NotPromotableFn("len".to_string()))
    );

    let mut in_const = build(BodyKind::Const);
    let report = run(&module, &mut in_const);
    assert_eq!(report.promoted.len(), 1);
    // the call now lives in the promoted body only
    assert!(matches!(
        in_const.block(BasicBlock::START).terminator.kind,
        TerminatorKind::Goto { .. }
    ));
    let mut interp = Interpreter::new(&module, InterpConfig::default());
    let result = interp.eval_const_body(&in_const).unwrap();
    let ptr = result.value.to_scalar().unwrap().to_pointer().unwrap().clone();
    assert_eq!(
        interp.memory().read(&ptr).unwrap(),
        Value::Scalar(Scalar::from_usize(4))
    );
}

#[test]
fn test_non_const_call_is_rejected() {
    let mut module = ModuleIR::default();
    let read = module.add_function(FnDecl {
        is_const: false,
        ..const_fn("read_line", i32_ty(), true)
    });
    let mut b = BodyBuilder::new("C", BodyKind::Const, Ty::shared_ref(i32_ty()), vec![]);
    let t = b.temp(i32_ty());
    b.call(read, vec![], t);
    b.assign(Place::return_place(), Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.ret();
    let mut body = b.finish();

    assert_eq!(
        rejection(&run(&module, &mut body)),
        Some(Unpromotable::NotConst(NotConst::NonConstFn {
            name: "read_line".to_string(),
            context: "constants",
        }))
    );
}

#[test]
fn test_address_observing_code_is_rejected() {
    let mut module = ModuleIR::default();
    let target = module.add_function(const_fn("target", Ty::Unit, true));
    let hash = module.add_function(FnDecl {
        inputs: vec![Ty::FnPtr],
        kind: FnKind::AddressSensitive,
        ..const_fn("hash_addr", Ty::usize(), true)
    });

    // `&(f as usize)`
    let mut cast = borrow_of(
        BodyKind::Fn,
        Ty::usize(),
        Rvalue::Cast(
            CastKind::PointerExposeAddress,
            Operand::constant(Ty::FnPtr, ConstKind::Fn(target)),
            Ty::usize(),
        ),
    );
    assert_eq!(
        rejection(&run(&module, &mut cast)),
        Some(Unpromotable::Unconst(UnconstOp::PtrToIntCast))
    );

    // `&hash_addr(f)`, even inside an unconst block
    let mut b = BodyBuilder::new("C", BodyKind::Const, Ty::shared_ref(Ty::usize()), vec![]);
    let outer = b.enter_scope(Safety::Unconst);
    let t = b.temp(Ty::usize());
    b.call(hash, vec![Operand::constant(Ty::FnPtr, ConstKind::Fn(target))], t);
    b.assign(Place::return_place(), Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.exit_scope(outer);
    b.ret();
    let mut body = b.finish();
    assert_eq!(
        rejection(&run(&module, &mut body)),
        Some(Unpromotable::Unconst(UnconstOp::AddressSensitiveCall(
            "hash_addr".to_string()
        )))
    );
}

#[test]
fn test_nested_borrow_is_promoted_once() {
    let module = ModuleIR::default();
    let pair = Ty::Tuple(vec![Ty::shared_ref(i32_ty())]);
    let mut b = BodyBuilder::new("f", BodyKind::Fn, i32_ty(), vec![]);
    let inner = b.temp(i32_ty());
    let inner_ref = b.temp(Ty::shared_ref(i32_ty()));
    let tuple = b.temp(pair.clone());
    let outer_ref = b.temp(Ty::shared_ref(pair));
    b.assign(inner, Rvalue::Use(int(5)));
    b.assign(inner_ref, Rvalue::Ref(BorrowKind::Shared, Place::local(inner)));
    b.assign(tuple, Rvalue::Aggregate(AggregateKind::Tuple, vec![copy(inner_ref)]));
    b.assign(outer_ref, Rvalue::Ref(BorrowKind::Shared, Place::local(tuple)));
    b.assign(
        Place::return_place(),
        Rvalue::Use(Operand::Copy(Place::local(outer_ref).deref().field(0).deref())),
    );
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert_eq!(report.promoted.len(), 1);
    assert_eq!(
        report.promoted[0].candidate,
        Candidate::Ref(Location::new(BasicBlock::START, 3))
    );
    assert_eq!(body.promoted.len(), 1);

    let value = Interpreter::new(&module, InterpConfig::default())
        .eval_fn(&body, vec![])
        .unwrap();
    assert_eq!(value, Value::Scalar(Scalar::from_int(5, 32)));
}

#[test]
fn test_required_const_argument() {
    let mut module = ModuleIR::default();
    let shuffle = module.add_function(FnDecl {
        inputs: vec![Ty::Uint(UintTy::U32)],
        is_const: false,
        required_const_args: vec![0],
        ..const_fn("shuffle", Ty::Unit, false)
    });

    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![Ty::Uint(UintTy::U32)]);
    let n = b.arg(0);
    let lane = b.temp(Ty::Uint(UintTy::U32));
    b.assign(
        lane,
        binary(
            BinOp::Add,
            Operand::int(Ty::Uint(UintTy::U32), 2),
            Operand::int(Ty::Uint(UintTy::U32), 1),
        ),
    );
    b.call(shuffle, vec![Operand::Move(Place::local(lane))], Place::return_place());
    b.call(shuffle, vec![Operand::Copy(Place::local(n))], Place::return_place());
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert_eq!(report.promoted.len(), 1);
    assert!(matches!(
        report.promoted[0].candidate,
        Candidate::Argument { index: 0, .. }
    ));
    match &body.block(BasicBlock::START).terminator.kind {
        TerminatorKind::Call { args, .. } => assert_eq!(
            args[0],
            Operand::constant(Ty::Uint(UintTy::U32), ConstKind::Promoted(PromotedId(0)))
        ),
        other => panic!("unexpected terminator {:?}", other),
    }

    let errors: Vec<_> = report.argument_errors().collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].reason, Unpromotable::NotATemp(n));
}

#[test]
fn test_panicking_promoted_keeps_runtime_panic() {
    let mut module = ModuleIR::default();
    let mut callee = BodyBuilder::new("boom", BodyKind::ConstFn, i32_ty(), vec![]);
    callee.assert(
        Operand::bool(false),
        true,
        AssertKind::Custom("explicit panic".to_string()),
    );
    callee.assign(Place::return_place(), Rvalue::Use(int(1)));
    callee.ret();
    let callee_body = module.add_body(callee.finish());
    let boom = module.add_function(FnDecl {
        body: Some(callee_body),
        ..const_fn("boom", i32_ty(), true)
    });

    let mut b = BodyBuilder::new("f", BodyKind::Fn, i32_ty(), vec![]);
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.call(boom, vec![], t);
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::Copy(Place::local(r).deref())));
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert_eq!(report.promoted.len(), 1);
    assert_eq!(report.runtime_failures.len(), 1);
    let failure = &report.runtime_failures[0];
    assert_eq!(failure.message, "explicit panic");

    match &body.block(failure.location.block).terminator.kind {
        TerminatorKind::Assert {
            cond,
            expected,
            msg,
            ..
        } => {
            assert_eq!(cond, &Operand::bool(false));
            assert!(*expected);
            assert_eq!(msg, &AssertKind::Custom("explicit panic".to_string()));
        }
        other => panic!("unexpected terminator {:?}", other),
    }

    // still panics when run, with the same message
    let err = Interpreter::new(&module, InterpConfig::default())
        .eval_fn(&body, vec![])
        .unwrap_err();
    assert_eq!(err, InterpError::Panic("explicit panic".to_string()));
}

#[test]
fn test_lifetime_extension_of_rejected_borrow() {
    let mut module = ModuleIR::default();
    let open = module.add_function(FnDecl {
        is_const: false,
        ..const_fn("open", i32_ty(), false)
    });

    // let x = &open();
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![]);
    let x = b.var(Ty::shared_ref(i32_ty()));
    let t = b.temp(i32_ty());
    b.storage_live(x);
    b.storage_live(t);
    b.call(open, vec![], t);
    b.assign(x, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.storage_dead(t);
    b.assign(Place::return_place(), Rvalue::Use(Operand::constant(Ty::Unit, ConstKind::ZeroSized)));
    b.storage_dead(x);
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(report.lifetime_extended.len(), 1);
    assert_eq!(report.lifetime_extended[0].temp, t);
    assert_eq!(report.lifetime_extended[0].var, x);

    // `StorageDead(t)` now directly follows `StorageDead(x)`
    let kinds: Vec<&StatementKind> = body
        .basic_blocks
        .iter()
        .flat_map(|block| block.statements.iter().map(|s| &s.kind))
        .filter(|kind| matches!(kind, StatementKind::StorageDead(_)))
        .collect();
    assert_eq!(
        kinds,
        vec![&StatementKind::StorageDead(x), &StatementKind::StorageDead(t)]
    );
}

#[test]
fn test_lifetime_extension_of_raw_borrow() {
    let module = ModuleIR::default();

    // let p = &raw const (n + 1);
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![i32_ty()]);
    let n = b.arg(0);
    let p = b.var(Ty::RawPtr(Mutability::Not, Box::new(i32_ty())));
    let t = b.temp(i32_ty());
    b.storage_live(p);
    b.storage_live(t);
    b.assign(t, binary(BinOp::Add, copy(n), int(1)));
    b.assign(p, Rvalue::AddressOf(Mutability::Not, Place::local(t)));
    b.storage_dead(t);
    b.assign(Place::return_place(), Rvalue::Use(Operand::constant(Ty::Unit, ConstKind::ZeroSized)));
    b.storage_dead(p);
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(report.lifetime_extended.len(), 1);
    assert_eq!(report.lifetime_extended[0].temp, t);
    assert_eq!(report.lifetime_extended[0].var, p);

    let kinds: Vec<&StatementKind> = body
        .basic_blocks
        .iter()
        .flat_map(|block| block.statements.iter().map(|s| &s.kind))
        .filter(|kind| matches!(kind, StatementKind::StorageDead(_)))
        .collect();
    assert_eq!(
        kinds,
        vec![&StatementKind::StorageDead(p), &StatementKind::StorageDead(t)]
    );
}

#[test]
fn test_lifetime_extension_can_be_disabled() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![i32_ty()]);
    let n = b.arg(0);
    let x = b.var(Ty::shared_ref(i32_ty()));
    let t = b.temp(i32_ty());
    b.assign(t, binary(BinOp::Add, copy(n), int(1)));
    b.assign(x, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.storage_dead(t);
    b.ret();
    let mut body = b.finish();

    let report = PromoteTemps::default()
        .with_lifetime_extension(false)
        .run_pass(&module, &mut body)
        .unwrap();
    assert!(report.lifetime_extended.is_empty());
    assert!(body
        .block(BasicBlock::START)
        .statements
        .iter()
        .any(|s| s.kind == StatementKind::StorageDead(t)));
}

#[test]
fn test_promoted_bodies_are_skipped() {
    let module = ModuleIR::default();
    let mut body = borrow_of(BodyKind::Fn, i32_ty(), Rvalue::Use(int(1)));
    body.source.promoted = Some(PromotedId(0));
    let report = run(&module, &mut body);
    assert_eq!(report, PromotionReport::default());
    assert!(body.promoted.is_empty());
}

#[test]
fn test_invalid_promoted_value_aborts() {
    let module = ModuleIR::default();
    // `3u8 as bool` is no valid bool
    let mut body = borrow_of(
        BodyKind::Fn,
        Ty::Bool,
        Rvalue::Cast(CastKind::IntToInt, Operand::int(Ty::Uint(UintTy::U8), 3), Ty::Bool),
    );
    let err = PromoteTemps::default()
        .run_pass(&module, &mut body)
        .unwrap_err();
    assert!(matches!(err, PromotionError::InvalidPromotion { .. }));
}

/// `static S: i32 = 42;` as the first body of a module
fn module_with_static(thread_local: bool) -> (ModuleIR, StaticId) {
    let mut module = ModuleIR::default();
    let id = module.add_static(StaticDef {
        name: "S".to_string(),
        ty: i32_ty(),
        mutability: Mutability::Not,
        thread_local,
        init: Some(BodyId(0)),
    });
    let mut b = BodyBuilder::new("S", BodyKind::Static(Mutability::Not), i32_ty(), vec![]);
    b.assign(Place::return_place(), Rvalue::Use(int(42)));
    b.ret();
    module.add_body(b.finish());
    (module, id)
}

/// `_s = const &S; _t = copy *_s; _r = &_t; _0 = copy *_r`
fn reborrow_of_static(
    kind: BodyKind,
    id: StaticId,
) -> Body {
    let mut b = BodyBuilder::new("R", kind, i32_ty(), vec![]);
    let s = b.temp(Ty::shared_ref(i32_ty()));
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(s, Rvalue::Use(Operand::static_ref(id, Ty::shared_ref(i32_ty()))));
    b.assign(t, Rvalue::Use(Operand::Copy(Place::local(s).deref())));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::Copy(Place::local(r).deref())));
    b.ret();
    b.finish()
}

#[test]
fn test_static_read_promoted_inside_static() {
    let (module, id) = module_with_static(false);
    let mut body = reborrow_of_static(BodyKind::Static(Mutability::Not), id);

    let report = run(&module, &mut body);
    assert!(report.rejected.is_empty(), "{:?}", report.rejected);
    assert_eq!(report.promoted.len(), 1);

    let mut interp = Interpreter::new(&module, InterpConfig::default());
    let result = interp.eval_const_body(&body.promoted[0]).unwrap();
    let Value::Scalar(Scalar::Ptr(ptr)) = &result.value else {
        panic!("expected a reference, got {}", result.value);
    };
    assert_eq!(interp.memory().read(ptr), Ok(Value::Scalar(Scalar::from_int(42, 32))));
}

#[test]
fn test_static_read_not_promoted_in_fn() {
    let (module, id) = module_with_static(false);
    let mut body = reborrow_of_static(BodyKind::Fn, id);

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(rejection(&report), Some(Unpromotable::Deref));
}

#[test]
fn test_thread_local_static_read_not_promoted() {
    let (module, id) = module_with_static(true);
    let mut body = reborrow_of_static(BodyKind::Static(Mutability::Not), id);

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(rejection(&report), Some(Unpromotable::Deref));
}

#[test]
fn test_static_address_not_promoted_outside_statics() {
    let (module, id) = module_with_static(false);
    // `&&S` in a fn
    let ref_ty = Ty::shared_ref(i32_ty());
    let mut body = borrow_of(
        BodyKind::Fn,
        ref_ty.clone(),
        Rvalue::Use(Operand::static_ref(id, ref_ty)),
    );

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(
        rejection(&report),
        Some(Unpromotable::NotConst(NotConst::StaticAccess {
            name: "S".to_string(),
            context: "constants",
        }))
    );
}

#[test]
fn test_union_field_read_not_promoted() {
    let mut module = ModuleIR::default();
    let bits = module.add_adt(AdtDef {
        name: "Bits".to_string(),
        kind: AdtKind::Union,
        variants: vec![VariantDef {
            name: "Bits".to_string(),
            fields: vec![Ty::Uint(UintTy::U32), Ty::Char],
        }],
        has_drop_impl: false,
        interior_mut: false,
    });

    // `fn f(u: Bits) { let r = &u.a; }`
    let u32_ty = Ty::Uint(UintTy::U32);
    let mut b = BodyBuilder::new("f", BodyKind::Fn, Ty::Unit, vec![Ty::Adt(bits)]);
    let u = b.arg(0);
    let t = b.temp(u32_ty.clone());
    let r = b.temp(Ty::shared_ref(u32_ty));
    b.assign(t, Rvalue::Use(Operand::Copy(Place::local(u).field(0))));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.ret();
    let mut body = b.finish();

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(rejection(&report), Some(Unpromotable::UnionField));
}

/// `_a = [10, 20, 30]; _i = <index>; _t = copy _a[_i]; _r = &_t; _0 = copy *_r`
fn indexed_borrow(index: Option<u64>) -> Body {
    let arg_tys = if index.is_none() { vec![Ty::usize()] } else { vec![] };
    let mut b = BodyBuilder::new("f", BodyKind::Fn, i32_ty(), arg_tys);
    let a = b.temp(Ty::Array(Box::new(i32_ty()), 3));
    let i = match index {
        Some(value) => {
            let i = b.temp(Ty::usize());
            b.assign(i, Rvalue::Use(Operand::int(Ty::usize(), value as i128)));
            i
        }
        None => b.arg(0),
    };
    let t = b.temp(i32_ty());
    let r = b.temp(Ty::shared_ref(i32_ty()));
    b.assign(
        a,
        Rvalue::Aggregate(AggregateKind::Array(i32_ty()), vec![int(10), int(20), int(30)]),
    );
    b.assign(t, Rvalue::Use(Operand::Copy(Place::local(a).project(ProjectionElem::Index(i)))));
    b.assign(r, Rvalue::Ref(BorrowKind::Shared, Place::local(t)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::Copy(Place::local(r).deref())));
    b.ret();
    b.finish()
}

#[test]
fn test_constant_index_in_bounds_is_promoted() {
    let module = ModuleIR::default();
    let mut body = indexed_borrow(Some(1));

    let report = run(&module, &mut body);
    assert!(report.rejected.is_empty(), "{:?}", report.rejected);
    assert_eq!(report.promoted.len(), 1);
    let value = Interpreter::new(&module, InterpConfig::default())
        .eval_fn(&body, vec![])
        .unwrap();
    assert_eq!(value, Value::Scalar(Scalar::from_int(20, 32)));
}

#[test]
fn test_index_out_of_bounds_is_not_promoted() {
    let module = ModuleIR::default();
    let mut body = indexed_borrow(Some(5));

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(rejection(&report), Some(Unpromotable::NonConstIndex));
}

#[test]
fn test_runtime_index_is_not_promoted() {
    let module = ModuleIR::default();
    let mut body = indexed_borrow(None);

    let report = run(&module, &mut body);
    assert!(report.promoted.is_empty());
    assert_eq!(rejection(&report), Some(Unpromotable::NonConstIndex));
}

/// Terminator at the split-off use site of the first runtime failure
fn assert_runtime_panic(
    body: &Body,
    report: &PromotionReport,
) {
    let failure = &report.runtime_failures[0];
    match &body.block(failure.location.block).terminator.kind {
        TerminatorKind::Assert { cond, msg, .. } => {
            assert_eq!(cond, &Operand::bool(false));
            assert_eq!(msg, &AssertKind::Custom(failure.message.clone()));
        }
        other => panic!("unexpected terminator {:?}", other),
    }
}

#[test]
fn test_step_limit_in_promoted_body_fails_at_runtime() {
    let module = ModuleIR::default();
    let mut body = borrow_of(BodyKind::Fn, i32_ty(), binary(BinOp::Add, int(1), int(2)));

    let report = PromoteTemps::default()
        .with_interp_config(InterpConfig {
            step_limit: 1,
            ..InterpConfig::default()
        })
        .run_pass(&module, &mut body)
        .unwrap();
    assert_eq!(report.promoted.len(), 1);
    assert_eq!(report.runtime_failures.len(), 1);
    assert_eq!(report.runtime_failures[0].kind, FailureKind::ResourceExhaustion);
    assert_eq!(report.runtime_failures[0].message, "resource exhausted: step limit of 1 reached");
    assert_runtime_panic(&body, &report);
}

#[test]
fn test_oversized_repeat_fails_at_runtime() {
    let module = ModuleIR::default();
    let u8_ty = Ty::Uint(UintTy::U8);
    // `&[0_u8; u64::MAX]`
    let mut body = borrow_of(
        BodyKind::Fn,
        Ty::Array(Box::new(u8_ty.clone()), u64::MAX),
        Rvalue::Repeat(Operand::int(u8_ty, 0), u64::MAX),
    );

    let report = run(&module, &mut body);
    assert_eq!(report.promoted.len(), 1);
    assert_eq!(report.runtime_failures.len(), 1);
    assert_eq!(report.runtime_failures[0].kind, FailureKind::ResourceExhaustion);
    assert!(
        report.runtime_failures[0].message.contains("exceeds the limit of 1048576"),
        "{}",
        report.runtime_failures[0].message
    );
    assert_runtime_panic(&body, &report);
}
