//! Allowed-in-constants rule tests

use crate::middle::builder::BodyBuilder;
use crate::middle::const_check::{ConstChecker, DefaultConstLegality, NotConst};
use crate::middle::const_safety::code::{UnconstChecker, UnconstOp};
use crate::middle::ir::{
    BinOp, BodyKind, BorrowKind, CastKind, Operand, Place, Rvalue,
};
use crate::middle::ty::{FnDecl, FnKind, IntTy, ModuleIR, Mutability, StaticDef, Ty};

fn decl(
    name: &str,
    is_const: bool,
) -> FnDecl {
    FnDecl {
        name: name.to_string(),
        inputs: vec![],
        output: Ty::Unit,
        is_const,
        promotable: false,
        kind: FnKind::Normal,
        required_const_args: vec![],
        body: None,
    }
}

fn check(
    module: &ModuleIR,
    body: &crate::middle::ir::Body,
) -> Vec<NotConst> {
    ConstChecker::new(&DefaultConstLegality)
        .check_body(module, body)
        .into_iter()
        .map(|v| v.error)
        .collect()
}

#[test]
fn test_heap_alloc_in_const() {
    let module = ModuleIR::default();
    let ptr_ty = Ty::RawPtr(Mutability::Mut, Box::new(Ty::Int(IntTy::I32)));
    let mut b = BodyBuilder::new("C", BodyKind::Const, ptr_ty.clone(), vec![]);
    b.assign(Place::return_place(), Rvalue::HeapAlloc(Ty::Int(IntTy::I32)));
    b.ret();
    let body = b.finish();

    assert_eq!(
        check(&module, &body),
        vec![NotConst::HeapAllocation("constants")]
    );
}

#[test]
fn test_runtime_fn_is_never_checked() {
    let module = ModuleIR::default();
    let ptr_ty = Ty::RawPtr(Mutability::Mut, Box::new(Ty::Int(IntTy::I32)));
    let mut b = BodyBuilder::new("f", BodyKind::Fn, ptr_ty, vec![]);
    b.assign(Place::return_place(), Rvalue::HeapAlloc(Ty::Int(IntTy::I32)));
    b.ret();
    let body = b.finish();

    assert!(check(&module, &body).is_empty());
}

#[test]
fn test_non_const_call() {
    let mut module = ModuleIR::default();
    let print = module.add_function(decl("print", false));
    let len = module.add_function(decl("len", true));

    let mut b = BodyBuilder::new("C", BodyKind::Const, Ty::Unit, vec![]);
    b.call(len, vec![], Place::return_place());
    b.call(print, vec![], Place::return_place());
    b.ret();
    let body = b.finish();

    assert_eq!(
        check(&module, &body),
        vec![NotConst::NonConstFn {
            name: "print".to_string(),
            context: "constants",
        }]
    );
}

#[test]
fn test_static_access_only_from_statics() {
    let mut module = ModuleIR::default();
    let counter = module.add_static(StaticDef {
        name: "COUNTER".to_string(),
        ty: Ty::usize(),
        mutability: Mutability::Not,
        thread_local: false,
        init: None,
    });
    let ref_ty = Ty::shared_ref(Ty::usize());

    let build = |kind| {
        let mut b = BodyBuilder::new("ITEM", kind, ref_ty.clone(), vec![]);
        b.assign(
            Place::return_place(),
            Rvalue::Use(Operand::static_ref(counter, ref_ty.clone())),
        );
        b.ret();
        b.finish()
    };

    let in_const = build(BodyKind::Const);
    assert_eq!(
        check(&module, &in_const),
        vec![NotConst::StaticAccess {
            name: "COUNTER".to_string(),
            context: "constants",
        }]
    );
    let in_static = build(BodyKind::Static(Mutability::Not));
    assert!(check(&module, &in_static).is_empty());
}

#[test]
fn test_mut_borrow_rules() {
    let module = ModuleIR::default();
    let build = |kind, ty: Ty| {
        let mut b = BodyBuilder::new("ITEM", kind, Ty::Unit, vec![]);
        let t = b.temp(ty.clone());
        let r = b.temp(Ty::Ref(Mutability::Mut, Box::new(ty)));
        b.assign(r, Rvalue::Ref(BorrowKind::Mut, Place::local(t)));
        b.ret();
        b.finish()
    };
    let empty = Ty::Array(Box::new(Ty::Bool), 0);
    let pair = Ty::Array(Box::new(Ty::Bool), 2);

    assert!(check(&module, &build(BodyKind::Const, empty)).is_empty());
    assert_eq!(
        check(&module, &build(BodyKind::Const, pair.clone())),
        vec![NotConst::MutBorrow("constants")]
    );
    assert!(check(&module, &build(BodyKind::ConstFn, pair.clone())).is_empty());
    assert!(check(&module, &build(BodyKind::Static(Mutability::Mut), pair)).is_empty());
}

#[test]
fn test_pointer_ops() {
    let module = ModuleIR::default();
    let ptr_ty = Ty::RawPtr(Mutability::Not, Box::new(Ty::Bool));
    let mut b = BodyBuilder::new("f", BodyKind::ConstFn, Ty::Bool, vec![ptr_ty.clone(), ptr_ty]);
    let (a, c) = (b.arg(0), b.arg(1));
    let addr = b.temp(Ty::usize());
    b.assign(
        Place::return_place(),
        Rvalue::BinaryOp(
            BinOp::Eq,
            Box::new((Operand::Copy(Place::local(a)), Operand::Copy(Place::local(c)))),
        ),
    );
    b.assign(
        addr,
        Rvalue::Cast(
            CastKind::PointerExposeAddress,
            Operand::Copy(Place::local(a)),
            Ty::usize(),
        ),
    );
    b.ret();
    let body = b.finish();

    // address-observing operations are reported by the unconst check
    assert!(check(&module, &body).is_empty());
    let ops: Vec<UnconstOp> = UnconstChecker::new()
        .check_body(&module, &body)
        .into_iter()
        .map(|v| v.op)
        .collect();
    assert_eq!(ops, vec![UnconstOp::PtrComparison, UnconstOp::PtrToIntCast]);
}

#[test]
fn test_raw_pointer_deref() {
    let module = ModuleIR::default();
    let ptr_ty = Ty::RawPtr(Mutability::Not, Box::new(Ty::Bool));
    let mut b = BodyBuilder::new("f", BodyKind::ConstFn, Ty::Bool, vec![ptr_ty]);
    let p = b.arg(0);
    b.assign(
        Place::return_place(),
        Rvalue::Use(Operand::Copy(Place::local(p).deref())),
    );
    b.ret();
    let body = b.finish();

    assert_eq!(
        check(&module, &body),
        vec![NotConst::RawPtrDeref("constant functions")]
    );
}

#[test]
fn test_violation_carries_location() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("C", BodyKind::Const, Ty::Unit, vec![]);
    let t = b.temp(Ty::RawPtr(Mutability::Mut, Box::new(Ty::Bool)));
    b.assign(Place::return_place(), Rvalue::Use(Operand::constant(Ty::Unit, crate::middle::ir::ConstKind::ZeroSized)));
    b.at(crate::util::span::Span::line(4, 5, 12));
    b.assign(t, Rvalue::HeapAlloc(Ty::Bool));
    b.ret();
    let body = b.finish();

    let violations = ConstChecker::new(&DefaultConstLegality).check_body(&module, &body);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].location.statement_index, 1);
    assert_eq!(violations[0].span, crate::util::span::Span::line(4, 5, 12));
}
