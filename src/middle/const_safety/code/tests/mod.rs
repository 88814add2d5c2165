//! Code-level const safety tests

use crate::middle::builder::BodyBuilder;
use crate::middle::const_safety::code::{UnconstChecker, UnconstOp};
use crate::middle::ir::{BinOp, Body, BodyKind, CastKind, Operand, Place, Rvalue, Safety};
use crate::middle::ty::{FnDecl, FnKind, ModuleIR, Mutability, Ty};

fn raw_u8() -> Ty {
    Ty::RawPtr(Mutability::Not, Box::new(Ty::Uint(crate::middle::ty::UintTy::U8)))
}

fn ops(
    module: &ModuleIR,
    body: &Body,
) -> Vec<UnconstOp> {
    UnconstChecker::new()
        .check_body(module, body)
        .into_iter()
        .map(|v| v.op)
        .collect()
}

/// `a == b` on raw pointers, optionally inside an `unconst` block
fn ptr_eq_body(
    kind: BodyKind,
    unconst: bool,
) -> Body {
    let mut b = BodyBuilder::new("same", kind, Ty::Bool, vec![raw_u8(), raw_u8()]);
    let (x, y) = (b.arg(0), b.arg(1));
    let outer = unconst.then(|| b.enter_scope(Safety::Unconst));
    b.assign(
        Place::return_place(),
        Rvalue::BinaryOp(
            BinOp::Eq,
            Box::new((Operand::Copy(Place::local(x)), Operand::Copy(Place::local(y)))),
        ),
    );
    if let Some(outer) = outer {
        b.exit_scope(outer);
    }
    b.ret();
    b.finish()
}

#[test]
fn test_ptr_comparison_in_const_fn() {
    let module = ModuleIR::default();
    assert_eq!(
        ops(&module, &ptr_eq_body(BodyKind::ConstFn, false)),
        vec![UnconstOp::PtrComparison]
    );
}

#[test]
fn test_unconst_block_allows_it() {
    let module = ModuleIR::default();
    assert!(ops(&module, &ptr_eq_body(BodyKind::ConstFn, true)).is_empty());
}

#[test]
fn test_runtime_code_is_unrestricted() {
    let module = ModuleIR::default();
    assert!(ops(&module, &ptr_eq_body(BodyKind::Fn, false)).is_empty());
}

#[test]
fn test_integer_comparison_is_fine() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("C", BodyKind::Const, Ty::Bool, vec![]);
    b.assign(
        Place::return_place(),
        Rvalue::BinaryOp(
            BinOp::Lt,
            Box::new((Operand::int(Ty::usize(), 1), Operand::int(Ty::usize(), 2))),
        ),
    );
    b.ret();
    assert!(ops(&module, &b.finish()).is_empty());
}

#[test]
fn test_cast_and_address_hashing() {
    let mut module = ModuleIR::default();
    let hash = module.add_function(FnDecl {
        name: "hash_addr".to_string(),
        inputs: vec![raw_u8()],
        output: Ty::Uint(crate::middle::ty::UintTy::U64),
        is_const: true,
        promotable: false,
        kind: FnKind::AddressSensitive,
        required_const_args: vec![],
        body: None,
    });

    let mut b = BodyBuilder::new(
        "H",
        BodyKind::Static(Mutability::Not),
        Ty::Uint(crate::middle::ty::UintTy::U64),
        vec![],
    );
    let p = b.temp(raw_u8());
    let addr = b.temp(Ty::usize());
    b.assign(
        addr,
        Rvalue::Cast(
            CastKind::PointerExposeAddress,
            Operand::Copy(Place::local(p)),
            Ty::usize(),
        ),
    );
    b.call(hash, vec![Operand::Copy(Place::local(p))], Place::return_place());
    b.ret();

    assert_eq!(
        ops(&module, &b.finish()),
        vec![
            UnconstOp::PtrToIntCast,
            UnconstOp::AddressSensitiveCall("hash_addr".to_string()),
        ]
    );
}

#[test]
fn test_violation_span_is_the_statement() {
    let module = ModuleIR::default();
    let mut b = BodyBuilder::new("same", BodyKind::ConstFn, Ty::Bool, vec![raw_u8(), raw_u8()]);
    let (x, y) = (b.arg(0), b.arg(1));
    b.at(crate::util::span::Span::line(2, 3, 9));
    b.assign(
        Place::return_place(),
        Rvalue::BinaryOp(
            BinOp::Ne,
            Box::new((Operand::Copy(Place::local(x)), Operand::Copy(Place::local(y)))),
        ),
    );
    b.ret();
    let violations = UnconstChecker::new().check_body(&module, &b.finish());
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].span, crate::util::span::Span::line(2, 3, 9));
}
