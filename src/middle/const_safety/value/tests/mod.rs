//! 值级常量安全测试

use crate::middle::const_safety::value::{ValidityErrorKind, ValueValidator};
use crate::middle::interpret::{Memory, MemoryKind, Pointer, Scalar, Value};
use crate::middle::ty::{
    AdtDef, AdtId, AdtKind, FnId, IntTy, ModuleIR, Mutability, Ty, UintTy, VariantDef,
};
use proptest::prelude::*;

fn module_with_adts() -> (ModuleIR, AdtId, AdtId) {
    let mut module = ModuleIR::default();
    let option = module.add_adt(AdtDef {
        name: "Option".to_string(),
        kind: AdtKind::Enum,
        variants: vec![
            VariantDef {
                name: "None".to_string(),
                fields: vec![],
            },
            VariantDef {
                name: "Some".to_string(),
                fields: vec![Ty::Bool],
            },
        ],
        has_drop_impl: false,
        interior_mut: false,
    });
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
    (module, option, bits)
}

fn int(
    data: u128,
    bits: u32,
) -> Value {
    Value::Scalar(Scalar::from_uint(data, bits))
}

fn kind_of(
    module: &ModuleIR,
    memory: &Memory,
    value: &Value,
    ty: &Ty,
) -> Option<(ValidityErrorKind, String)> {
    ValueValidator::new(module, memory)
        .validate(value, ty)
        .err()
        .map(|err| (err.kind, err.path))
}

#[test]
fn test_scalars() {
    let module = ModuleIR::default();
    let memory = Memory::new();
    let mut v = ValueValidator::new(&module, &memory);

    assert!(v.is_const_safe(&int(1, 8), &Ty::Bool));
    assert!(v.is_const_safe(&int(-3i128 as u128, 32), &Ty::Int(IntTy::I32)));
    assert!(v.is_const_safe(&int('λ' as u128, 32), &Ty::Char));
    assert!(!v.is_const_safe(&Value::Uninit, &Ty::Int(IntTy::I32)));
    assert!(!v.is_const_safe(&Value::unit(), &Ty::Never));
}

#[test]
fn test_pointer_is_not_an_integer() {
    let module = ModuleIR::default();
    let mut memory = Memory::new();
    let alloc = memory.allocate(int(0, 8), Ty::Uint(UintTy::U8), Mutability::Not, MemoryKind::Global);
    let ptr = Value::Scalar(Scalar::Ptr(Pointer::root(alloc)));

    assert_eq!(
        kind_of(&module, &memory, &ptr, &Ty::usize()),
        Some((ValidityErrorKind::PointerAsInt("an integer".to_string()), String::new()))
    );
    // raw pointers may hold either
    let raw = Ty::RawPtr(Mutability::Not, Box::new(Ty::Uint(UintTy::U8)));
    assert_eq!(kind_of(&module, &memory, &ptr, &raw), None);
    assert_eq!(kind_of(&module, &memory, &int(16, 64), &raw), None);
}

#[test]
fn test_error_path_points_into_aggregate() {
    let module = ModuleIR::default();
    let memory = Memory::new();
    let ty = Ty::Tuple(vec![Ty::Bool, Ty::Array(Box::new(Ty::Bool), 3)]);
    let value = Value::Aggregate(vec![
        int(0, 8),
        Value::Aggregate(vec![int(1, 8), int(0, 8), int(2, 8)]),
    ]);

    assert_eq!(
        kind_of(&module, &memory, &value, &ty),
        Some((ValidityErrorKind::InvalidBool(2), ".1[2]".to_string()))
    );
}

#[test]
fn test_enum_tag_and_payload() {
    let (module, option, _) = module_with_adts();
    let memory = Memory::new();
    let ty = Ty::Adt(option);

    let some = Value::Variant {
        tag: Scalar::from_uint(1, 64),
        fields: vec![int(1, 8)],
    };
    assert_eq!(kind_of(&module, &memory, &some, &ty), None);

    let bad_tag = Value::Variant {
        tag: Scalar::from_uint(2, 64),
        fields: vec![],
    };
    assert_eq!(
        kind_of(&module, &memory, &bad_tag, &ty),
        Some((ValidityErrorKind::InvalidTag(2), ".<enum-tag>".to_string()))
    );

    let bad_payload = Value::Variant {
        tag: Scalar::from_uint(1, 64),
        fields: vec![int(7, 8)],
    };
    assert_eq!(
        kind_of(&module, &memory, &bad_payload, &ty),
        Some((ValidityErrorKind::InvalidBool(7), ".<variant 1>.0".to_string()))
    );
}

#[test]
fn test_union_is_always_valid() {
    let (module, _, bits) = module_with_adts();
    let memory = Memory::new();
    let value = Value::Union {
        field: 0,
        value: Box::new(int(0xd800, 32)),
    };
    assert_eq!(kind_of(&module, &memory, &value, &Ty::Adt(bits)), None);
    assert_eq!(kind_of(&module, &memory, &Value::Uninit, &Ty::Adt(bits)), None);
}

#[test]
fn test_references() {
    let module = ModuleIR::default();
    let mut memory = Memory::new();
    let target = memory.allocate(int(9, 8), Ty::Bool, Mutability::Not, MemoryKind::Global);
    let ty = Ty::shared_ref(Ty::Bool);
    let reference = Value::Scalar(Scalar::Ptr(Pointer::root(target)));

    assert_eq!(
        kind_of(&module, &memory, &reference, &ty),
        Some((ValidityErrorKind::InvalidBool(9), ".<deref>".to_string()))
    );
    assert_eq!(
        kind_of(&module, &memory, &int(8, 64), &ty),
        Some((ValidityErrorKind::IntAsReference, String::new()))
    );

    memory.deallocate(target);
    assert_eq!(
        kind_of(&module, &memory, &reference, &ty),
        Some((ValidityErrorKind::DanglingReference, String::new()))
    );
}

#[test]
fn test_self_referential_value_terminates() {
    let mut module = ModuleIR::default();
    // struct Node { next: &'static Node }
    let node = module.add_adt(AdtDef {
        name: "Node".to_string(),
        kind: AdtKind::Struct,
        variants: vec![VariantDef {
            name: "Node".to_string(),
            fields: vec![Ty::shared_ref(Ty::Adt(AdtId(0)))],
        }],
        has_drop_impl: false,
        interior_mut: false,
    });
    let mut memory = Memory::new();
    let alloc = memory.allocate(Value::Uninit, Ty::Adt(node), Mutability::Mut, MemoryKind::Global);
    let self_ref = Value::Scalar(Scalar::Ptr(Pointer::root(alloc)));
    memory
        .write(
            &Pointer::root(alloc),
            Value::Aggregate(vec![self_ref.clone()]),
            &module,
        )
        .unwrap();

    let mut v = ValueValidator::new(&module, &memory);
    assert!(v.is_const_safe(&self_ref, &Ty::shared_ref(Ty::Adt(node))));
}

#[test]
fn test_str_reference_checks_utf8_and_length() {
    let module = ModuleIR::default();
    let mut memory = Memory::new();
    let bytes = |data: &[u8]| Value::Aggregate(data.iter().map(|b| int(*b as u128, 8)).collect());
    let ty = Ty::shared_ref(Ty::Str);
    let str_alloc = |memory: &mut Memory, data: &[u8]| {
        let len = data.len() as u64;
        memory.allocate(
            bytes(data),
            Ty::Array(Box::new(Ty::Uint(UintTy::U8)), len),
            Mutability::Not,
            MemoryKind::Global,
        )
    };

    let ok = str_alloc(&mut memory, "héllo".as_bytes());
    let wide = |alloc, len| Value::Wide {
        ptr: Scalar::Ptr(Pointer::root(alloc)),
        len: Scalar::from_usize(len),
    };
    assert_eq!(kind_of(&module, &memory, &wide(ok, 6), &ty), None);
    assert_eq!(
        kind_of(&module, &memory, &wide(ok, 7), &ty),
        Some((
            ValidityErrorKind::LengthMismatch { len: 7, available: 6 },
            ".<deref>".to_string()
        ))
    );
    // cutting `é` in half
    assert_eq!(
        kind_of(&module, &memory, &wide(ok, 2), &ty),
        Some((ValidityErrorKind::InvalidUtf8, ".<deref>".to_string()))
    );
}

#[test]
fn test_reused_validator_rechecks_references() {
    let module = ModuleIR::default();
    let mut memory = Memory::new();
    let target = memory.allocate(int(5, 8), Ty::Bool, Mutability::Not, MemoryKind::Global);
    let reference = Value::Scalar(Scalar::Ptr(Pointer::root(target)));
    let ty = Ty::shared_ref(Ty::Bool);

    let mut v = ValueValidator::new(&module, &memory);
    assert!(!v.is_const_safe(&reference, &ty));
    assert!(!v.is_const_safe(&reference, &ty));
}

#[test]
fn test_str_element_wider_than_a_byte() {
    let module = ModuleIR::default();
    let mut memory = Memory::new();
    // 0x141 would read as `A` if cut down to a byte
    let alloc = memory.allocate(
        Value::Aggregate(vec![int(0x141, 16)]),
        Ty::Array(Box::new(Ty::Uint(UintTy::U8)), 1),
        Mutability::Not,
        MemoryKind::Global,
    );
    let value = Value::Wide {
        ptr: Scalar::Ptr(Pointer::root(alloc)),
        len: Scalar::from_usize(1),
    };

    let (kind, path) = kind_of(&module, &memory, &value, &Ty::shared_ref(Ty::Str)).unwrap();
    assert!(
        matches!(&kind, ValidityErrorKind::ShapeMismatch { expected, .. } if expected == "a byte"),
        "{:?}",
        kind
    );
    assert_eq!(path, ".<deref>[0]");
}

#[test]
fn test_fn_pointer_must_point_to_function() {
    let module = ModuleIR::default();
    let mut memory = Memory::new();
    let func = memory.function_alloc(FnId(0));
    let data = memory.allocate(int(0, 8), Ty::Bool, Mutability::Not, MemoryKind::Global);

    let ptr = |alloc| Value::Scalar(Scalar::Ptr(Pointer::root(alloc)));
    assert_eq!(kind_of(&module, &memory, &ptr(func), &Ty::FnPtr), None);
    assert_eq!(
        kind_of(&module, &memory, &ptr(data), &Ty::FnPtr),
        Some((ValidityErrorKind::InvalidFnPointer, String::new()))
    );
}

proptest! {
    #[test]
    fn prop_bool_valid_iff_zero_or_one(bits in 0u128..=255) {
        let module = ModuleIR::default();
        let memory = Memory::new();
        let mut v = ValueValidator::new(&module, &memory);
        prop_assert_eq!(v.is_const_safe(&int(bits, 8), &Ty::Bool), bits <= 1);
    }

    #[test]
    fn prop_every_integer_pattern_is_valid(bits in any::<u64>()) {
        let module = ModuleIR::default();
        let memory = Memory::new();
        let mut v = ValueValidator::new(&module, &memory);
        prop_assert!(v.is_const_safe(&int(bits as u128, 64), &Ty::Int(IntTy::I64)));
        prop_assert!(v.is_const_safe(&int(bits as u128, 64), &Ty::Uint(UintTy::U64)));
    }
}

mod quickcheck_tests {
    use super::*;
    use quickcheck::{quickcheck, TestResult};

    /// char validity agrees with `char::from_u32`
    fn char_validity(bits: u32) -> TestResult {
        let module = ModuleIR::default();
        let memory = Memory::new();
        let mut v = ValueValidator::new(&module, &memory);
        let valid = v.is_const_safe(&int(bits as u128, 32), &Ty::Char);
        TestResult::from_bool(valid == char::from_u32(bits).is_some())
    }

    #[test]
    fn quickcheck_char_validity() {
        quickcheck(char_validity as fn(u32) -> TestResult);
    }
}
