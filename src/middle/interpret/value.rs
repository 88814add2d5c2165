//! Compile-time values
//!
//! Values are trees mirroring their type; leaves are scalars. A scalar is
//! either raw integer bits or a pointer into compile-time memory, never a
//! mix of the two: integer operations on a pointer are unsupported, and
//! dereferencing an integer is undefined behavior.

use crate::middle::interpret::error::{InterpResult, UndefinedBehaviorInfo, UnsupportedOp};
use crate::middle::ir::{sign_extend, truncate};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocId(pub usize);

impl fmt::Display for AllocId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "alloc{}", self.0)
    }
}

/// Pointer to a sub-value of an allocation: `path` holds field or element
/// indices from the allocation's root value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub alloc: AllocId,
    pub path: Vec<u64>,
}

impl Pointer {
    pub fn root(alloc: AllocId) -> Self {
        Self {
            alloc,
            path: Vec::new(),
        }
    }
}

impl fmt::Display for Pointer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.alloc)?;
        for index in &self.path {
            write!(f, ".{}", index)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// Raw bits, `size` in bytes
    Int { data: u128, size: u8 },
    Ptr(Pointer),
}

impl Scalar {
    pub const TRUE: Scalar = Scalar::Int { data: 1, size: 1 };
    pub const FALSE: Scalar = Scalar::Int { data: 0, size: 1 };

    pub fn from_uint(
        value: u128,
        bits: u32,
    ) -> Self {
        Scalar::Int {
            data: truncate(value, bits),
            size: (bits / 8) as u8,
        }
    }

    pub fn from_int(
        value: i128,
        bits: u32,
    ) -> Self {
        Scalar::from_uint(value as u128, bits)
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Scalar::TRUE
        } else {
            Scalar::FALSE
        }
    }

    pub fn from_char(value: char) -> Self {
        Scalar::from_uint(value as u128, 32)
    }

    pub fn from_usize(value: u64) -> Self {
        Scalar::from_uint(value as u128, crate::middle::ty::POINTER_BITS)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Scalar::Ptr(_))
    }

    /// Raw bits; pointers have none observable at compile time
    pub fn to_bits(&self) -> InterpResult<u128> {
        match self {
            Scalar::Int { data, .. } => Ok(*data),
            Scalar::Ptr(_) => Err(UnsupportedOp::ReadPointerAsBytes.into()),
        }
    }

    pub fn to_i128(
        &self,
        bits: u32,
    ) -> InterpResult<i128> {
        Ok(sign_extend(self.to_bits()?, bits))
    }

    pub fn to_u64(&self) -> InterpResult<u64> {
        Ok(self.to_bits()? as u64)
    }

    pub fn to_bool(&self) -> InterpResult<bool> {
        match self.to_bits()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(UndefinedBehaviorInfo::InvalidBool(other).into()),
        }
    }

    pub fn to_char(&self) -> InterpResult<char> {
        let bits = self.to_bits()?;
        u32::try_from(bits)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| UndefinedBehaviorInfo::InvalidChar(bits).into())
    }

    pub fn to_pointer(&self) -> InterpResult<&Pointer> {
        match self {
            Scalar::Ptr(ptr) => Ok(ptr),
            Scalar::Int { .. } => Err(UndefinedBehaviorInfo::IntegerAsPointer.into()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Scalar::Int { data, size } => write!(f, "{:#x}_{}", data, size),
            Scalar::Ptr(ptr) => write!(f, "&{}", ptr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Uninit,
    Scalar(Scalar),
    /// Pointer to an unsized value plus its element count
    Wide { ptr: Scalar, len: Scalar },
    /// Tuples, structs, arrays
    Aggregate(Vec<Value>),
    /// Enum value: tag is the variant index
    Variant { tag: Scalar, fields: Vec<Value> },
    /// Union holding the field last written
    Union { field: usize, value: Box<Value> },
}

impl Value {
    pub fn unit() -> Self {
        Value::Aggregate(Vec::new())
    }

    pub fn from_bool(value: bool) -> Self {
        Value::Scalar(Scalar::from_bool(value))
    }

    pub fn to_scalar(&self) -> InterpResult<&Scalar> {
        match self {
            Value::Scalar(scalar) => Ok(scalar),
            _ => Err(UndefinedBehaviorInfo::UninitRead.into()),
        }
    }

    /// Sub-value at one path step
    pub fn field(
        &self,
        index: u64,
    ) -> InterpResult<&Value> {
        let index = index as usize;
        match self {
            Value::Aggregate(fields) | Value::Variant { fields, .. } => fields.get(index).ok_or_else(|| {
                UndefinedBehaviorInfo::OutOfBounds {
                    index: index as u64,
                    len: fields.len() as u64,
                }
                .into()
            }),
            Value::Union { field, value } => {
                if *field == index {
                    Ok(value)
                } else {
                    Err(UnsupportedOp::UnionTypePunning.into())
                }
            }
            Value::Uninit => Ok(&Value::Uninit),
            Value::Scalar(_) | Value::Wide { .. } => Err(UndefinedBehaviorInfo::UninitRead.into()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Uninit => write!(f, "<uninit>"),
            Value::Scalar(scalar) => write!(f, "{}", scalar),
            Value::Wide { ptr, len } => write!(f, "({}, len {})", ptr, len),
            Value::Aggregate(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Value::Variant { tag, fields } => {
                write!(f, "variant[{}]", tag)?;
                if !fields.is_empty() {
                    write!(f, "{}", Value::Aggregate(fields.clone()))?;
                }
                Ok(())
            }
            Value::Union { field, value } => write!(f, "union {{ .{} = {} }}", field, value),
        }
    }
}
