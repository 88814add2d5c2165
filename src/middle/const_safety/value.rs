//! Value-level const safety
//!
//! A value is const safe when it is a valid inhabitant of its type using
//! only what compile-time memory can express: integer leaves are plain
//! bits, references point to live allocations holding valid values, and
//! function pointers point to functions.

use crate::middle::interpret::memory::{GlobalAlloc, Memory};
use crate::middle::interpret::value::{Pointer, Scalar, Value};
use crate::middle::ty::{AdtKind, ModuleIR, Ty};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidityErrorKind {
    #[error("encountered uninitialized data, but expected {0}")]
    Uninit(String),
    #[error("encountered a pointer, but expected {0}")]
    PointerAsInt(String),
    #[error("encountered {0:#x}, but expected a boolean")]
    InvalidBool(u128),
    #[error("encountered {0:#x}, but expected a valid unicode scalar value")]
    InvalidChar(u128),
    #[error("encountered a value of the never type `!`")]
    NeverValue,
    #[error("encountered a dangling reference")]
    DanglingReference,
    #[error("encountered an integer, but expected a reference")]
    IntAsReference,
    #[error("encountered {0}, but expected a valid enum tag")]
    InvalidTag(u128),
    #[error("encountered a pointer that does not point to a function, but expected a function pointer")]
    InvalidFnPointer,
    #[error("encountered invalid UTF-8 in a string")]
    InvalidUtf8,
    #[error("encountered a reference to {len} elements, but only {available} are allocated")]
    LengthMismatch { len: u64, available: u64 },
    #[error("encountered {found}, but expected {expected}")]
    ShapeMismatch { found: String, expected: String },
}

/// Step from a value to one of its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElem {
    Field(usize),
    Index(u64),
    Deref,
    EnumTag,
    Variant(usize),
}

impl fmt::Display for PathElem {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PathElem::Field(i) => write!(f, ".{}", i),
            PathElem::Index(i) => write!(f, "[{}]", i),
            PathElem::Deref => write!(f, ".<deref>"),
            PathElem::EnumTag => write!(f, ".<enum-tag>"),
            PathElem::Variant(v) => write!(f, ".<variant {}>", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", at_path(.path))]
pub struct ValidityError {
    pub kind: ValidityErrorKind,
    /// Rendered path such as `.0.<deref>[3]`, empty at the root
    pub path: String,
}

fn at_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" at {}", path)
    }
}

pub struct ValueValidator<'a> {
    module: &'a ModuleIR,
    memory: &'a Memory,
    /// Reference targets already checked, to stay finite on cycles
    visited: HashSet<(Pointer, Ty)>,
    path: Vec<PathElem>,
}

impl<'a> ValueValidator<'a> {
    pub fn new(
        module: &'a ModuleIR,
        memory: &'a Memory,
    ) -> Self {
        Self {
            module,
            memory,
            visited: HashSet::new(),
            path: Vec::new(),
        }
    }

    pub fn validate(
        &mut self,
        value: &Value,
        ty: &Ty,
    ) -> Result<(), ValidityError> {
        self.path.clear();
        self.visited.clear();
        self.walk(value, ty)
    }

    pub fn is_const_safe(
        &mut self,
        value: &Value,
        ty: &Ty,
    ) -> bool {
        self.validate(value, ty).is_ok()
    }

    fn error(
        &self,
        kind: ValidityErrorKind,
    ) -> ValidityError {
        let path = self.path.iter().map(ToString::to_string).collect::<String>();
        ValidityError { kind, path }
    }

    fn with_elem<T>(
        &mut self,
        elem: PathElem,
        f: impl FnOnce(&mut Self) -> Result<T, ValidityError>,
    ) -> Result<T, ValidityError> {
        self.path.push(elem);
        let result = f(self);
        self.path.pop();
        result
    }

    fn expect_int(
        &self,
        value: &Value,
        expected: &str,
    ) -> Result<u128, ValidityError> {
        match value {
            Value::Scalar(Scalar::Int { data, .. }) => Ok(*data),
            Value::Scalar(Scalar::Ptr(_)) | Value::Wide { .. } => {
                Err(self.error(ValidityErrorKind::PointerAsInt(expected.to_string())))
            }
            Value::Uninit => Err(self.error(ValidityErrorKind::Uninit(expected.to_string()))),
            other => Err(self.shape(other, expected)),
        }
    }

    fn shape(
        &self,
        found: &Value,
        expected: &str,
    ) -> ValidityError {
        self.error(ValidityErrorKind::ShapeMismatch {
            found: found.to_string(),
            expected: expected.to_string(),
        })
    }

    fn walk(
        &mut self,
        value: &Value,
        ty: &Ty,
    ) -> Result<(), ValidityError> {
        trace!("validate {} : {}", value, ty);
        match ty {
            Ty::Never => Err(self.error(ValidityErrorKind::NeverValue)),
            Ty::Unit | Ty::FnDef(_) => Ok(()),
            Ty::Bool => match self.expect_int(value, "a boolean")? {
                0 | 1 => Ok(()),
                bits => Err(self.error(ValidityErrorKind::InvalidBool(bits))),
            },
            Ty::Char => {
                let bits = self.expect_int(value, "a unicode scalar value")?;
                let valid = u32::try_from(bits).ok().and_then(char::from_u32).is_some();
                if valid {
                    Ok(())
                } else {
                    Err(self.error(ValidityErrorKind::InvalidChar(bits)))
                }
            }
            Ty::Int(_) | Ty::Uint(_) => self.expect_int(value, "an integer").map(drop),
            Ty::Float(_) => self.expect_int(value, "a floating point number").map(drop),
            Ty::RawPtr(..) => match value {
                Value::Scalar(_) | Value::Wide { .. } => Ok(()),
                Value::Uninit => Err(self.error(ValidityErrorKind::Uninit("a raw pointer".to_string()))),
                other => Err(self.shape(other, "a raw pointer")),
            },
            Ty::FnPtr => match value {
                Value::Scalar(Scalar::Ptr(ptr)) => match self.memory.get_alloc(ptr.alloc) {
                    Some(GlobalAlloc::Function(_)) if ptr.path.is_empty() => Ok(()),
                    _ => Err(self.error(ValidityErrorKind::InvalidFnPointer)),
                },
                Value::Uninit => {
                    Err(self.error(ValidityErrorKind::Uninit("a function pointer".to_string())))
                }
                _ => Err(self.error(ValidityErrorKind::InvalidFnPointer)),
            },
            Ty::Ref(_, pointee) => self.walk_ref(value, pointee),
            // Unsized values are only reachable through a wide reference.
            Ty::Str | Ty::Slice(_) => Err(self.shape(value, "a sized value")),
            Ty::Tuple(fields) => {
                let values = self.expect_fields(value, fields.len(), "a tuple")?;
                for (i, (field, field_ty)) in values.iter().zip(fields).enumerate() {
                    self.with_elem(PathElem::Field(i), |this| this.walk(field, field_ty))?;
                }
                Ok(())
            }
            Ty::Array(elem, len) => {
                let values = self.expect_fields(value, *len as usize, "an array")?;
                for (i, item) in values.iter().enumerate() {
                    self.with_elem(PathElem::Index(i as u64), |this| this.walk(item, elem))?;
                }
                Ok(())
            }
            Ty::Adt(id) => {
                let module = self.module;
                let adt = module.adt(*id);
                match adt.kind {
                    // Any bit pattern is a valid union.
                    AdtKind::Union => Ok(()),
                    AdtKind::Struct => {
                        let fields = &adt.non_enum_variant().fields;
                        let values = self.expect_fields(value, fields.len(), &adt.name)?;
                        for (i, (field, field_ty)) in values.iter().zip(fields).enumerate() {
                            self.with_elem(PathElem::Field(i), |this| this.walk(field, field_ty))?;
                        }
                        Ok(())
                    }
                    AdtKind::Enum => {
                        let (tag, values) = match value {
                            Value::Variant { tag, fields } => (tag, fields),
                            Value::Uninit => {
                                return Err(self.error(ValidityErrorKind::Uninit(format!(
                                    "a value of type {}",
                                    adt.name
                                ))))
                            }
                            other => return Err(self.shape(other, &adt.name)),
                        };
                        let tag = self.with_elem(PathElem::EnumTag, |this| {
                            let bits = this.expect_int(&Value::Scalar(tag.clone()), "an enum tag")?;
                            if bits < adt.variants.len() as u128 {
                                Ok(bits as usize)
                            } else {
                                Err(this.error(ValidityErrorKind::InvalidTag(bits)))
                            }
                        })?;
                        let fields = &adt.variants[tag].fields;
                        if values.len() != fields.len() {
                            return Err(self.shape(value, &adt.variants[tag].name));
                        }
                        self.with_elem(PathElem::Variant(tag), |this| {
                            for (i, (field, field_ty)) in values.iter().zip(fields).enumerate() {
                                this.with_elem(PathElem::Field(i), |this| this.walk(field, field_ty))?;
                            }
                            Ok(())
                        })
                    }
                }
            }
        }
    }

    fn expect_fields<'v>(
        &self,
        value: &'v Value,
        count: usize,
        expected: &str,
    ) -> Result<&'v [Value], ValidityError> {
        match value {
            Value::Aggregate(fields) if fields.len() == count => Ok(fields),
            Value::Uninit if count == 0 => Ok(&[]),
            Value::Uninit => Err(self.error(ValidityErrorKind::Uninit(expected.to_string()))),
            other => Err(self.shape(other, expected)),
        }
    }

    fn walk_ref(
        &mut self,
        value: &Value,
        pointee: &Ty,
    ) -> Result<(), ValidityError> {
        let (ptr, len) = match value {
            Value::Scalar(Scalar::Ptr(ptr)) if !pointee.is_unsized() => (ptr, None),
            Value::Wide {
                ptr: Scalar::Ptr(ptr),
                len,
            } if pointee.is_unsized() => {
                let len_value = Value::Scalar(len.clone());
                let bits = self.expect_int(&len_value, "a slice length")?;
                let len = u64::try_from(bits).map_err(|_| self.shape(&len_value, "a slice length"))?;
                (ptr, Some(len))
            }
            Value::Scalar(Scalar::Int { .. }) | Value::Wide { ptr: Scalar::Int { .. }, .. } => {
                return Err(self.error(ValidityErrorKind::IntAsReference))
            }
            Value::Uninit => return Err(self.error(ValidityErrorKind::Uninit("a reference".to_string()))),
            other => return Err(self.shape(other, "a reference")),
        };

        let target = match self.memory.get_alloc(ptr.alloc) {
            Some(GlobalAlloc::Data(_)) => self
                .memory
                .read(ptr)
                .map_err(|_| self.error(ValidityErrorKind::DanglingReference))?,
            _ => return Err(self.error(ValidityErrorKind::DanglingReference)),
        };

        if !self.visited.insert((ptr.clone(), pointee.clone())) {
            return Ok(());
        }

        self.with_elem(PathElem::Deref, |this| match (pointee, len) {
            (Ty::Str, Some(len)) | (Ty::Slice(_), Some(len)) => {
                let elems = match &target {
                    Value::Aggregate(elems) => elems.as_slice(),
                    other => return Err(this.shape(other, "a sequence")),
                };
                if len > elems.len() as u64 {
                    return Err(this.error(ValidityErrorKind::LengthMismatch {
                        len,
                        available: elems.len() as u64,
                    }));
                }
                let elems = &elems[..len as usize];
                match pointee {
                    Ty::Slice(elem) => {
                        for (i, item) in elems.iter().enumerate() {
                            this.with_elem(PathElem::Index(i as u64), |this| this.walk(item, elem))?;
                        }
                        Ok(())
                    }
                    _ => {
                        let mut bytes = Vec::with_capacity(elems.len());
                        for (i, item) in elems.iter().enumerate() {
                            let byte = this.with_elem(PathElem::Index(i as u64), |this| {
                                let bits = this.expect_int(item, "a byte")?;
                                u8::try_from(bits).map_err(|_| this.shape(item, "a byte"))
                            })?;
                            bytes.push(byte);
                        }
                        match std::str::from_utf8(&bytes) {
                            Ok(_) => Ok(()),
                            Err(_) => Err(this.error(ValidityErrorKind::InvalidUtf8)),
                        }
                    }
                }
            }
            _ => this.walk(&target, pointee),
        })
    }
}

#[cfg(test)]
mod tests;
