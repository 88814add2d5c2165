//! Types and item declarations referenced by the IR
//!
//! `ModuleIR` is the unit handed to the passes: the type declarations,
//! function signatures, statics, and every body lowered from the program.

use crate::middle::ir::Body;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of `isize`/`usize` and of pointers, in bits.
pub const POINTER_BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mutability {
    Not,
    Mut,
}

impl Mutability {
    pub fn is_mut(self) -> bool {
        matches!(self, Mutability::Mut)
    }

    pub fn prefix_str(self) -> &'static str {
        match self {
            Mutability::Not => "",
            Mutability::Mut => "mut ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntTy {
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UintTy {
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatTy {
    F32,
    F64,
}

impl IntTy {
    pub fn bit_width(self) -> u32 {
        match self {
            IntTy::I8 => 8,
            IntTy::I16 => 16,
            IntTy::I32 => 32,
            IntTy::I64 => 64,
            IntTy::I128 => 128,
            IntTy::Isize => POINTER_BITS,
        }
    }

    pub fn name_str(self) -> &'static str {
        match self {
            IntTy::I8 => "i8",
            IntTy::I16 => "i16",
            IntTy::I32 => "i32",
            IntTy::I64 => "i64",
            IntTy::I128 => "i128",
            IntTy::Isize => "isize",
        }
    }
}

impl UintTy {
    pub fn bit_width(self) -> u32 {
        match self {
            UintTy::U8 => 8,
            UintTy::U16 => 16,
            UintTy::U32 => 32,
            UintTy::U64 => 64,
            UintTy::U128 => 128,
            UintTy::Usize => POINTER_BITS,
        }
    }

    pub fn name_str(self) -> &'static str {
        match self {
            UintTy::U8 => "u8",
            UintTy::U16 => "u16",
            UintTy::U32 => "u32",
            UintTy::U64 => "u64",
            UintTy::U128 => "u128",
            UintTy::Usize => "usize",
        }
    }
}

impl FloatTy {
    pub fn bit_width(self) -> u32 {
        match self {
            FloatTy::F32 => 32,
            FloatTy::F64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdtId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FnId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaticId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub usize);

/// IR-level type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Unit,
    Never,
    Bool,
    Char,
    Int(IntTy),
    Uint(UintTy),
    Float(FloatTy),
    Str,
    Ref(Mutability, Box<Ty>),
    RawPtr(Mutability, Box<Ty>),
    FnPtr,
    FnDef(FnId),
    Tuple(Vec<Ty>),
    Array(Box<Ty>, u64),
    Slice(Box<Ty>),
    Adt(AdtId),
}

impl Ty {
    pub fn usize() -> Ty {
        Ty::Uint(UintTy::Usize)
    }

    pub fn shared_ref(pointee: Ty) -> Ty {
        Ty::Ref(Mutability::Not, Box::new(pointee))
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Ty::Int(_) | Ty::Uint(_))
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Ty::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::Float(_))
    }

    pub fn is_raw_ptr(&self) -> bool {
        matches!(self, Ty::RawPtr(..))
    }

    /// Raw pointers and function pointers, whose address is observable
    pub fn is_address_like(&self) -> bool {
        matches!(self, Ty::RawPtr(..) | Ty::FnPtr)
    }

    pub fn is_unsized(&self) -> bool {
        matches!(self, Ty::Str | Ty::Slice(_))
    }

    pub fn is_zero_length_array(&self) -> bool {
        matches!(self, Ty::Array(_, 0))
    }

    /// Pointee of a reference or raw pointer
    pub fn builtin_deref(&self) -> Option<&Ty> {
        match self {
            Ty::Ref(_, pointee) | Ty::RawPtr(_, pointee) => Some(pointee),
            _ => None,
        }
    }

    /// Element type of arrays and slices (`u8` for `str`)
    pub fn sequence_element(&self) -> Option<Ty> {
        match self {
            Ty::Array(elem, _) | Ty::Slice(elem) => Some((**elem).clone()),
            Ty::Str => Some(Ty::Uint(UintTy::U8)),
            _ => None,
        }
    }

    /// Bit width for scalar types that have one
    pub fn scalar_bits(&self) -> Option<u32> {
        match self {
            Ty::Bool => Some(8),
            Ty::Char => Some(32),
            Ty::Int(int) => Some(int.bit_width()),
            Ty::Uint(uint) => Some(uint.bit_width()),
            Ty::Float(float) => Some(float.bit_width()),
            Ty::RawPtr(..) | Ty::FnPtr => Some(POINTER_BITS),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Ty::Unit => write!(f, "()"),
            Ty::Never => write!(f, "!"),
            Ty::Bool => write!(f, "bool"),
            Ty::Char => write!(f, "char"),
            Ty::Int(int) => write!(f, "{}", int.name_str()),
            Ty::Uint(uint) => write!(f, "{}", uint.name_str()),
            Ty::Float(FloatTy::F32) => write!(f, "f32"),
            Ty::Float(FloatTy::F64) => write!(f, "f64"),
            Ty::Str => write!(f, "str"),
            Ty::Ref(mutbl, pointee) => write!(f, "&{}{}", mutbl.prefix_str(), pointee),
            Ty::RawPtr(Mutability::Not, pointee) => write!(f, "*const {}", pointee),
            Ty::RawPtr(Mutability::Mut, pointee) => write!(f, "*mut {}", pointee),
            Ty::FnPtr => write!(f, "fn()"),
            Ty::FnDef(id) => write!(f, "fn#{}", id.0),
            Ty::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                if fields.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Ty::Array(elem, len) => write!(f, "[{}; {}]", elem, len),
            Ty::Slice(elem) => write!(f, "[{}]", elem),
            Ty::Adt(id) => write!(f, "adt#{}", id.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdtKind {
    Struct,
    Enum,
    Union,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Ty>,
}

/// Struct, enum, or union declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdtDef {
    pub name: String,
    pub kind: AdtKind,
    /// Structs and unions have exactly one variant
    pub variants: Vec<VariantDef>,
    /// A user-written destructor exists
    #[serde(default)]
    pub has_drop_impl: bool,
    /// Cell-like type whose contents may change behind a shared reference
    #[serde(default)]
    pub interior_mut: bool,
}

impl AdtDef {
    pub fn is_enum(&self) -> bool {
        self.kind == AdtKind::Enum
    }

    pub fn is_union(&self) -> bool {
        self.kind == AdtKind::Union
    }

    pub fn non_enum_variant(&self) -> &VariantDef {
        &self.variants[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FnKind {
    #[default]
    Normal,
    /// Begins unwinding; evaluating a call to it is a compile-time panic
    Panic,
    /// Observes addresses (pointer hashing and the like)
    AddressSensitive,
}

/// Function signature plus the attributes the passes care about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Ty>,
    pub output: Ty,
    #[serde(default)]
    pub is_const: bool,
    /// Calls may be promoted even outside explicit const contexts
    #[serde(default)]
    pub promotable: bool,
    #[serde(default)]
    pub kind: FnKind,
    /// Argument positions that must be compile-time constants
    #[serde(default)]
    pub required_const_args: Vec<usize>,
    #[serde(default)]
    pub body: Option<BodyId>,
}

impl FnDecl {
    /// Plain runtime function without a body
    pub fn new(
        name: &str,
        inputs: Vec<Ty>,
        output: Ty,
    ) -> Self {
        Self {
            name: name.to_string(),
            inputs,
            output,
            is_const: false,
            promotable: false,
            kind: FnKind::Normal,
            required_const_args: Vec::new(),
            body: None,
        }
    }

    pub fn is_panic(&self) -> bool {
        self.kind == FnKind::Panic
    }

    /// Callable from const contexts at all
    pub fn is_const_callable(&self) -> bool {
        self.is_const || self.is_panic()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDef {
    pub name: String,
    pub ty: Ty,
    pub mutability: Mutability,
    #[serde(default)]
    pub thread_local: bool,
    #[serde(default)]
    pub init: Option<BodyId>,
}

/// A lowered program: declarations plus every body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIR {
    #[serde(default)]
    pub adts: Vec<AdtDef>,
    #[serde(default)]
    pub functions: Vec<FnDecl>,
    #[serde(default)]
    pub statics: Vec<StaticDef>,
    #[serde(default)]
    pub bodies: Vec<Body>,
}

impl ModuleIR {
    pub fn adt(
        &self,
        id: AdtId,
    ) -> &AdtDef {
        &self.adts[id.0]
    }

    pub fn function(
        &self,
        id: FnId,
    ) -> &FnDecl {
        &self.functions[id.0]
    }

    pub fn static_def(
        &self,
        id: StaticId,
    ) -> &StaticDef {
        &self.statics[id.0]
    }

    pub fn body(
        &self,
        id: BodyId,
    ) -> &Body {
        &self.bodies[id.0]
    }

    pub fn add_adt(
        &mut self,
        adt: AdtDef,
    ) -> AdtId {
        self.adts.push(adt);
        AdtId(self.adts.len() - 1)
    }

    pub fn add_function(
        &mut self,
        decl: FnDecl,
    ) -> FnId {
        self.functions.push(decl);
        FnId(self.functions.len() - 1)
    }

    pub fn add_static(
        &mut self,
        def: StaticDef,
    ) -> StaticId {
        self.statics.push(def);
        StaticId(self.statics.len() - 1)
    }

    pub fn add_body(
        &mut self,
        body: Body,
    ) -> BodyId {
        self.bodies.push(body);
        BodyId(self.bodies.len() - 1)
    }

    /// Render a type with ADT names resolved
    pub fn ty_name(
        &self,
        ty: &Ty,
    ) -> String {
        match ty {
            Ty::Adt(id) => self
                .adts
                .get(id.0)
                .map(|adt| adt.name.clone())
                .unwrap_or_else(|| ty.to_string()),
            Ty::FnDef(id) => self
                .functions
                .get(id.0)
                .map(|decl| format!("fn {}", decl.name))
                .unwrap_or_else(|| ty.to_string()),
            Ty::Ref(mutbl, pointee) => format!("&{}{}", mutbl.prefix_str(), self.ty_name(pointee)),
            Ty::Array(elem, len) => format!("[{}; {}]", self.ty_name(elem), len),
            Ty::Slice(elem) => format!("[{}]", self.ty_name(elem)),
            Ty::Tuple(fields) if !fields.is_empty() => {
                let parts: Vec<String> = fields.iter().map(|f| self.ty_name(f)).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            _ => ty.to_string(),
        }
    }

    /// Field types of a struct-like value, or of one enum variant
    pub fn field_tys(
        &self,
        ty: &Ty,
        variant: Option<usize>,
    ) -> Option<Vec<Ty>> {
        match ty {
            Ty::Tuple(fields) => Some(fields.clone()),
            Ty::Adt(id) => {
                let adt = self.adt(*id);
                let index = match (adt.kind, variant) {
                    (AdtKind::Enum, Some(v)) => v,
                    (AdtKind::Enum, None) => return None,
                    (_, _) => 0,
                };
                adt.variants.get(index).map(|v| v.fields.clone())
            }
            _ => None,
        }
    }
}
