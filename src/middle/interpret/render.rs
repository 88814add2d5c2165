//! Typed rendering of evaluated values, for reports
//!
//! `Value`'s own `Display` shows raw bits; here the type decides how bits
//! read (`-1_i8` rather than `0xff_1`) and references are followed into
//! memory.

use crate::middle::interpret::{Memory, Scalar, Value};
use crate::middle::ir::sign_extend;
use crate::middle::ty::{AdtKind, FloatTy, ModuleIR, Ty};

/// References nested deeper than this are shown as `&..`
const MAX_DEPTH: usize = 8;

pub fn render_value(
    module: &ModuleIR,
    memory: &Memory,
    value: &Value,
    ty: &Ty,
) -> String {
    Renderer { module, memory }.render(value, ty, 0)
}

struct Renderer<'a> {
    module: &'a ModuleIR,
    memory: &'a Memory,
}

impl Renderer<'_> {
    fn render(
        &self,
        value: &Value,
        ty: &Ty,
        depth: usize,
    ) -> String {
        match (value, ty) {
            (Value::Uninit, _) => "<uninit>".to_string(),
            (Value::Scalar(scalar), _) => self.scalar(scalar, ty, depth),
            (Value::Wide { ptr, len }, Ty::Ref(_, pointee) | Ty::RawPtr(_, pointee)) => {
                self.wide(ptr, len, pointee, depth)
            }
            (Value::Aggregate(fields), Ty::Tuple(tys)) => {
                let parts = self.fields(fields, tys.iter(), depth);
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            (Value::Aggregate(elems), Ty::Array(elem, _)) => {
                let parts = self.fields(elems, std::iter::repeat(&**elem), depth);
                format!("[{}]", parts.join(", "))
            }
            (Value::Aggregate(fields), Ty::Adt(id)) => {
                let adt = self.module.adt(*id);
                let parts = self.fields(fields, adt.non_enum_variant().fields.iter(), depth);
                format!("{} {{ {} }}", adt.name, parts.join(", "))
            }
            (Value::Variant { tag, fields }, Ty::Adt(id)) => {
                let adt = self.module.adt(*id);
                let variant = tag
                    .to_bits()
                    .ok()
                    .and_then(|tag| adt.variants.get(tag as usize));
                match variant {
                    Some(variant) if fields.is_empty() => format!("{}::{}", adt.name, variant.name),
                    Some(variant) => {
                        let parts = self.fields(fields, variant.fields.iter(), depth);
                        format!("{}::{}({})", adt.name, variant.name, parts.join(", "))
                    }
                    None => format!("{}::<invalid {}>", adt.name, tag),
                }
            }
            (Value::Union { field, value }, Ty::Adt(id)) => {
                let adt = self.module.adt(*id);
                match adt.non_enum_variant().fields.get(*field) {
                    Some(field_ty) if adt.kind == AdtKind::Union => format!(
                        "{} {{ .{} = {} }}",
                        adt.name,
                        field,
                        self.render(value, field_ty, depth)
                    ),
                    _ => value.to_string(),
                }
            }
            (other, _) => other.to_string(),
        }
    }

    fn fields<'t>(
        &self,
        values: &[Value],
        tys: impl Iterator<Item = &'t Ty>,
        depth: usize,
    ) -> Vec<String> {
        values
            .iter()
            .zip(tys)
            .map(|(value, ty)| self.render(value, ty, depth))
            .collect()
    }

    fn scalar(
        &self,
        scalar: &Scalar,
        ty: &Ty,
        depth: usize,
    ) -> String {
        if let Scalar::Ptr(ptr) = scalar {
            let pointee = match ty {
                Ty::Ref(_, pointee) => pointee,
                Ty::FnPtr | Ty::FnDef(_) => {
                    return match self.memory.function_at(ptr) {
                        Ok(func) => format!("fn {}", self.module.function(func).name),
                        Err(_) => format!("&{}", ptr),
                    };
                }
                _ => return format!("&{}", ptr),
            };
            if depth >= MAX_DEPTH {
                return "&..".to_string();
            }
            return match self.memory.read(ptr) {
                Ok(target) => format!("&{}", self.render(&target, pointee, depth + 1)),
                Err(_) => format!("&<dangling {}>", ptr),
            };
        }

        let Ok(bits) = scalar.to_bits() else {
            return scalar.to_string();
        };
        match ty {
            Ty::Bool => match bits {
                0 => "false".to_string(),
                1 => "true".to_string(),
                other => format!("<invalid bool {:#x}>", other),
            },
            Ty::Char => scalar
                .to_char()
                .map_or_else(|_| format!("<invalid char {:#x}>", bits), |c| format!("{:?}", c)),
            Ty::Int(int) => format!("{}_{}", sign_extend(bits, int.bit_width()), int.name_str()),
            Ty::Uint(uint) => format!("{}_{}", bits, uint.name_str()),
            Ty::Float(FloatTy::F32) => format!("{:?}_f32", f32::from_bits(bits as u32)),
            Ty::Float(FloatTy::F64) => format!("{:?}_f64", f64::from_bits(bits as u64)),
            _ => scalar.to_string(),
        }
    }

    fn wide(
        &self,
        ptr: &Scalar,
        len: &Scalar,
        pointee: &Ty,
        depth: usize,
    ) -> String {
        let (Scalar::Ptr(ptr), Ok(len)) = (ptr, len.to_u64()) else {
            return format!("({}, len {})", ptr, len);
        };
        let elems = match self.memory.read(ptr) {
            Ok(Value::Aggregate(elems)) if len as usize <= elems.len() => elems,
            _ => return format!("&<dangling {}>", ptr),
        };
        let elems = &elems[..len as usize];
        match pointee {
            Ty::Str => {
                let bytes: Option<Vec<u8>> = elems
                    .iter()
                    .map(|elem| elem.to_scalar().ok()?.to_bits().ok().map(|b| b as u8))
                    .collect();
                match bytes.map(String::from_utf8) {
                    Some(Ok(text)) => format!("{:?}", text),
                    _ => "<invalid str>".to_string(),
                }
            }
            Ty::Slice(elem) => {
                let parts = self.fields(elems, std::iter::repeat(&**elem), depth + 1);
                format!("&[{}]", parts.join(", "))
            }
            _ => format!("({}, len {})", ptr, len),
        }
    }
}
