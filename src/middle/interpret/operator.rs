//! Arithmetic, comparisons and casts on scalars

use crate::middle::interpret::error::{InterpError, InterpResult, UndefinedBehaviorInfo, UnsupportedOp};
use crate::middle::interpret::value::Scalar;
use crate::middle::ir::{sign_extend, truncate, BinOp, UnOp};
use crate::middle::ty::{FloatTy, Ty, POINTER_BITS};

/// Integer binary operation on operands of type `ty`.
/// Returns the wrapped result and whether the exact result overflowed.
pub fn int_binary_op(
    op: BinOp,
    lhs: u128,
    rhs: u128,
    ty: &Ty,
    rhs_ty: &Ty,
) -> InterpResult<(Scalar, bool)> {
    let bits = ty.scalar_bits().unwrap_or(POINTER_BITS);
    let signed = ty.is_signed();

    if op.is_comparison() {
        let ordering = if signed {
            sign_extend(lhs, bits).cmp(&sign_extend(rhs, bits))
        } else {
            lhs.cmp(&rhs)
        };
        let result = match op {
            BinOp::Eq => ordering.is_eq(),
            BinOp::Ne => ordering.is_ne(),
            BinOp::Lt => ordering.is_lt(),
            BinOp::Le => ordering.is_le(),
            BinOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        };
        return Ok((Scalar::from_bool(result), false));
    }

    match op {
        BinOp::BitAnd => return Ok((Scalar::from_uint(lhs & rhs, bits), false)),
        BinOp::BitOr => return Ok((Scalar::from_uint(lhs | rhs, bits), false)),
        BinOp::BitXor => return Ok((Scalar::from_uint(lhs ^ rhs, bits), false)),
        BinOp::Shl | BinOp::Shr => return shift(op, lhs, rhs, bits, signed, rhs_ty),
        BinOp::Offset => return Err(UnsupportedOp::PtrOffset.into()),
        _ => {}
    }

    if signed {
        let (l, r) = (sign_extend(lhs, bits), sign_extend(rhs, bits));
        let exact = match op {
            BinOp::Add => l.checked_add(r),
            BinOp::Sub => l.checked_sub(r),
            BinOp::Mul => l.checked_mul(r),
            BinOp::Div | BinOp::Rem => {
                if r == 0 {
                    return Err(divide_by_zero(op));
                }
                let min = sign_extend(1u128 << (bits - 1), bits);
                if l == min && r == -1 {
                    // MIN / -1 and MIN % -1 overflow; lowering guards both with an assert.
                    return Ok((Scalar::from_int(if op == BinOp::Div { min } else { 0 }, bits), true));
                }
                Some(if op == BinOp::Div { l / r } else { l % r })
            }
            _ => unreachable!("non-arithmetic operator {:?}", op),
        };
        let wrapped = match op {
            BinOp::Add => l.wrapping_add(r),
            BinOp::Sub => l.wrapping_sub(r),
            BinOp::Mul => l.wrapping_mul(r),
            _ => exact.unwrap_or_default(),
        };
        let result = Scalar::from_int(wrapped, bits);
        let fits = exact.map_or(false, |v| sign_extend(truncate(v as u128, bits), bits) == v);
        Ok((result, !fits))
    } else {
        let exact = match op {
            BinOp::Add => lhs.checked_add(rhs),
            BinOp::Sub => lhs.checked_sub(rhs),
            BinOp::Mul => lhs.checked_mul(rhs),
            BinOp::Div | BinOp::Rem => {
                if rhs == 0 {
                    return Err(divide_by_zero(op));
                }
                Some(if op == BinOp::Div { lhs / rhs } else { lhs % rhs })
            }
            _ => unreachable!("non-arithmetic operator {:?}", op),
        };
        let wrapped = match op {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            _ => exact.unwrap_or_default(),
        };
        let fits = exact.map_or(false, |v| truncate(v, bits) == v);
        Ok((Scalar::from_uint(wrapped, bits), !fits))
    }
}

fn divide_by_zero(op: BinOp) -> InterpError {
    if op == BinOp::Div {
        UndefinedBehaviorInfo::DivisionByZero.into()
    } else {
        UndefinedBehaviorInfo::RemainderByZero.into()
    }
}

fn shift(
    op: BinOp,
    lhs: u128,
    rhs: u128,
    bits: u32,
    signed: bool,
    rhs_ty: &Ty,
) -> InterpResult<(Scalar, bool)> {
    let rhs_bits = rhs_ty.scalar_bits().unwrap_or(POINTER_BITS);
    let amount = if rhs_ty.is_signed() {
        sign_extend(rhs, rhs_bits)
    } else {
        rhs as i128
    };
    let overflow = amount < 0 || amount >= bits as i128;
    // Out-of-range amounts are masked, like the `wrapping_sh*` methods.
    let masked = (amount as u128 % bits as u128) as u32;
    let result = match op {
        BinOp::Shl => truncate(lhs << masked, bits),
        _ if signed => truncate((sign_extend(lhs, bits) >> masked) as u128, bits),
        _ => lhs >> masked,
    };
    Ok((Scalar::from_uint(result, bits), overflow))
}

pub fn float_binary_op(
    op: BinOp,
    lhs: u128,
    rhs: u128,
    ty: FloatTy,
) -> InterpResult<Scalar> {
    match ty {
        FloatTy::F32 => {
            let (l, r) = (f32::from_bits(lhs as u32), f32::from_bits(rhs as u32));
            float_op(op, l as f64, r as f64, |v| Scalar::from_uint((v as f32).to_bits() as u128, 32))
        }
        FloatTy::F64 => {
            let (l, r) = (f64::from_bits(lhs as u64), f64::from_bits(rhs as u64));
            float_op(op, l, r, |v| Scalar::from_uint(v.to_bits() as u128, 64))
        }
    }
}

fn float_op(
    op: BinOp,
    l: f64,
    r: f64,
    make: impl Fn(f64) -> Scalar,
) -> InterpResult<Scalar> {
    Ok(match op {
        BinOp::Add => make(l + r),
        BinOp::Sub => make(l - r),
        BinOp::Mul => make(l * r),
        BinOp::Div => make(l / r),
        BinOp::Rem => make(l % r),
        BinOp::Eq => Scalar::from_bool(l == r),
        BinOp::Ne => Scalar::from_bool(l != r),
        BinOp::Lt => Scalar::from_bool(l < r),
        BinOp::Le => Scalar::from_bool(l <= r),
        BinOp::Gt => Scalar::from_bool(l > r),
        BinOp::Ge => Scalar::from_bool(l >= r),
        _ => {
            return Err(UndefinedBehaviorInfo::InvalidValue(format!(
                "operator `{}` applied to floats",
                op.symbol()
            ))
            .into())
        }
    })
}

/// `!` and unary `-`. Returns whether negation overflowed.
pub fn unary_op(
    op: UnOp,
    value: &Scalar,
    ty: &Ty,
) -> InterpResult<(Scalar, bool)> {
    let bits = value.to_bits()?;
    match (op, ty) {
        (UnOp::Not, Ty::Bool) => Ok((Scalar::from_bool(!value.to_bool()?), false)),
        (UnOp::Not, _) => {
            let width = ty.scalar_bits().unwrap_or(POINTER_BITS);
            Ok((Scalar::from_uint(!bits, width), false))
        }
        (UnOp::Neg, Ty::Float(FloatTy::F32)) => {
            let v = -f32::from_bits(bits as u32);
            Ok((Scalar::from_uint(v.to_bits() as u128, 32), false))
        }
        (UnOp::Neg, Ty::Float(FloatTy::F64)) => {
            let v = -f64::from_bits(bits as u64);
            Ok((Scalar::from_uint(v.to_bits() as u128, 64), false))
        }
        (UnOp::Neg, _) => {
            let width = ty.scalar_bits().unwrap_or(POINTER_BITS);
            let v = sign_extend(bits, width);
            let min = sign_extend(1u128 << (width - 1), width);
            Ok((Scalar::from_int(v.wrapping_neg(), width), v == min))
        }
    }
}

/// Numeric `as` casts. Float to int saturates, NaN becomes zero.
pub fn numeric_cast(
    value: &Scalar,
    from: &Ty,
    to: &Ty,
) -> InterpResult<Scalar> {
    let bits = value.to_bits()?;
    let to_bits = to.scalar_bits().unwrap_or(POINTER_BITS);

    if let Ty::Float(from_float) = from {
        let v = match from_float {
            FloatTy::F32 => f32::from_bits(bits as u32) as f64,
            FloatTy::F64 => f64::from_bits(bits as u64),
        };
        return Ok(match to {
            Ty::Float(FloatTy::F32) => Scalar::from_uint((v as f32).to_bits() as u128, 32),
            Ty::Float(FloatTy::F64) => Scalar::from_uint(v.to_bits() as u128, 64),
            _ if to.is_signed() => Scalar::from_int(saturate_signed(v, to_bits), to_bits),
            _ => Scalar::from_uint(saturate_unsigned(v, to_bits), to_bits),
        });
    }

    let from_bits = from.scalar_bits().unwrap_or(POINTER_BITS);
    let extended = if from.is_signed() {
        sign_extend(bits, from_bits) as u128
    } else {
        truncate(bits, from_bits)
    };
    Ok(match to {
        Ty::Float(FloatTy::F32) => {
            let v = if from.is_signed() {
                extended as i128 as f32
            } else {
                extended as f32
            };
            Scalar::from_uint(v.to_bits() as u128, 32)
        }
        Ty::Float(FloatTy::F64) => {
            let v = if from.is_signed() {
                extended as i128 as f64
            } else {
                extended as f64
            };
            Scalar::from_uint(v.to_bits() as u128, 64)
        }
        Ty::Char => {
            // Only `u8 as char` exists in the surface language.
            let c = char::from_u32(truncate(extended, 8) as u32).unwrap_or('\0');
            Scalar::from_char(c)
        }
        _ => Scalar::from_uint(extended, to_bits),
    })
}

fn saturate_signed(
    v: f64,
    bits: u32,
) -> i128 {
    if v.is_nan() {
        return 0;
    }
    let max = (1i128 << (bits - 1)) - 1;
    let min = -(1i128 << (bits - 1));
    if v >= max as f64 {
        max
    } else if v <= min as f64 {
        min
    } else {
        v as i128
    }
}

fn saturate_unsigned(
    v: f64,
    bits: u32,
) -> u128 {
    if v.is_nan() || v <= 0.0 {
        return 0;
    }
    let max = truncate(u128::MAX, bits);
    if v >= max as f64 {
        max
    } else {
        v as u128
    }
}
