//! Operator semantics shared by constant folding and the VM.
//!
//! The builder folds constant operands with these functions and the VM
//! executes `Binop`/`Unop`/`Cast` instructions with the very same ones, so a
//! folded expression and its executed counterpart cannot disagree.
//!
//! Integer arithmetic wraps at the operand width (two's complement), shift
//! amounts are taken modulo the width, float arithmetic is IEEE at the
//! operand width. Integer `/` and `%` by zero trap.

use std::cmp::Ordering;

use crate::ast::{BinOp, UnOp};
use crate::types::{CastOp, TypeId, TypeKind, TypeTable};
use crate::value::{ConstValue, canonical_int};
use crate::vm::TrapKind;

fn invalid(what: &str) -> TrapKind {
    TrapKind::InvalidOperation(what.to_string())
}

/// Evaluate `lhs op rhs` where both operands have type `ty`.
pub fn binop(
    types: &TypeTable,
    op: BinOp,
    ty: TypeId,
    lhs: &ConstValue,
    rhs: &ConstValue,
) -> Result<ConstValue, TrapKind> {
    if op.is_comparison() {
        return compare(types, op, ty, lhs, rhs).map(ConstValue::Bool);
    }
    match (lhs, rhs) {
        (ConstValue::Bool(a), ConstValue::Bool(b)) => {
            let value = match op {
                BinOp::LogicAnd | BinOp::BitAnd => *a && *b,
                BinOp::LogicOr | BinOp::BitOr => *a || *b,
                BinOp::Xor => *a != *b,
                _ => return Err(invalid("arithmetic on bool")),
            };
            Ok(ConstValue::Bool(value))
        }
        (ConstValue::Int(a), ConstValue::Int(b)) => {
            let (bits, signed) = types.int_info(ty).ok_or_else(|| invalid("integer operation on non-integer type"))?;
            int_binop(op, bits, signed, *a, *b).map(ConstValue::Int)
        }
        (ConstValue::F32(a), ConstValue::F32(b)) => float_binop(op, *a, *b).map(ConstValue::F32),
        (ConstValue::F64(a), ConstValue::F64(b)) => float_binop(op, *a, *b).map(ConstValue::F64),
        _ => Err(invalid("operands of mismatched kinds")),
    }
}

fn int_binop(op: BinOp, bits: u8, signed: bool, a: u64, b: u64) -> Result<u64, TrapKind> {
    let shift = (b % u64::from(bits)) as u32;
    let raw = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div | BinOp::Mod if b == 0 => return Err(TrapKind::DivideByZero),
        // Canonical operands are sign-extended, so 64-bit division yields the
        // exact quotient; `MIN / -1` wraps once truncated.
        BinOp::Div if signed => (a as i64).wrapping_div(b as i64) as u64,
        BinOp::Div => a / b,
        BinOp::Mod if signed => (a as i64).wrapping_rem(b as i64) as u64,
        BinOp::Mod => a % b,
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a << shift,
        BinOp::Shr if signed => ((a as i64) >> shift) as u64,
        BinOp::Shr => a >> shift,
        BinOp::LogicAnd | BinOp::LogicOr => return Err(invalid("logical operator on integers")),
        _ => return Err(invalid("comparison routed to arithmetic")),
    };
    Ok(canonical_int(raw, bits, signed))
}

trait Float: Copy + PartialOrd {
    fn add(self, o: Self) -> Self;
    fn sub(self, o: Self) -> Self;
    fn mul(self, o: Self) -> Self;
    fn div(self, o: Self) -> Self;
    fn rem(self, o: Self) -> Self;
}

macro_rules! impl_float {
    ($t:ty) => {
        impl Float for $t {
            fn add(self, o: Self) -> Self {
                self + o
            }
            fn sub(self, o: Self) -> Self {
                self - o
            }
            fn mul(self, o: Self) -> Self {
                self * o
            }
            fn div(self, o: Self) -> Self {
                self / o
            }
            fn rem(self, o: Self) -> Self {
                self % o
            }
        }
    };
}

impl_float!(f32);
impl_float!(f64);

fn float_binop<F: Float>(op: BinOp, a: F, b: F) -> Result<F, TrapKind> {
    Ok(match op {
        BinOp::Add => a.add(b),
        BinOp::Sub => a.sub(b),
        BinOp::Mul => a.mul(b),
        BinOp::Div => a.div(b),
        BinOp::Mod => a.rem(b),
        _ => return Err(invalid("bitwise operator on floats")),
    })
}

/// Evaluate a comparison operator.
pub fn compare(
    types: &TypeTable,
    op: BinOp,
    ty: TypeId,
    lhs: &ConstValue,
    rhs: &ConstValue,
) -> Result<bool, TrapKind> {
    let ordering = match (lhs, rhs) {
        (ConstValue::Int(a), ConstValue::Int(b)) => {
            let signed = types.int_info(ty).is_some_and(|(_, signed)| signed);
            if signed { (*a as i64).partial_cmp(&(*b as i64)) } else { a.partial_cmp(b) }
        }
        (ConstValue::Ptr(a), ConstValue::Ptr(b)) => a.partial_cmp(b),
        (ConstValue::Bool(a), ConstValue::Bool(b)) => a.partial_cmp(b),
        (ConstValue::F32(a), ConstValue::F32(b)) => a.partial_cmp(b),
        (ConstValue::F64(a), ConstValue::F64(b)) => a.partial_cmp(b),
        (ConstValue::Fn(_) | ConstValue::Type(_), _) | (_, ConstValue::Fn(_) | ConstValue::Type(_)) => {
            return match op {
                BinOp::Eq => Ok(lhs == rhs),
                BinOp::Neq => Ok(lhs != rhs),
                _ => Err(invalid("ordering of functions or types")),
            };
        }
        _ => return Err(invalid("comparison of mismatched kinds")),
    };
    // `None` only for NaN: every comparison but `!=` is false.
    let Some(ordering) = ordering else {
        return Ok(op == BinOp::Neq);
    };
    Ok(match op {
        BinOp::Eq => ordering == Ordering::Equal,
        BinOp::Neq => ordering != Ordering::Equal,
        BinOp::Less => ordering == Ordering::Less,
        BinOp::LessEq => ordering != Ordering::Greater,
        BinOp::Greater => ordering == Ordering::Greater,
        BinOp::GreaterEq => ordering != Ordering::Less,
        _ => return Err(invalid("arithmetic routed to comparison")),
    })
}

/// Evaluate `op operand` where the operand has type `ty`.
pub fn unop(types: &TypeTable, op: UnOp, ty: TypeId, operand: &ConstValue) -> Result<ConstValue, TrapKind> {
    match (op, operand) {
        (UnOp::Pos, value) => Ok(value.clone()),
        (UnOp::Not, ConstValue::Bool(b)) => Ok(ConstValue::Bool(!b)),
        (UnOp::Neg, ConstValue::F32(v)) => Ok(ConstValue::F32(-v)),
        (UnOp::Neg, ConstValue::F64(v)) => Ok(ConstValue::F64(-v)),
        (UnOp::Neg | UnOp::BitNot, ConstValue::Int(v)) => {
            let (bits, signed) = types.int_info(ty).ok_or_else(|| invalid("integer operation on non-integer type"))?;
            let raw = if op == UnOp::Neg { v.wrapping_neg() } else { !v };
            Ok(ConstValue::int(raw, bits, signed))
        }
        _ => Err(invalid("unary operator on unsupported operand")),
    }
}

/// Apply the machine conversion `op` producing a value of type `to`.
///
/// Float to integer conversions saturate and map NaN to zero.
pub fn cast(types: &TypeTable, op: CastOp, to: TypeId, value: &ConstValue) -> Result<ConstValue, TrapKind> {
    let target_int = types.int_info(to);
    let int_result = |raw: u64| match target_int {
        Some((bits, signed)) => Ok(ConstValue::int(raw, bits, signed)),
        None => Err(invalid("integer conversion to non-integer type")),
    };
    match op {
        CastOp::None => Ok(value.clone()),
        CastOp::Bitcast if types.is_ptr(to) => Ok(ConstValue::Ptr(value.as_bits().unwrap_or(0))),
        CastOp::Sext | CastOp::Zext | CastOp::Trunc | CastOp::Bitcast | CastOp::PtrToInt => {
            int_result(value.as_bits().ok_or_else(|| invalid("integer conversion of non-integer"))?)
        }
        CastOp::IntToPtr => Ok(ConstValue::Ptr(value.as_bits().unwrap_or(0))),
        CastOp::IntToBool | CastOp::PtrToBool => Ok(ConstValue::Bool(value.as_bits().unwrap_or(0) != 0)),
        CastOp::FpExt | CastOp::FpTrunc | CastOp::SiToFp | CastOp::UiToFp => {
            let wide = match (op, value) {
                (CastOp::SiToFp, ConstValue::Int(v)) => *v as i64 as f64,
                (CastOp::UiToFp, ConstValue::Int(v)) => *v as f64,
                (_, other) => other.as_f64().ok_or_else(|| invalid("float conversion of non-float"))?,
            };
            match types.kind(to) {
                TypeKind::Real { bits: 32 } => Ok(ConstValue::F32(match value {
                    // Convert in one rounding step.
                    ConstValue::Int(v) if op == CastOp::SiToFp => *v as i64 as f32,
                    ConstValue::Int(v) => *v as f32,
                    _ => wide as f32,
                })),
                TypeKind::Real { .. } => Ok(ConstValue::F64(wide)),
                _ => Err(invalid("float conversion to non-float type")),
            }
        }
        CastOp::FpToSi | CastOp::FpToUi => {
            let v = value.as_f64().ok_or_else(|| invalid("float conversion of non-float"))?;
            let (bits, signed) = target_int.ok_or_else(|| invalid("integer conversion to non-integer type"))?;
            let (min, max) = if signed {
                (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
            } else {
                (0, (1i128 << bits) - 1)
            };
            // `as` saturates and maps NaN to zero.
            let clamped = (v as i128).clamp(min, max);
            int_result(clamped as i64 as u64)
        }
    }
}
