//! Arithmetic, comparison and unary operators on typed values
//!
//! Both operands of a binary operator have the same type by the time these
//! run; the preprocessor inserts conversions where they differ. Integer
//! results are wrapped to the width of the operand kind.

use super::{Pointer, TypedValue, Value, const_bigdec, wrap_int};
use crate::ast::{BinaryOp, UnaryOp};
use crate::types::{Kind, Types};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::cmp::Ordering;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("integer divide by zero")]
    DivisionByZero,
    #[error("negative shift amount")]
    NegativeShift,
    #[error("{0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, OpError>;

fn invalid(types: &Types, op: impl std::fmt::Display, tv: &TypedValue) -> OpError {
    let ty = tv
        .ty
        .map(|t| types.type_string(t))
        .unwrap_or_else(|| "nil".to_string());
    OpError::Invalid(format!("invalid operation: operator {op} not defined on {ty}"))
}

/// Applies a binary operator. Logical operators here evaluate both sides;
/// short-circuiting is the evaluator's job.
pub fn binary_op(types: &Types, op: BinaryOp, l: &TypedValue, r: &TypedValue) -> Result<TypedValue> {
    if op.is_comparison() {
        let b = compare(types, op, l, r)?;
        return Ok(TypedValue::new(types.untyped_bool(), Value::Bool(b)));
    }
    let Some(ty) = l.ty else {
        return Err(invalid(types, op, l));
    };
    if op.is_shift() {
        return shift(types, op, l, r);
    }
    let kind = types.kind(ty);
    let v = match (&l.v, &r.v) {
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::LAnd => Value::Bool(*a && *b),
            BinaryOp::LOr => Value::Bool(*a || *b),
            _ => return Err(invalid(types, op, l)),
        },
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Value::String(Rc::from(s))
        }
        (Value::Int(_) | Value::Uint(_), Value::Int(_) | Value::Uint(_)) if kind.is_integer() => {
            int_arith(kind, op, l, r).ok_or_else(|| invalid(types, op, l))??
        }
        (Value::Float32(a), Value::Float32(b)) => match float_arith(op, *a as f64, *b as f64) {
            Some(x) => Value::Float32(x as f32),
            None => return Err(invalid(types, op, l)),
        },
        (Value::Float64(a), Value::Float64(b)) => match float_arith(op, *a, *b) {
            Some(x) => Value::Float64(x),
            None => return Err(invalid(types, op, l)),
        },
        (Value::BigDec(_), _) | (_, Value::BigDec(_)) => {
            let (Some(a), Some(b)) = (const_bigdec(&l.v), const_bigdec(&r.v)) else {
                return Err(invalid(types, op, l));
            };
            Value::bigdec(dec_arith(op, &a, &b).ok_or_else(|| invalid(types, op, l))??)
        }
        (Value::BigInt(_), _) | (_, Value::BigInt(_)) => {
            let (Some(a), Some(b)) = (super::const_bigint(&l.v), super::const_bigint(&r.v)) else {
                return Err(invalid(types, op, l));
            };
            Value::bigint(big_arith(op, &a, &b).ok_or_else(|| invalid(types, op, l))??)
        }
        _ => return Err(invalid(types, op, l)),
    };
    Ok(TypedValue { ty: l.ty, v })
}

fn int_arith(kind: Kind, op: BinaryOp, l: &TypedValue, r: &TypedValue) -> Option<Result<Value>> {
    let unsigned = kind.is_unsigned();
    let (a, b) = if unsigned {
        (l.as_u64()? as i128, r.as_u64()? as i128)
    } else {
        (l.as_i64()? as i128, r.as_i64()? as i128)
    };
    let raw = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Quo | BinaryOp::Rem => {
            if b == 0 {
                return Some(Err(OpError::DivisionByZero));
            }
            if unsigned {
                let (x, y) = (a as u64, b as u64);
                (if op == BinaryOp::Quo { x / y } else { x % y }) as i128
            } else {
                let (x, y) = (a as i64, b as i64);
                (if op == BinaryOp::Quo {
                    x.wrapping_div(y)
                } else {
                    x.wrapping_rem(y)
                }) as i128
            }
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::AndNot => a & !b,
        _ => return None,
    };
    Some(Ok(wrap_int(kind, raw)))
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Quo => a / b,
        _ => return None,
    })
}

fn big_arith(op: BinaryOp, a: &BigInt, b: &BigInt) -> Option<Result<BigInt>> {
    Some(Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Quo | BinaryOp::Rem if b.is_zero() => return Some(Err(OpError::DivisionByZero)),
        BinaryOp::Quo => a / b,
        BinaryOp::Rem => a % b,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::AndNot => a & !b.clone(),
        _ => return None,
    }))
}

fn dec_arith(op: BinaryOp, a: &BigDecimal, b: &BigDecimal) -> Option<Result<BigDecimal>> {
    Some(Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Quo if b.is_zero() => return Some(Err(OpError::DivisionByZero)),
        BinaryOp::Quo => a / b,
        _ => return None,
    }))
}

/// Shift count of the right operand.
pub fn shift_count(r: &TypedValue) -> Result<u64> {
    match &r.v {
        Value::Int(i) if *i < 0 => Err(OpError::NegativeShift),
        Value::Int(i) => Ok(*i as u64),
        Value::Uint(u) => Ok(*u),
        Value::BigInt(b) => match b.to_u64() {
            Some(u) => Ok(u),
            None if b.sign() == num_bigint::Sign::Minus => Err(OpError::NegativeShift),
            None => Err(OpError::Invalid("shift count too large".to_string())),
        },
        _ => Err(OpError::Invalid("shift count must be an integer".to_string())),
    }
}

fn shift(types: &Types, op: BinaryOp, l: &TypedValue, r: &TypedValue) -> Result<TypedValue> {
    let n = shift_count(r)?;
    let left = op == BinaryOp::Shl;
    let Some(ty) = l.ty else {
        return Err(invalid(types, op, l));
    };
    let kind = types.kind(ty);
    let v = match &l.v {
        Value::Int(a) => {
            let x = if left {
                if n >= 64 { 0 } else { a.wrapping_shl(n as u32) }
            } else if n >= 64 {
                if *a < 0 { -1 } else { 0 }
            } else {
                a >> n
            };
            wrap_int(kind, x as i128)
        }
        Value::Uint(a) => {
            let x = if n >= 64 {
                0
            } else if left {
                a.wrapping_shl(n as u32)
            } else {
                a >> n
            };
            wrap_int(kind, x as i128)
        }
        Value::BigInt(b) => {
            if n > 10_000 {
                return Err(OpError::Invalid("shift count too large".to_string()));
            }
            let n = n as usize;
            Value::bigint(if left { b.as_ref() << n } else { b.as_ref() >> n })
        }
        Value::BigDec(d) if d.is_integer() => {
            let Some(b) = super::const_bigint(&l.v) else {
                return Err(invalid(types, op, l));
            };
            let n = n.min(10_000) as usize;
            Value::bigint(if left { b << n } else { b >> n })
        }
        _ => return Err(invalid(types, op, l)),
    };
    Ok(TypedValue { ty: l.ty, v })
}

/// Evaluates a comparison operator.
pub fn compare(types: &Types, op: BinaryOp, l: &TypedValue, r: &TypedValue) -> Result<bool> {
    match op {
        BinaryOp::Eql => values_equal(types, l, r),
        BinaryOp::Neq => values_equal(types, l, r).map(|b| !b),
        _ => {
            let Some(ord) = ordering(types, l, r)? else {
                // NaN compares false
                return Ok(false);
            };
            Ok(match op {
                BinaryOp::Lss => ord == Ordering::Less,
                BinaryOp::Leq => ord != Ordering::Greater,
                BinaryOp::Gtr => ord == Ordering::Greater,
                BinaryOp::Geq => ord != Ordering::Less,
                _ => return Err(invalid(types, op, l)),
            })
        }
    }
}

fn ordering(types: &Types, l: &TypedValue, r: &TypedValue) -> Result<Option<Ordering>> {
    let unsigned = l.ty.is_some_and(|t| types.kind(t).is_unsigned());
    Ok(match (&l.v, &r.v) {
        (Value::Int(_) | Value::Uint(_), Value::Int(_) | Value::Uint(_)) if unsigned => {
            l.as_u64().partial_cmp(&r.as_u64())
        }
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float32(a), Value::Float32(b)) => a.partial_cmp(b),
        (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (Value::BigInt(a), Value::BigInt(b)) => Some(a.cmp(b)),
        _ => match (const_bigdec(&l.v), const_bigdec(&r.v)) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => return Err(invalid(types, "<", l)),
        },
    })
}

/// Go equality. Slices, maps and functions compare only against nil.
pub fn values_equal(types: &Types, l: &TypedValue, r: &TypedValue) -> Result<bool> {
    match (l.ty, r.ty) {
        (None, None) => return Ok(true),
        (None, Some(_)) | (Some(_), None) => return Ok(false),
        (Some(a), Some(b)) => {
            let untyped = types.is_untyped(a) || types.is_untyped(b);
            if !untyped && !types.same(a, b) {
                return Ok(false);
            }
        }
    }
    let uncomparable = |tv: &TypedValue| {
        let ty = tv.ty.map(|t| types.type_string(t)).unwrap_or_default();
        OpError::Invalid(format!("runtime error: comparing uncomparable type {ty}"))
    };
    Ok(match (&l.v, &r.v) {
        (Value::None, Value::None) => true,
        (Value::None, _) | (_, Value::None) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Uint(a), Value::Uint(b)) => a == b,
        (Value::Float32(a), Value::Float32(b)) => a == b,
        (Value::Float64(a), Value::Float64(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Pointer(a), Value::Pointer(b)) => a.same(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.elems.iter().zip(b.elems.iter()) {
                if !values_equal(types, &x.borrow(), &y.borrow())? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Struct(a), Value::Struct(b)) => {
            for (x, y) in a.fields.iter().zip(b.fields.iter()) {
                if !values_equal(types, &x.borrow(), &y.borrow())? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Type(a), Value::Type(b)) => types.same(*a, *b),
        (Value::Package(a), Value::Package(b)) => Rc::ptr_eq(a, b),
        (Value::Slice(_) | Value::Map(_) | Value::Func(_) | Value::BoundMethod(_), _) => {
            return Err(uncomparable(l));
        }
        _ => match (const_bigdec(&l.v), const_bigdec(&r.v)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    })
}

pub fn unary_op(types: &Types, op: UnaryOp, x: &TypedValue) -> Result<TypedValue> {
    let kind = x.ty.map(|t| types.kind(t)).unwrap_or(Kind::Invalid);
    let v = match (op, &x.v) {
        (UnaryOp::Pos, v) if kind.is_numeric() => v.clone(),
        (UnaryOp::Neg, Value::Int(i)) => wrap_int(kind, (*i as i128).wrapping_neg()),
        (UnaryOp::Neg, Value::Uint(u)) => wrap_int(kind, (*u as i128).wrapping_neg()),
        (UnaryOp::Neg, Value::Float32(f)) => Value::Float32(-f),
        (UnaryOp::Neg, Value::Float64(f)) => Value::Float64(-f),
        (UnaryOp::Neg, Value::BigInt(b)) => Value::bigint(-b.as_ref()),
        (UnaryOp::Neg, Value::BigDec(d)) => Value::bigdec(-d.as_ref()),
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnaryOp::Xor, Value::Int(i)) => wrap_int(kind, !(*i as i128)),
        (UnaryOp::Xor, Value::Uint(u)) => wrap_int(kind, !(*u as i128)),
        (UnaryOp::Xor, Value::BigInt(b)) => Value::bigint(-b.as_ref() - 1),
        _ => return Err(invalid(types, op, x)),
    };
    Ok(TypedValue { ty: x.ty, v })
}

/// Dereferences a pointer value, failing on nil.
pub fn deref(tv: &TypedValue) -> Option<TypedValue> {
    match &tv.v {
        Value::Pointer(Pointer::Slot(s)) => Some(s.borrow().clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveType;

    fn typed(types: &Types, p: PrimitiveType, v: Value) -> TypedValue {
        TypedValue::new(types.prim(p), v)
    }

    // ====================================================================
    // Integers
    // ====================================================================

    #[test]
    fn test_int8_wraps() {
        let types = Types::new();
        let a = typed(&types, PrimitiveType::Int8, Value::Int(127));
        let b = typed(&types, PrimitiveType::Int8, Value::Int(1));
        let c = binary_op(&types, BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(c.as_i64(), Some(-128));
    }

    #[test]
    fn test_uint_subtraction_wraps() {
        let types = Types::new();
        let a = typed(&types, PrimitiveType::Uint8, Value::Uint(0));
        let b = typed(&types, PrimitiveType::Uint8, Value::Uint(1));
        let c = binary_op(&types, BinaryOp::Sub, &a, &b).unwrap();
        assert_eq!(c.as_u64(), Some(255));
    }

    #[test]
    fn test_division_by_zero() {
        let types = Types::new();
        let a = TypedValue::int(&types, 1);
        let z = TypedValue::int(&types, 0);
        assert_eq!(
            binary_op(&types, BinaryOp::Quo, &a, &z).unwrap_err(),
            OpError::DivisionByZero
        );
    }

    #[test]
    fn test_truncated_division() {
        let types = Types::new();
        let a = TypedValue::int(&types, -7);
        let b = TypedValue::int(&types, 2);
        assert_eq!(binary_op(&types, BinaryOp::Quo, &a, &b).unwrap().as_i64(), Some(-3));
        assert_eq!(binary_op(&types, BinaryOp::Rem, &a, &b).unwrap().as_i64(), Some(-1));
    }

    #[test]
    fn test_shifts() {
        let types = Types::new();
        let a = TypedValue::int(&types, -8);
        let n = typed(&types, PrimitiveType::Uint, Value::Uint(1));
        assert_eq!(binary_op(&types, BinaryOp::Shr, &a, &n).unwrap().as_i64(), Some(-4));
        let big = typed(&types, PrimitiveType::Uint, Value::Uint(70));
        assert_eq!(binary_op(&types, BinaryOp::Shl, &a, &big).unwrap().as_i64(), Some(0));
        let neg = TypedValue::int(&types, -1);
        assert_eq!(
            binary_op(&types, BinaryOp::Shl, &a, &neg).unwrap_err(),
            OpError::NegativeShift
        );
    }

    // ====================================================================
    // Constants and comparisons
    // ====================================================================

    #[test]
    fn test_untyped_bigint_arith() {
        let types = Types::new();
        let a = typed(&types, PrimitiveType::UntypedBigint, Value::bigint(BigInt::from(1) << 70));
        let b = typed(&types, PrimitiveType::UntypedBigint, Value::bigint(BigInt::from(1) << 70));
        let c = binary_op(&types, BinaryOp::Quo, &a, &b).unwrap();
        assert_eq!(super::super::const_bigint(&c.v), Some(BigInt::from(1)));
    }

    #[test]
    fn test_comparisons() {
        let types = Types::new();
        let a = TypedValue::string(&types, "abc");
        let b = TypedValue::string(&types, "abd");
        assert!(compare(&types, BinaryOp::Lss, &a, &b).unwrap());
        assert!(!compare(&types, BinaryOp::Eql, &a, &b).unwrap());
        let nan = typed(&types, PrimitiveType::Float64, Value::Float64(f64::NAN));
        assert!(!compare(&types, BinaryOp::Leq, &nan, &nan).unwrap());
        assert!(!compare(&types, BinaryOp::Eql, &nan, &nan).unwrap());
    }

    #[test]
    fn test_nil_interface_equality() {
        let types = Types::new();
        assert!(values_equal(&types, &TypedValue::undefined(), &TypedValue::undefined()).unwrap());
        assert!(!values_equal(&types, &TypedValue::int(&types, 0), &TypedValue::undefined()).unwrap());
    }

    #[test]
    fn test_unary() {
        let types = Types::new();
        let u = typed(&types, PrimitiveType::Uint8, Value::Uint(5));
        assert_eq!(unary_op(&types, UnaryOp::Xor, &u).unwrap().as_u64(), Some(250));
        let i = TypedValue::int(&types, i64::MIN);
        assert_eq!(unary_op(&types, UnaryOp::Neg, &i).unwrap().as_i64(), Some(i64::MIN));
    }
}
