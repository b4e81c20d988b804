//! Conversion engine
//!
//! [`convert_to`] performs explicit conversions between concrete types.
//! [`convert_untyped_to`] resolves untyped constants to a concrete type and
//! is only legal while the preprocessor runs.

use super::{SliceValue, TypedValue, Value, f64_to_i64, f64_to_u64};
use crate::types::{Kind, PrimitiveType, Type, TypeRef, Types};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use thiserror::Error;

/// A failed conversion. The message text is stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConversionError(pub String);

impl ConversionError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

type Result<T> = std::result::Result<T, ConversionError>;

/// Converts `tv` to `t`. With `is_const` set the value is a constant and
/// narrowing out of range is an error instead of wrapping.
pub fn convert_to(types: &Types, tv: &mut TypedValue, t: TypeRef, is_const: bool) -> Result<()> {
    if let Some(src) = tv.ty
        && types.is_untyped(src)
    {
        return convert_untyped_to(types, tv, Some(t));
    }
    if types.is_interface(t) {
        return Ok(());
    }
    let dk = types.kind(t);
    let Some(src) = tv.ty else {
        if is_primitive_kind(dk) {
            return Err(ConversionError::new(format!(
                "cannot convert (undefined) to {}",
                types.type_string(t)
            )));
        }
        tv.ty = Some(t);
        return Ok(());
    };
    let sk = types.kind(src);
    if sk == dk && sk != Kind::Slice {
        tv.ty = Some(t);
        return Ok(());
    }
    let cannot = || ConversionError::new(format!("cannot convert {sk} to {dk}"));
    let out_of_range = || ConversionError::new(format!("cannot convert constant of type {sk} to {dk}"));
    let v = match (&tv.v, sk) {
        (Value::Int(_) | Value::Uint(_), _) if sk.is_integer() => {
            let i = int_payload(&tv.v);
            match dk {
                k if k.is_integer() && k != Kind::Bigint => {
                    if is_const && !fits(k, i) {
                        return Err(out_of_range());
                    }
                    wrap_int(k, i)
                }
                Kind::Bigint => Value::bigint(BigInt::from(i)),
                Kind::Float32 => Value::Float32(i as f32),
                Kind::Float64 => Value::Float64(i as f64),
                Kind::Bigdec => Value::bigdec(BigDecimal::from(BigInt::from(i))),
                Kind::String => {
                    let c = u32::try_from(i)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or('\u{FFFD}');
                    Value::string(&c.to_string())
                }
                _ => return Err(cannot()),
            }
        }
        (Value::Float32(_) | Value::Float64(_), _) => {
            let f = match tv.v {
                Value::Float32(x) => x as f64,
                Value::Float64(x) => x,
                _ => 0.0,
            };
            match dk {
                k if k.is_integer() && k != Kind::Bigint => {
                    if is_const && (f.fract() != 0.0 || !f.is_finite() || !fits(k, f as i128)) {
                        return Err(out_of_range());
                    }
                    if k.is_unsigned() {
                        wrap_int(k, f64_to_u64(f) as i128)
                    } else {
                        wrap_int(k, f64_to_i64(f) as i128)
                    }
                }
                Kind::Bigint => {
                    if !f.is_finite() {
                        return Err(cannot());
                    }
                    match BigDecimal::try_from(f) {
                        Ok(d) => Value::bigint(d.with_scale(0).into_bigint_and_exponent().0),
                        Err(_) => return Err(cannot()),
                    }
                }
                Kind::Float32 => {
                    if is_const && f.is_finite() && (f as f32).is_infinite() {
                        return Err(out_of_range());
                    }
                    Value::Float32(f as f32)
                }
                Kind::Float64 => Value::Float64(f),
                Kind::Bigdec => match BigDecimal::try_from(f) {
                    Ok(d) => Value::bigdec(d),
                    Err(_) => return Err(cannot()),
                },
                _ => return Err(cannot()),
            }
        }
        (Value::BigInt(b), Kind::Bigint) => {
            let b = b.as_ref().clone();
            return convert_bigint(types, tv, b, t, dk);
        }
        (Value::BigDec(d), Kind::Bigdec) => {
            let d = d.as_ref().clone();
            return convert_bigdec(types, tv, d, t, dk);
        }
        (Value::String(s), Kind::String) => match types.base(t) {
            Type::Slice(elt) => match types.kind(*elt) {
                Kind::Uint8 => {
                    let elt = *elt;
                    let bytes = s
                        .bytes()
                        .map(|b| TypedValue::new(elt, Value::Uint(b as u64)))
                        .collect();
                    Value::Slice(SliceValue::from_values(bytes))
                }
                Kind::Int32 => {
                    let elt = *elt;
                    let runes = s
                        .chars()
                        .map(|c| TypedValue::new(elt, Value::Int(c as i64)))
                        .collect();
                    Value::Slice(SliceValue::from_values(runes))
                }
                _ => {
                    return Err(ConversionError::new(format!(
                        "cannot convert {sk} to {}",
                        types.type_string(t)
                    )));
                }
            },
            _ => return Err(cannot()),
        },
        (_, Kind::Slice) if dk == Kind::String => {
            let Some(elt) = types.elem(src) else {
                return Err(cannot());
            };
            let ek = types.kind(elt);
            if ek != Kind::Uint8 && ek != Kind::Int32 {
                return Err(ConversionError::new(format!(
                    "cannot convert {} to {dk}",
                    types.type_string(src)
                )));
            }
            let s = match &tv.v {
                Value::Slice(sv) => slice_to_string(sv, ek == Kind::Uint8),
                _ => String::new(),
            };
            Value::string(&s)
        }
        (_, Kind::Slice) if dk == Kind::Slice => {
            tv.ty = Some(t);
            return Ok(());
        }
        _ => return Err(cannot()),
    };
    tv.ty = Some(t);
    tv.v = v;
    Ok(())
}

fn is_primitive_kind(k: Kind) -> bool {
    k == Kind::Bool || k == Kind::String || k.is_numeric()
}

fn int_payload(v: &Value) -> i128 {
    match v {
        Value::Int(i) => *i as i128,
        Value::Uint(u) => *u as i128,
        _ => 0,
    }
}

fn slice_to_string(sv: &SliceValue, bytes: bool) -> String {
    if bytes {
        let data: Vec<u8> = sv
            .values()
            .iter()
            .map(|b| b.as_u64().unwrap_or(0) as u8)
            .collect();
        String::from_utf8_lossy(&data).into_owned()
    } else {
        sv.values()
            .iter()
            .map(|r| {
                u32::try_from(r.as_i64().unwrap_or(0))
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or('\u{FFFD}')
            })
            .collect()
    }
}

/// Range of an integer kind.
pub fn int_bounds(k: Kind) -> (i128, i128) {
    match k {
        Kind::Int8 => (i8::MIN as i128, i8::MAX as i128),
        Kind::Int16 => (i16::MIN as i128, i16::MAX as i128),
        Kind::Int32 => (i32::MIN as i128, i32::MAX as i128),
        Kind::Int | Kind::Int64 => (i64::MIN as i128, i64::MAX as i128),
        Kind::Uint8 => (0, u8::MAX as i128),
        Kind::Uint16 => (0, u16::MAX as i128),
        Kind::Uint32 => (0, u32::MAX as i128),
        Kind::Uint | Kind::Uint64 => (0, u64::MAX as i128),
        _ => (i128::MIN, i128::MAX),
    }
}

fn fits(k: Kind, i: i128) -> bool {
    let (lo, hi) = int_bounds(k);
    lo <= i && i <= hi
}

/// Truncates `i` to the width of `k`.
pub fn wrap_int(k: Kind, i: i128) -> Value {
    match k {
        Kind::Int8 => Value::Int(i as i8 as i64),
        Kind::Int16 => Value::Int(i as i16 as i64),
        Kind::Int32 => Value::Int(i as i32 as i64),
        Kind::Int | Kind::Int64 => Value::Int(i as i64),
        Kind::Uint8 => Value::Uint(i as u8 as u64),
        Kind::Uint16 => Value::Uint(i as u16 as u64),
        Kind::Uint32 => Value::Uint(i as u32 as u64),
        _ => Value::Uint(i as u64),
    }
}

fn guard_preprocessing(types: &Types, what: &str) -> Result<()> {
    if !types.is_preprocessing() {
        return Err(ConversionError::new(format!(
            "untyped {what} conversion should not happen during interpretation"
        )));
    }
    Ok(())
}

/// Resolves an untyped constant to `t`, or to its default type when `t` is
/// `None` or an interface.
pub fn convert_untyped_to(types: &Types, tv: &mut TypedValue, t: Option<TypeRef>) -> Result<()> {
    let Some(src) = tv.ty else {
        return Err(ConversionError::new("cannot convert nil constant"));
    };
    let Some(sp) = types.primitive(src).filter(|p| p.is_untyped()) else {
        return Err(ConversionError::new(format!(
            "expected untyped constant but got {}",
            types.type_string(src)
        )));
    };
    let t = match t {
        Some(t) if !types.is_interface(t) => t,
        _ => types.prim(sp.default_type()),
    };
    if let Some(dp) = types.primitive(t)
        && dp.is_untyped()
    {
        // untyped to untyped only widens within the constant domain
        return untyped_widen(types, tv, sp, dp);
    }
    let dk = types.kind(t);
    match sp {
        PrimitiveType::UntypedBool => {
            if dk != Kind::Bool {
                return Err(ConversionError::new(
                    "untyped bool can only be converted to bool kind",
                ));
            }
            tv.ty = Some(t);
            Ok(())
        }
        PrimitiveType::UntypedRune => convert_untyped_rune_to(types, tv, t),
        PrimitiveType::UntypedBigint => {
            guard_preprocessing(types, "Bigint")?;
            let b = const_bigint(&tv.v).unwrap_or_default();
            convert_untyped_bigint_to(types, tv, b, t)
        }
        PrimitiveType::UntypedBigdec => {
            guard_preprocessing(types, "Bigdec")?;
            let d = const_bigdec(&tv.v).unwrap_or_default();
            convert_untyped_bigdec_to(types, tv, d, t)
        }
        PrimitiveType::UntypedString => {
            guard_preprocessing(types, "String")?;
            if dk == Kind::String {
                tv.ty = Some(t);
                Ok(())
            } else {
                tv.ty = Some(types.string());
                convert_to(types, tv, t, true)
            }
        }
        _ => Err(ConversionError::new(format!(
            "unexpected untyped const type {}",
            types.type_string(src)
        ))),
    }
}

fn untyped_widen(types: &Types, tv: &mut TypedValue, sp: PrimitiveType, dp: PrimitiveType) -> Result<()> {
    if sp == dp {
        return Ok(());
    }
    let v = match (sp, dp) {
        (PrimitiveType::UntypedBigint | PrimitiveType::UntypedRune, PrimitiveType::UntypedBigdec) => {
            Value::bigdec(BigDecimal::from(const_bigint(&tv.v).unwrap_or_default()))
        }
        (PrimitiveType::UntypedBigint, PrimitiveType::UntypedRune) => {
            let b = const_bigint(&tv.v).unwrap_or_default();
            match b.to_i32() {
                Some(i) => Value::Int(i as i64),
                None => return Err(ConversionError::new("rune overflows target kind")),
            }
        }
        _ => {
            return Err(ConversionError::new(format!(
                "cannot convert {} to {}",
                sp.name(),
                dp.name()
            )));
        }
    };
    tv.ty = Some(types.prim(dp));
    tv.v = v;
    Ok(())
}

/// Integer value of a numeric constant payload.
pub fn const_bigint(v: &Value) -> Option<BigInt> {
    match v {
        Value::Int(i) => Some(BigInt::from(*i)),
        Value::Uint(u) => Some(BigInt::from(*u)),
        Value::BigInt(b) => Some(b.as_ref().clone()),
        Value::BigDec(d) => {
            let (b, exp) = d.normalized().as_bigint_and_exponent();
            (exp <= 0).then(|| b * num_traits::pow(BigInt::from(10), (-exp) as usize))
        }
        _ => None,
    }
}

/// Decimal value of a numeric constant payload.
pub fn const_bigdec(v: &Value) -> Option<BigDecimal> {
    match v {
        Value::BigDec(d) => Some(d.as_ref().clone()),
        Value::Float64(f) => BigDecimal::try_from(*f).ok(),
        Value::Float32(f) => BigDecimal::try_from(*f as f64).ok(),
        v => const_bigint(v).map(BigDecimal::from),
    }
}

pub fn convert_untyped_rune_to(types: &Types, tv: &mut TypedValue, t: TypeRef) -> Result<()> {
    let k = types.kind(t);
    let sv = match &tv.v {
        Value::Int(i) => *i as i128,
        Value::BigInt(b) => b.to_i128().unwrap_or(i128::MAX),
        _ => 0,
    };
    let v = match k {
        k if k.is_integer() && k != Kind::Bigint => {
            let (lo, hi) = int_bounds(k);
            if sv > hi {
                return Err(ConversionError::new("rune overflows target kind"));
            }
            if sv < lo {
                return Err(ConversionError::new("rune underflows target kind"));
            }
            wrap_int(k, sv)
        }
        Kind::Bigint => Value::bigint(BigInt::from(sv)),
        Kind::Bigdec => Value::bigdec(BigDecimal::from(BigInt::from(sv))),
        Kind::Float32 => Value::Float32(sv as f32),
        Kind::Float64 => Value::Float64(sv as f64),
        Kind::String => {
            let c = u32::try_from(sv)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or('\u{FFFD}');
            Value::string(&c.to_string())
        }
        _ => {
            return Err(ConversionError::new(format!(
                "cannot convert untyped rune type to {k}"
            )));
        }
    };
    tv.ty = Some(t);
    tv.v = v;
    Ok(())
}

pub fn convert_untyped_bigint_to(types: &Types, tv: &mut TypedValue, b: BigInt, t: TypeRef) -> Result<()> {
    let t = if types.is_interface(t) { types.int() } else { t };
    let k = types.kind(t);
    let v = match k {
        Kind::Bigint => Value::bigint(b),
        Kind::Bigdec => Value::bigdec(BigDecimal::from(b)),
        k if k.is_integer() => {
            let (lo, hi) = int_bounds(k);
            let i = b.to_i128();
            match i {
                Some(i) if i > hi => return Err(ConversionError::new("bigint overflows target kind")),
                Some(i) if i < lo => return Err(ConversionError::new("bigint underflows target kind")),
                Some(i) => wrap_int(k, i),
                None if b.sign() == num_bigint::Sign::Minus => {
                    return Err(ConversionError::new("bigint underflows target kind"));
                }
                None => return Err(ConversionError::new("bigint overflows target kind")),
            }
        }
        Kind::Float32 => {
            let f = b.to_f32().unwrap_or(f32::INFINITY);
            if f.is_infinite() {
                return Err(ConversionError::new("bigint overflows float32"));
            }
            Value::Float32(f)
        }
        Kind::Float64 => {
            let f = b.to_f64().unwrap_or(f64::INFINITY);
            if f.is_infinite() {
                return Err(ConversionError::new("bigint overflows float64"));
            }
            Value::Float64(f)
        }
        Kind::String => {
            tv.ty = Some(types.prim(PrimitiveType::UntypedRune));
            tv.v = Value::Int(b.to_i64().unwrap_or(-1));
            return convert_untyped_rune_to(types, tv, t);
        }
        _ => {
            return Err(ConversionError::new(format!(
                "cannot convert untyped bigint type to {k}"
            )));
        }
    };
    tv.ty = Some(t);
    tv.v = v;
    Ok(())
}

fn is_exact_integer(d: &BigDecimal) -> bool {
    d.is_integer()
}

pub fn convert_untyped_bigdec_to(types: &Types, tv: &mut TypedValue, d: BigDecimal, t: TypeRef) -> Result<()> {
    let k = if types.is_interface(t) {
        Kind::Interface
    } else {
        types.kind(t)
    };
    let not_integer = |d: &BigDecimal| {
        ConversionError::new(format!(
            "cannot convert untyped bigdec to integer -- {} not an exact integer",
            d.normalized()
        ))
    };
    let v = match k {
        Kind::Bigint => {
            if !is_exact_integer(&d) {
                return Err(not_integer(&d));
            }
            Value::bigint(const_bigint(&Value::bigdec(d.with_scale(0))).unwrap_or_default())
        }
        Kind::Bool => return Err(ConversionError::new("cannot convert untyped bigdec to bool")),
        Kind::Interface => {
            tv.ty = Some(types.float64());
            tv.v = Value::Float64(d.to_f64().unwrap_or(f64::NAN));
            return Ok(());
        }
        k if k.is_integer() => {
            if !is_exact_integer(&d) {
                return Err(not_integer(&d));
            }
            let b = const_bigint(&Value::bigdec(d.with_scale(0))).unwrap_or_default();
            return convert_untyped_bigint_to(types, tv, b, t);
        }
        Kind::Float32 => {
            let f = d.to_f64().unwrap_or(f64::INFINITY);
            if f.is_infinite() {
                return Err(ConversionError::new("bigdec overflows target kind"));
            }
            let f32v = f as f32;
            if f32v.is_infinite() {
                return Err(ConversionError::new(
                    "cannot convert untyped bigdec to float32 -- too close to +-Inf",
                ));
            }
            Value::Float32(f32v)
        }
        Kind::Float64 => {
            let f = d.to_f64().unwrap_or(f64::INFINITY);
            if f.is_infinite() {
                return Err(ConversionError::new("bigdec overflows target kind"));
            }
            Value::Float64(f)
        }
        Kind::Bigdec => Value::bigdec(d),
        _ => {
            return Err(ConversionError::new(format!(
                "cannot convert untyped bigdec type to {k}"
            )));
        }
    };
    tv.ty = Some(t);
    tv.v = v;
    Ok(())
}

fn convert_bigint(types: &Types, tv: &mut TypedValue, b: BigInt, t: TypeRef, dk: Kind) -> Result<()> {
    let v = match dk {
        k if k.is_integer() => match b.to_i128() {
            Some(i) if fits(k, i) => wrap_int(k, i),
            _ => return Err(ConversionError::new(format!("cannot convert BigintKind to {dk}"))),
        },
        Kind::Float32 => Value::Float32(b.to_f32().unwrap_or(f32::INFINITY)),
        Kind::Float64 => Value::Float64(b.to_f64().unwrap_or(f64::INFINITY)),
        Kind::Bigdec => Value::bigdec(BigDecimal::from(b)),
        _ => return Err(ConversionError::new(format!("cannot convert BigintKind to {dk}"))),
    };
    let _ = types;
    tv.ty = Some(t);
    tv.v = v;
    Ok(())
}

fn convert_bigdec(types: &Types, tv: &mut TypedValue, d: BigDecimal, t: TypeRef, dk: Kind) -> Result<()> {
    let v = match dk {
        Kind::Float32 => Value::Float32(d.to_f32().unwrap_or(f32::INFINITY)),
        Kind::Float64 => Value::Float64(d.to_f64().unwrap_or(f64::INFINITY)),
        k if k.is_integer() => {
            if !d.is_integer() {
                return Err(ConversionError::new(format!(
                    "cannot convert untyped bigdec to integer -- {} not an exact integer",
                    d.normalized()
                )));
            }
            let b = const_bigint(&Value::bigdec(d.with_scale(0))).unwrap_or_default();
            if k == Kind::Bigint {
                Value::bigint(b)
            } else {
                return convert_bigint(types, tv, b, t, dk);
            }
        }
        _ => return Err(ConversionError::new(format!("cannot convert BigdecKind to {dk}"))),
    };
    tv.ty = Some(t);
    tv.v = v;
    Ok(())
}

/// True when the constant is numerically zero.
pub fn is_const_zero(v: &Value) -> bool {
    match v {
        Value::Int(i) => *i == 0,
        Value::Uint(u) => *u == 0,
        Value::Float32(f) => *f == 0.0,
        Value::Float64(f) => *f == 0.0,
        Value::BigInt(b) => b.is_zero(),
        Value::BigDec(d) => d.is_zero(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(types: &Types, p: PrimitiveType, v: Value) -> TypedValue {
        TypedValue::new(types.prim(p), v)
    }

    fn preprocessing() -> Types {
        let mut types = Types::new();
        types.preprocessing = 1;
        types
    }

    // ====================================================================
    // Typed conversions
    // ====================================================================

    #[test]
    fn test_widening_round_trip() {
        let types = Types::new();
        let pairs = [
            (PrimitiveType::Int8, PrimitiveType::Int64, Value::Int(-128)),
            (PrimitiveType::Int16, PrimitiveType::Int32, Value::Int(-32768)),
            (PrimitiveType::Uint8, PrimitiveType::Uint64, Value::Uint(255)),
            (PrimitiveType::Uint32, PrimitiveType::Int64, Value::Uint(u32::MAX as u64)),
            (PrimitiveType::Int32, PrimitiveType::Float64, Value::Int(-7)),
        ];
        for (from, to, v) in pairs {
            let orig = typed(&types, from, v);
            let mut tv = orig.clone();
            convert_to(&types, &mut tv, types.prim(to), false).unwrap();
            convert_to(&types, &mut tv, types.prim(from), false).unwrap();
            assert_eq!(tv.as_i64(), orig.as_i64(), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn test_narrowing_wraps_at_runtime() {
        let types = Types::new();
        let mut tv = typed(&types, PrimitiveType::Int, Value::Int(300));
        convert_to(&types, &mut tv, types.prim(PrimitiveType::Uint8), false).unwrap();
        assert_eq!(tv.as_u64(), Some(44));
        let mut tv = typed(&types, PrimitiveType::Int, Value::Int(-1));
        convert_to(&types, &mut tv, types.prim(PrimitiveType::Uint16), false).unwrap();
        assert_eq!(tv.as_u64(), Some(65535));
    }

    #[test]
    fn test_constant_narrowing_fails_with_both_kinds() {
        let types = Types::new();
        let mut tv = typed(&types, PrimitiveType::Int16, Value::Int(1000));
        let err = convert_to(&types, &mut tv, types.prim(PrimitiveType::Int8), true).unwrap_err();
        assert_eq!(err.0, "cannot convert constant of type Int16Kind to Int8Kind");
        let mut tv = typed(&types, PrimitiveType::Int, Value::Int(-1));
        let err = convert_to(&types, &mut tv, types.prim(PrimitiveType::Uint), true).unwrap_err();
        assert_eq!(err.0, "cannot convert constant of type IntKind to UintKind");
    }

    #[test]
    fn test_float_to_int_truncates() {
        let types = Types::new();
        let mut tv = typed(&types, PrimitiveType::Float64, Value::Float64(-3.9));
        convert_to(&types, &mut tv, types.int(), false).unwrap();
        assert_eq!(tv.as_i64(), Some(-3));
        let mut tv = typed(&types, PrimitiveType::Float64, Value::Float64(2.5));
        assert!(convert_to(&types, &mut tv, types.int(), true).is_err());
    }

    #[test]
    fn test_float_out_of_range_is_platform_independent() {
        let types = Types::new();
        let mut tv = typed(&types, PrimitiveType::Float64, Value::Float64(1e20));
        convert_to(&types, &mut tv, types.prim(PrimitiveType::Int64), false).unwrap();
        assert_eq!(tv.as_i64(), Some(0));
        let mut tv = typed(&types, PrimitiveType::Float64, Value::Float64(-1.0));
        convert_to(&types, &mut tv, types.prim(PrimitiveType::Uint8), false).unwrap();
        assert_eq!(tv.as_u64(), Some(255));
        let mut tv = typed(&types, PrimitiveType::Float32, Value::Float32(300.75));
        convert_to(&types, &mut tv, types.prim(PrimitiveType::Uint8), false).unwrap();
        assert_eq!(tv.as_u64(), Some(44));
    }

    #[test]
    fn test_string_byte_slice_round_trip() {
        let mut types = Types::new();
        let bytes = types.slice(types.uint8());
        let runes = types.slice(types.int32());
        let mut tv = TypedValue::string(&types, "héllo");
        convert_to(&types, &mut tv, bytes, false).unwrap();
        let Value::Slice(sv) = &tv.v else {
            panic!("expected slice");
        };
        assert_eq!(sv.len, 6);
        convert_to(&types, &mut tv, types.string(), false).unwrap();
        assert_eq!(tv.as_str(), Some("héllo"));
        convert_to(&types, &mut tv, runes, false).unwrap();
        let Value::Slice(sv) = &tv.v else {
            panic!("expected slice");
        };
        assert_eq!(sv.len, 5);
    }

    #[test]
    fn test_int_to_string_is_rune() {
        let types = Types::new();
        let mut tv = TypedValue::int(&types, 65);
        convert_to(&types, &mut tv, types.string(), false).unwrap();
        assert_eq!(tv.as_str(), Some("A"));
    }

    #[test]
    fn test_nil_to_primitive_fails() {
        let types = Types::new();
        let mut tv = TypedValue::undefined();
        assert!(convert_to(&types, &mut tv, types.int(), false).is_err());
    }

    // ====================================================================
    // Untyped constants
    // ====================================================================

    #[test]
    fn test_untyped_bigint_range() {
        let types = preprocessing();
        let big = |i: i64| typed(&types, PrimitiveType::UntypedBigint, Value::bigint(BigInt::from(i)));
        let mut tv = big(127);
        convert_untyped_to(&types, &mut tv, Some(types.prim(PrimitiveType::Int8))).unwrap();
        assert_eq!(tv.as_i64(), Some(127));
        let mut tv = big(128);
        let err = convert_untyped_to(&types, &mut tv, Some(types.prim(PrimitiveType::Int8))).unwrap_err();
        assert_eq!(err.0, "bigint overflows target kind");
        let mut tv = big(-1);
        let err = convert_untyped_to(&types, &mut tv, Some(types.prim(PrimitiveType::Uint8))).unwrap_err();
        assert_eq!(err.0, "bigint underflows target kind");
    }

    #[test]
    fn test_untyped_bigdec_to_integer() {
        let types = preprocessing();
        let dec = |s: &str| {
            typed(
                &types,
                PrimitiveType::UntypedBigdec,
                Value::bigdec(s.parse::<BigDecimal>().unwrap()),
            )
        };
        let mut tv = dec("3.0");
        convert_untyped_to(&types, &mut tv, Some(types.int())).unwrap();
        assert_eq!(tv.as_i64(), Some(3));
        let mut tv = dec("3.5");
        let err = convert_untyped_to(&types, &mut tv, Some(types.int())).unwrap_err();
        assert_eq!(
            err.0,
            "cannot convert untyped bigdec to integer -- 3.5 not an exact integer"
        );
    }

    #[test]
    fn test_untyped_default_types() {
        let types = preprocessing();
        let mut tv = typed(&types, PrimitiveType::UntypedBigint, Value::bigint(BigInt::from(5)));
        convert_untyped_to(&types, &mut tv, None).unwrap();
        assert_eq!(tv.ty, Some(types.int()));
        let mut tv = typed(&types, PrimitiveType::UntypedRune, Value::Int('x' as i64));
        convert_untyped_to(&types, &mut tv, Some(types.empty_interface())).unwrap();
        assert_eq!(tv.ty, Some(types.int32()));
    }

    #[test]
    fn test_untyped_rune_bounds() {
        let types = preprocessing();
        let mut tv = typed(&types, PrimitiveType::UntypedRune, Value::Int(300));
        let err = convert_untyped_to(&types, &mut tv, Some(types.uint8())).unwrap_err();
        assert_eq!(err.0, "rune overflows target kind");
    }

    #[test]
    fn test_untyped_bigint_outside_preprocessing() {
        let types = Types::new();
        let mut tv = typed(&types, PrimitiveType::UntypedBigint, Value::bigint(BigInt::from(1)));
        let err = convert_untyped_to(&types, &mut tv, Some(types.int())).unwrap_err();
        assert!(err.0.contains("should not happen during interpretation"));
    }
}
