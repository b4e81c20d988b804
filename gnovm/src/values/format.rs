//! Printing of values
//!
//! `print`/`println` use [`sprint`]; elements of composite values and error
//! messages use the debug form `(value type)`.

use super::{Pointer, TypedValue, Value};
use crate::types::Types;

/// Nesting limit; deeper values (usually cycles through pointers) print
/// as `...`.
const MAX_DEPTH: usize = 8;

/// Formats a float the way Go's `%v` does: shortest representation,
/// switching to exponent form for exponents below -4 or from 6 up.
pub fn format_float(f: f64, is_f32: bool) -> String {
    if f.is_nan() {
        return "NaN".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let sci = if is_f32 {
        format!("{:e}", f as f32)
    } else {
        format!("{f:e}")
    };
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= 6 {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    if is_f32 {
        format!("{}", f as f32)
    } else {
        format!("{f}")
    }
}

/// Value text as `println` shows it.
pub fn sprint(types: &Types, tv: &TypedValue) -> String {
    sprint_depth(types, tv, 0)
}

fn sprint_depth(types: &Types, tv: &TypedValue, depth: usize) -> String {
    let Some(ty) = tv.ty else {
        return "undefined".to_string();
    };
    if depth > MAX_DEPTH {
        return "...".to_string();
    }
    let ty_str = || types.type_string(ty);
    match &tv.v {
        Value::None => format!("(nil {})", ty_str()),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Float32(x) => format_float(*x as f64, true),
        Value::Float64(x) => format_float(*x, false),
        Value::BigInt(b) => b.to_string(),
        Value::BigDec(d) => d.normalized().to_string(),
        Value::String(s) => s.to_string(),
        Value::Pointer(Pointer::Slot(s)) => {
            format!("&{}", debug_depth(types, &s.borrow(), depth + 1))
        }
        Value::Pointer(_) => format!("(invalid pointer {})", ty_str()),
        Value::Array(av) => {
            let elems: Vec<String> = av
                .elems
                .iter()
                .map(|s| debug_depth(types, &s.borrow(), depth + 1))
                .collect();
            format!("array[{}]", elems.join(","))
        }
        Value::Slice(sv) => {
            let elems: Vec<String> = sv
                .values()
                .iter()
                .map(|v| debug_depth(types, v, depth + 1))
                .collect();
            format!("slice[{}]", elems.join(","))
        }
        Value::Struct(sv) => {
            let fields: Vec<String> = sv
                .fields
                .iter()
                .map(|s| debug_depth(types, &s.borrow(), depth + 1))
                .collect();
            format!("struct{{{}}}", fields.join(","))
        }
        Value::Map(mv) => {
            let entries: Vec<String> = mv
                .entries()
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}:{}",
                        debug_depth(types, k, depth + 1),
                        debug_depth(types, v, depth + 1)
                    )
                })
                .collect();
            format!("map{{{}}}", entries.join(","))
        }
        Value::Func(fv) => format!("{} {}", fv.name, ty_str()),
        Value::BoundMethod(bm) => format!("{} {}", bm.func.name, ty_str()),
        Value::Type(t) => format!("typeval{{{}}}", types.type_string(*t)),
        Value::Package(pv) => format!("package({} {})", pv.name, pv.path),
    }
}

/// The `(value type)` form. Strings are quoted; the nil interface is
/// `(undefined)`.
pub fn debug_string(types: &Types, tv: &TypedValue) -> String {
    debug_depth(types, tv, 0)
}

fn debug_depth(types: &Types, tv: &TypedValue, depth: usize) -> String {
    let Some(ty) = tv.ty else {
        return "(undefined)".to_string();
    };
    match &tv.v {
        Value::None => format!("(nil {})", types.type_string(ty)),
        Value::String(s) => format!("({s:?} {})", types.type_string(ty)),
        _ => format!(
            "({} {})",
            sprint_depth(types, tv, depth),
            types.type_string(ty)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::SliceValue;

    #[test]
    fn test_format_float_switches_to_exponent() {
        assert_eq!(format_float(1.5, false), "1.5");
        assert_eq!(format_float(123456.0, false), "123456");
        assert_eq!(format_float(1e6, false), "1e+06");
        assert_eq!(format_float(1234567.0, false), "1.234567e+06");
        assert_eq!(format_float(1e21, false), "1e+21");
        assert_eq!(format_float(0.0001, false), "0.0001");
        assert_eq!(format_float(0.00001, false), "1e-05");
        assert_eq!(format_float(f64::NEG_INFINITY, false), "-Inf");
        assert_eq!(format_float(0.1, true), "0.1");
    }

    #[test]
    fn test_sprint_primitives() {
        let types = Types::new();
        assert_eq!(sprint(&types, &TypedValue::int(&types, -3)), "-3");
        assert_eq!(sprint(&types, &TypedValue::string(&types, "hi")), "hi");
        assert_eq!(sprint(&types, &TypedValue::undefined()), "undefined");
    }

    #[test]
    fn test_sprint_slice_uses_debug_elements() {
        let mut types = Types::new();
        let st = types.slice(types.string());
        let sv = SliceValue::from_values(vec![
            TypedValue::string(&types, "a"),
            TypedValue::string(&types, "b"),
        ]);
        let tv = TypedValue::new(st, Value::Slice(sv));
        insta::assert_snapshot!(sprint(&types, &tv), @r#"slice[("a" string),("b" string)]"#);
        let nil = TypedValue::new(st, Value::None);
        assert_eq!(sprint(&types, &nil), "(nil []string)");
    }
}
