//! Bundled standard library
//!
//! Each package is a `.gno` source file; bodyless declarations in it are
//! bound to the natives registered here when the package is preprocessed.

use crate::interp::{InterpResult, Machine, RuntimeError};
use crate::store::MemStore;
use crate::types::Types;
use crate::values::{NativeFn, SliceValue, TypedValue, Value};

const SOURCES: [(&str, &str, &str); 3] = [
    ("errors", "errors.gno", include_str!("gno/errors.gno")),
    ("strconv", "strconv.gno", include_str!("gno/strconv.gno")),
    ("strings", "strings.gno", include_str!("gno/strings.gno")),
];

/// Registers the bundled package sources and their natives with `store`.
pub fn install(store: &mut MemStore) {
    for (path, file, text) in SOURCES {
        store.add_source(path, file, text);
    }
    let natives: [(&str, &str, NativeFn); 14] = [
        ("strconv", "Itoa", strconv_itoa),
        ("strconv", "FormatBool", strconv_format_bool),
        ("strconv", "Quote", strconv_quote),
        ("strconv", "atoi", strconv_atoi),
        ("strings", "Repeat", strings_repeat),
        ("strings", "ToUpper", strings_to_upper),
        ("strings", "ToLower", strings_to_lower),
        ("strings", "Contains", strings_contains),
        ("strings", "HasPrefix", strings_has_prefix),
        ("strings", "HasSuffix", strings_has_suffix),
        ("strings", "Index", strings_index),
        ("strings", "TrimSpace", strings_trim_space),
        ("strings", "Join", strings_join),
        ("strings", "Split", strings_split),
    ];
    for (path, name, f) in natives {
        store.register_native(path, name, f);
    }
}

fn str_arg(args: &[TypedValue], i: usize) -> InterpResult<&str> {
    args.get(i)
        .and_then(TypedValue::as_str)
        .ok_or_else(|| RuntimeError::internal(format!("argument {i} is not a string")))
}

fn int_arg(args: &[TypedValue], i: usize) -> InterpResult<i64> {
    args.get(i)
        .and_then(TypedValue::as_i64)
        .ok_or_else(|| RuntimeError::internal(format!("argument {i} is not an integer")))
}

fn string_result(types: &Types, s: &str) -> Vec<TypedValue> {
    vec![TypedValue::string(types, s)]
}

fn bool_result(types: &Types, b: bool) -> Vec<TypedValue> {
    vec![TypedValue::bool(types, b)]
}

// ============================================
// strconv
// ============================================

fn strconv_itoa(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let i = int_arg(&args, 0)?;
    Ok(string_result(m.types, &i.to_string()))
}

fn strconv_format_bool(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let b = args
        .first()
        .and_then(TypedValue::as_bool)
        .ok_or_else(|| RuntimeError::internal("argument 0 is not a bool"))?;
    Ok(string_result(m.types, if b { "true" } else { "false" }))
}

fn strconv_quote(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let s = str_arg(&args, 0)?;
    Ok(string_result(m.types, &quote(s)))
}

fn strconv_atoi(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let s = str_arg(&args, 0)?;
    let (n, reason) = match atoi(s) {
        Ok(n) => (n, ""),
        Err(reason) => (0, reason),
    };
    Ok(vec![TypedValue::int(m.types, n), TypedValue::string(m.types, reason)])
}

/// Parses a decimal int with an optional sign.
fn atoi(s: &str) -> Result<i64, &'static str> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err("invalid syntax");
    }
    s.parse::<i64>().map_err(|_| "value out of range")
}

/// Double-quoted literal with Go escapes; printable characters are kept.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{b}' => out.push_str("\\v"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if c.is_control() => {
                if (c as u32) <= 0xffff {
                    out.push_str(&format!("\\u{:04x}", c as u32));
                } else {
                    out.push_str(&format!("\\U{:08x}", c as u32));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ============================================
// strings
// ============================================

fn strings_repeat(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let s = str_arg(&args, 0)?;
    let count = int_arg(&args, 1)?;
    let count = usize::try_from(count).map_err(|_| RuntimeError::panic("strings: negative Repeat count"))?;
    Ok(string_result(m.types, &s.repeat(count)))
}

fn strings_to_upper(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    Ok(string_result(m.types, &str_arg(&args, 0)?.to_uppercase()))
}

fn strings_to_lower(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    Ok(string_result(m.types, &str_arg(&args, 0)?.to_lowercase()))
}

fn strings_contains(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let (s, sub) = (str_arg(&args, 0)?, str_arg(&args, 1)?);
    Ok(bool_result(m.types, s.contains(sub)))
}

fn strings_has_prefix(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let (s, prefix) = (str_arg(&args, 0)?, str_arg(&args, 1)?);
    Ok(bool_result(m.types, s.starts_with(prefix)))
}

fn strings_has_suffix(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let (s, suffix) = (str_arg(&args, 0)?, str_arg(&args, 1)?);
    Ok(bool_result(m.types, s.ends_with(suffix)))
}

fn strings_index(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let (s, sub) = (str_arg(&args, 0)?, str_arg(&args, 1)?);
    let i = s.find(sub).map_or(-1, |i| i as i64);
    Ok(vec![TypedValue::int(m.types, i)])
}

fn strings_trim_space(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    Ok(string_result(m.types, str_arg(&args, 0)?.trim()))
}

fn strings_join(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let elems: Vec<String> = match args.first().map(|a| &a.v) {
        Some(Value::Slice(sv)) => sv
            .values()
            .iter()
            .map(|e| e.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    };
    let sep = str_arg(&args, 1)?;
    Ok(string_result(m.types, &elems.join(sep)))
}

fn strings_split(m: &mut Machine<'_>, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
    let (s, sep) = (str_arg(&args, 0)?, str_arg(&args, 1)?);
    let types = m.types;
    let parts: Vec<TypedValue> = if sep.is_empty() {
        s.chars().map(|c| TypedValue::string(types, &c.to_string())).collect()
    } else {
        s.split(sep).map(|p| TypedValue::string(types, p)).collect()
    };
    let ty = types
        .lookup("[]string")
        .ok_or_else(|| RuntimeError::internal("type []string was never declared"))?;
    Ok(vec![TypedValue::new(ty, Value::Slice(SliceValue::from_values(parts)))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atoi() {
        assert_eq!(atoi("42"), Ok(42));
        assert_eq!(atoi("-7"), Ok(-7));
        assert_eq!(atoi("+3"), Ok(3));
        assert_eq!(atoi("x"), Err("invalid syntax"));
        assert_eq!(atoi(""), Err("invalid syntax"));
        assert_eq!(atoi("-"), Err("invalid syntax"));
        assert_eq!(atoi("99999999999999999999"), Err("value out of range"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("x"), "\"x\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote("tab\there\n"), "\"tab\\there\\n\"");
        assert_eq!(quote("\u{1}"), "\"\\x01\"");
        assert_eq!(quote("héllo"), "\"héllo\"");
    }

    #[test]
    fn test_install_registers_sources_and_natives() {
        use crate::store::Store;
        let mut store = MemStore::new();
        install(&mut store);
        for (path, _, _) in SOURCES {
            assert!(store.package_source(path).is_some(), "{path} missing");
        }
        assert!(store.get_native("strconv", "Itoa").is_some());
        assert!(store.get_native("strings", "Split").is_some());
        assert!(store.get_native("strings", "Nope").is_none());
    }
}
