//! Basic literal parsing
//!
//! Literal text stays in the tree until it is turned into an untyped
//! constant, either by the preprocessor or inline by the evaluator.

use super::{TypedValue, Value};
use crate::ast::LitKind;
use crate::types::{PrimitiveType, Types};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Num;
use std::str::FromStr;

/// Parses the text of a basic literal into an untyped constant.
pub fn parse_basic_lit(types: &Types, kind: LitKind, text: &str) -> Result<TypedValue, String> {
    match kind {
        LitKind::Int => {
            let b = parse_int_lit(text)?;
            Ok(TypedValue::new(
                types.prim(PrimitiveType::UntypedBigint),
                Value::bigint(b),
            ))
        }
        LitKind::Float => {
            let d = parse_float_lit(text)?;
            Ok(TypedValue::new(
                types.prim(PrimitiveType::UntypedBigdec),
                Value::bigdec(d),
            ))
        }
        LitKind::Imag => Err(format!("imaginary literal {text} is not supported")),
        LitKind::Char => {
            let c = unquote_char(text)?;
            Ok(TypedValue::new(
                types.prim(PrimitiveType::UntypedRune),
                Value::Int(c as i64),
            ))
        }
        LitKind::String => {
            let s = unquote_string(text)?;
            Ok(TypedValue::new(
                types.prim(PrimitiveType::UntypedString),
                Value::string(&s),
            ))
        }
    }
}

/// Parses an integer literal, detecting the base from its prefix:
/// `0b`/`0B` binary, `0o`/`0O` or a bare leading `0` octal, `0x`/`0X` hex.
pub fn parse_int_lit(text: &str) -> Result<BigInt, String> {
    let invalid = || format!("invalid integer constant: {text}");
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let (radix, digits) = if let Some(rest) = strip_prefix2(&clean, "0x", "0X") {
        (16, rest)
    } else if let Some(rest) = strip_prefix2(&clean, "0b", "0B") {
        (2, rest)
    } else if let Some(rest) = strip_prefix2(&clean, "0o", "0O") {
        (8, rest)
    } else if clean.len() > 1 && clean.starts_with('0') {
        (8, &clean[1..])
    } else {
        (10, clean.as_str())
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    BigInt::from_str_radix(digits, radix).map_err(|_| invalid())
}

fn strip_prefix2<'a>(s: &'a str, a: &str, b: &str) -> Option<&'a str> {
    s.strip_prefix(a).or_else(|| s.strip_prefix(b))
}

/// Parses a decimal or hexadecimal floating point literal exactly.
pub fn parse_float_lit(text: &str) -> Result<BigDecimal, String> {
    let invalid = || format!("invalid float constant: {text}");
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = strip_prefix2(&clean, "0x", "0X") {
        return parse_hex_float(hex).ok_or_else(invalid);
    }
    let mut s = clean;
    if s.starts_with('.') {
        s.insert(0, '0');
    }
    if let Some(pos) = s.find('.') {
        let next = s[pos + 1..].chars().next();
        if !next.is_some_and(|c| c.is_ascii_digit()) {
            s.insert(pos + 1, '0');
        }
    }
    BigDecimal::from_str(&s).map_err(|_| invalid())
}

fn parse_hex_float(s: &str) -> Option<BigDecimal> {
    let (mantissa, exp) = match s.find(['p', 'P']) {
        Some(i) => (&s[..i], s[i + 1..].parse::<i64>().ok()?),
        None => (s, 0),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(i) => (&mantissa[..i], &mantissa[i + 1..]),
        None => (mantissa, ""),
    };
    let digits = format!("{int_part}{frac_part}");
    if digits.is_empty() {
        return None;
    }
    let m = BigInt::from_str_radix(&digits, 16).ok()?;
    let exp = exp - 4 * frac_part.len() as i64;
    if exp >= 0 {
        Some(BigDecimal::from(m << exp as usize))
    } else {
        // m / 2^k == m * 5^k / 10^k
        let k = (-exp) as u32;
        let scaled = m * num_traits::pow(BigInt::from(5), k as usize);
        Some(BigDecimal::new(scaled, k as i64))
    }
}

/// Unquotes a rune literal including its single quotes.
pub fn unquote_char(text: &str) -> Result<char, String> {
    let inner = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or_else(|| format!("invalid rune literal {text}"))?;
    let mut out = Vec::new();
    let mut chars = inner.chars().peekable();
    let mut count = 0;
    while let Some(c) = chars.next() {
        count += 1;
        if c == '\\' {
            match unescape(&mut chars, '\'')? {
                Unescaped::Char(c) => out.push(c),
                Unescaped::Byte(b) => out.push(b as char),
            }
        } else {
            out.push(c);
        }
    }
    match (count, out.as_slice()) {
        (1, [c]) => Ok(*c),
        _ => Err(format!("invalid rune literal {text}")),
    }
}

/// Unquotes an interpreted (`"..."`) or raw (`` `...` ``) string literal.
pub fn unquote_string(text: &str) -> Result<String, String> {
    if let Some(raw) = text.strip_prefix('`').and_then(|s| s.strip_suffix('`')) {
        return Ok(raw.replace('\r', ""));
    }
    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| format!("invalid string literal {text}"))?;
    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match unescape(&mut chars, '"')? {
                Unescaped::Char(c) => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
                Unescaped::Byte(b) => bytes.push(b),
            }
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

enum Unescaped {
    Char(char),
    Byte(u8),
}

fn unescape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) -> Result<Unescaped, String> {
    let c = chars.next().ok_or("escape sequence not terminated")?;
    let simple = match c {
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\x0b',
        '\\' => '\\',
        q if q == quote => q,
        'x' => return Ok(Unescaped::Byte(read_hex(chars, c, 2)? as u8)),
        'u' => {
            let v = read_hex(chars, c, 4)?;
            return char::from_u32(v)
                .map(Unescaped::Char)
                .ok_or_else(|| "escape sequence is invalid Unicode code point".to_string());
        }
        'U' => {
            let v = read_hex(chars, c, 8)?;
            return char::from_u32(v)
                .map(Unescaped::Char)
                .ok_or_else(|| "escape sequence is invalid Unicode code point".to_string());
        }
        '0'..='7' => {
            let mut v = c.to_digit(8).unwrap_or(0);
            for _ in 0..2 {
                let d = chars
                    .next()
                    .and_then(|d| d.to_digit(8))
                    .ok_or("invalid octal escape")?;
                v = v * 8 + d;
            }
            if v > 255 {
                return Err("octal escape value > 255".to_string());
            }
            return Ok(Unescaped::Byte(v as u8));
        }
        other => return Err(format!("unknown escape sequence \\{other}")),
    };
    Ok(Unescaped::Char(simple))
}

fn read_hex(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, c: char, n: usize) -> Result<u32, String> {
    let digits: String = (0..n).filter_map(|_| chars.next()).collect();
    if digits.len() != n {
        return Err("escape sequence not terminated".to_string());
    }
    u32::from_str_radix(&digits, 16).map_err(|_| format!("invalid escape \\{c}{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ====================================================================
    // Integers
    // ====================================================================

    #[test]
    fn test_int_bases() {
        for text in ["42", "0b101010", "0B101010", "0o52", "0O52", "052", "0x2a", "0X2A", "4_2"] {
            assert_eq!(parse_int_lit(text).unwrap(), BigInt::from(42), "{text}");
        }
        assert_eq!(parse_int_lit("0").unwrap(), BigInt::from(0));
    }

    #[test]
    fn test_int_invalid() {
        for text in ["0b", "0bXXXX", "42b0", "0x", "09", "0o8"] {
            let err = parse_int_lit(text).unwrap_err();
            assert!(err.contains(text), "{err}");
        }
    }

    #[test]
    fn test_int_arbitrary_precision() {
        let b = parse_int_lit("0xFFFFFFFFFFFFFFFFFFFF").unwrap();
        assert_eq!(b.to_string(), "1208925819614629174706175");
    }

    // ====================================================================
    // Floats
    // ====================================================================

    #[test]
    fn test_decimal_floats() {
        assert_eq!(parse_float_lit("1.5").unwrap(), BigDecimal::from_str("1.5").unwrap());
        assert_eq!(parse_float_lit(".25").unwrap(), BigDecimal::from_str("0.25").unwrap());
        assert_eq!(parse_float_lit("3.").unwrap(), BigDecimal::from(3));
        assert_eq!(parse_float_lit("1e3").unwrap(), BigDecimal::from(1000));
    }

    #[test]
    fn test_hex_floats_are_exact() {
        assert_eq!(parse_float_lit("0x1p-2").unwrap(), BigDecimal::from_str("0.25").unwrap());
        assert_eq!(parse_float_lit("0x1.8p1").unwrap(), BigDecimal::from(3));
        assert_eq!(parse_float_lit("0X10p0").unwrap(), BigDecimal::from(16));
    }

    // ====================================================================
    // Runes and strings
    // ====================================================================

    #[test]
    fn test_unquote_char() {
        assert_eq!(unquote_char("'a'").unwrap(), 'a');
        assert_eq!(unquote_char(r"'\n'").unwrap(), '\n');
        assert_eq!(unquote_char(r"'\x41'").unwrap(), 'A');
        assert_eq!(unquote_char(r"'é'").unwrap(), 'é');
        assert_eq!(unquote_char(r"'\101'").unwrap(), 'A');
        assert_eq!(unquote_char(r"'\''").unwrap(), '\'');
        assert!(unquote_char("'ab'").is_err());
    }

    #[test]
    fn test_unquote_string() {
        assert_eq!(unquote_string(r#""a\tb\"c""#).unwrap(), "a\tb\"c");
        assert_eq!(unquote_string("`raw\\n`").unwrap(), "raw\\n");
        assert_eq!(unquote_string(r#""日本""#).unwrap(), "日本");
        assert!(unquote_string(r#""\q""#).is_err());
    }
}
