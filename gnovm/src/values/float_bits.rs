//! Float to integer conversion on IEEE-754 bit patterns
//!
//! The truncation is done with integer arithmetic on the unpacked sign,
//! exponent and mantissa, so the result never depends on how the host
//! converts out-of-range values. Out-of-range inputs follow the software
//! float rules: signed targets get 0 (except exactly -2^63), unsigned
//! targets get 2^63 when the value is at or above 2^64.

const MANT_BITS: u32 = 52;
const EXP_MASK: u64 = 0x7ff;
const BIAS: i32 = 1023;

/// Sign, mantissa with the implicit bit, and unbiased exponent of a finite
/// value. `None` for NaN and infinities.
fn unpack(bits: u64) -> Option<(bool, u64, i32)> {
    let sign = bits >> 63 != 0;
    let exp = ((bits >> MANT_BITS) & EXP_MASK) as i32;
    let mut mant = bits & ((1 << MANT_BITS) - 1);
    match exp {
        0x7ff => None,
        0 => {
            // subnormal: always below 1 in magnitude
            Some((sign, mant, -BIAS))
        }
        _ => {
            mant |= 1 << MANT_BITS;
            Some((sign, mant, exp - BIAS))
        }
    }
}

/// Truncates toward zero. NaN, infinities and magnitudes of 2^63 or more
/// give 0, except -2^63 itself.
pub fn f64_to_i64(x: f64) -> i64 {
    let Some((sign, mant, exp)) = unpack(x.to_bits()) else {
        return 0;
    };
    if exp < 0 {
        return 0;
    }
    if exp > 62 {
        if sign && exp == 63 && mant == 1 << MANT_BITS {
            return i64::MIN;
        }
        return 0;
    }
    let shift = exp - MANT_BITS as i32;
    let mag = if shift >= 0 { mant << shift } else { mant >> -shift };
    let v = mag as i64;
    if sign { -v } else { v }
}

/// Truncates toward zero. Negative values wrap like the signed result;
/// values at or above 2^63 are converted exactly up to 2^64, after which
/// the result is 2^63, as it is for NaN and infinities.
pub fn f64_to_u64(x: f64) -> u64 {
    const TWO_63: u64 = 1 << 63;
    let Some((sign, mant, exp)) = unpack(x.to_bits()) else {
        return TWO_63;
    };
    if sign || exp < 63 {
        return f64_to_i64(x) as u64;
    }
    if exp > 63 {
        return TWO_63;
    }
    // exp == 63: the value is an exact integer in [2^63, 2^64)
    mant << (63 - MANT_BITS as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================
    // Signed
    // ============================================

    #[test]
    fn test_truncates_toward_zero() {
        assert_eq!(f64_to_i64(3.9), 3);
        assert_eq!(f64_to_i64(-3.9), -3);
        assert_eq!(f64_to_i64(0.5), 0);
        assert_eq!(f64_to_i64(-0.0), 0);
        assert_eq!(f64_to_i64(1e15 + 0.5), 1_000_000_000_000_000);
    }

    #[test]
    fn test_large_exact_values() {
        assert_eq!(f64_to_i64(9007199254740993.0), 9007199254740992);
        assert_eq!(f64_to_i64(4611686018427387904.0), 1 << 62);
        assert_eq!(f64_to_i64(-9223372036854775808.0), i64::MIN);
    }

    #[test]
    fn test_signed_out_of_range_is_zero() {
        assert_eq!(f64_to_i64(1e20), 0);
        assert_eq!(f64_to_i64(9223372036854775808.0), 0);
        assert_eq!(f64_to_i64(-1e20), 0);
        assert_eq!(f64_to_i64(f64::INFINITY), 0);
        assert_eq!(f64_to_i64(f64::NAN), 0);
    }

    #[test]
    fn test_subnormal_is_zero() {
        assert_eq!(f64_to_i64(f64::MIN_POSITIVE / 4.0), 0);
    }

    // ============================================
    // Unsigned
    // ============================================

    #[test]
    fn test_unsigned_in_range() {
        assert_eq!(f64_to_u64(42.7), 42);
        assert_eq!(f64_to_u64(9223372036854775808.0), 1 << 63);
        assert_eq!(f64_to_u64(18446744073709549568.0), 18446744073709549568);
    }

    #[test]
    fn test_unsigned_negative_wraps() {
        assert_eq!(f64_to_u64(-1.0), u64::MAX);
    }

    #[test]
    fn test_unsigned_out_of_range() {
        assert_eq!(f64_to_u64(1e20), 1 << 63);
        assert_eq!(f64_to_u64(f64::INFINITY), 1 << 63);
        assert_eq!(f64_to_u64(f64::NAN), 1 << 63);
    }
}
