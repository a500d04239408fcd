//! Fast integer parsing for the typed append path.
//!
//! `atoi_simd` handles the common short-digit cases with vectorized
//! validation; the scalar routines are the reference used by tests and the
//! behavioral contract: optional sign, decimal digits only, full-field
//! match, overflow rejected.

/// Parse a complete field as `i32`. Leading `+` is accepted.
#[inline]
pub fn parse_i32(bytes: &[u8]) -> Option<i32> {
    let bytes = strip_plus(bytes)?;
    atoi_simd::parse::<i32>(bytes).ok()
}

/// Parse a complete field as `i64`. Leading `+` is accepted.
#[inline]
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let bytes = strip_plus(bytes)?;
    atoi_simd::parse::<i64>(bytes).ok()
}

#[inline]
fn strip_plus(bytes: &[u8]) -> Option<&[u8]> {
    match bytes {
        [] => None,
        [b'+', rest @ ..] => {
            if rest.is_empty() {
                None
            } else {
                Some(rest)
            }
        }
        _ => Some(bytes),
    }
}

/// Scalar reference parser.
pub fn parse_i64_scalar(bytes: &[u8]) -> Option<i64> {
    let bytes = strip_plus(bytes)?;
    let (negative, digits) = match bytes {
        [b'-', rest @ ..] => (true, rest),
        _ => (false, bytes),
    };
    if digits.is_empty() || digits.len() > 19 {
        return None;
    }
    let mut acc: u64 = 0;
    for &b in digits {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        acc = acc.checked_mul(10)?.checked_add(d as u64)?;
    }
    if negative {
        if acc > i64::MAX as u64 + 1 {
            return None;
        }
        Some((acc as i64).wrapping_neg())
    } else {
        if acc > i64::MAX as u64 {
            return None;
        }
        Some(acc as i64)
    }
}

/// Scalar reference parser for `i32`.
pub fn parse_i32_scalar(bytes: &[u8]) -> Option<i32> {
    let v = parse_i64_scalar(bytes)?;
    i32::try_from(v).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_integers() {
        assert_eq!(parse_i32(b"0"), Some(0));
        assert_eq!(parse_i32(b"42"), Some(42));
        assert_eq!(parse_i32(b"-17"), Some(-17));
        assert_eq!(parse_i32(b"+8"), Some(8));
        assert_eq!(parse_i32(b"2147483647"), Some(i32::MAX));
        assert_eq!(parse_i32(b"-2147483648"), Some(i32::MIN));
    }

    #[test]
    fn rejects_non_integers() {
        assert_eq!(parse_i32(b""), None);
        assert_eq!(parse_i32(b"+"), None);
        assert_eq!(parse_i32(b"-"), None);
        assert_eq!(parse_i32(b"12.5"), None);
        assert_eq!(parse_i32(b"1e3"), None);
        assert_eq!(parse_i32(b" 1"), None);
        assert_eq!(parse_i32(b"1 "), None);
        assert_eq!(parse_i32(b"abc"), None);
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(parse_i32(b"2147483648"), None);
        assert_eq!(parse_i32(b"-2147483649"), None);
        assert_eq!(parse_i64(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64(b"-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_i64(b"9223372036854775808"), None);
    }

    #[test]
    fn i64_range() {
        assert_eq!(parse_i64(b"4294967296"), Some(1i64 << 32));
        assert_eq!(parse_i64(b"-4294967296"), Some(-(1i64 << 32)));
    }

    #[test]
    fn matches_scalar_reference() {
        let cases: &[&[u8]] = &[
            b"0",
            b"1",
            b"-1",
            b"+123",
            b"999999999",
            b"1000000000",
            b"2147483647",
            b"2147483648",
            b"-2147483648",
            b"9223372036854775807",
            b"9223372036854775808",
            b"-9223372036854775808",
            b"00123",
            b"12a",
            b"",
            b"-",
        ];
        for &c in cases {
            assert_eq!(
                parse_i64(c),
                parse_i64_scalar(c),
                "field {:?}",
                String::from_utf8_lossy(c)
            );
            assert_eq!(
                parse_i32(c),
                parse_i32_scalar(c),
                "field {:?}",
                String::from_utf8_lossy(c)
            );
        }
    }
}
