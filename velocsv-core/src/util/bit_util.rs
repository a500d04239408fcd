/// Returns the ceil of value/divisor.
#[inline]
pub fn ceil<T: num::Integer>(value: T, divisor: T) -> T {
    num::Integer::div_ceil(&value, &divisor)
}

#[inline]
pub fn padding_size(size: usize, alignment: usize) -> usize {
    size.next_multiple_of(alignment) - size
}

/// Number of bytes needed to hold `bits` validity bits.
#[inline]
pub fn bytes_for_bits(bits: usize) -> usize {
    (bits + 7) / 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil() {
        assert_eq!(ceil(10usize, 8), 2);
        assert_eq!(ceil(16usize, 8), 2);
        assert_eq!(ceil(0usize, 8), 0);
    }

    #[test]
    fn test_bytes_for_bits() {
        assert_eq!(bytes_for_bits(0), 0);
        assert_eq!(bytes_for_bits(1), 1);
        assert_eq!(bytes_for_bits(8), 1);
        assert_eq!(bytes_for_bits(9), 2);
        assert_eq!(bytes_for_bits(64), 8);
    }
}
