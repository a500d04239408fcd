//! Arrow-layout column storage.

pub mod builder;
pub mod context;

pub use builder::ColumnBuilder;
pub use context::AppendContext;

use velocsv_core::util::bit_util::bytes_for_bits;

/// Packed validity bitmap, Arrow convention: bit set = valid.
///
/// Lazily materialized: while no null has been seen only a length counter is
/// kept, so the all-valid hot path never touches bitmap memory. The first
/// null backfills an all-valid prefix.
#[derive(Clone, Debug, Default)]
pub struct NullBitmap {
    data: Vec<u8>,
    len: usize,
    null_count: usize,
    has_nulls: bool,
}

impl NullBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push_valid(&mut self) {
        if !self.has_nulls {
            self.len += 1;
            return;
        }
        self.push_valid_slow();
    }

    #[cold]
    fn push_valid_slow(&mut self) {
        let byte_idx = self.len / 8;
        let bit_idx = self.len % 8;
        if byte_idx >= self.data.len() {
            self.data.push(0);
        }
        self.data[byte_idx] |= 1 << bit_idx;
        self.len += 1;
    }

    pub fn push_null(&mut self) {
        if !self.has_nulls {
            // Backfill: every prior position was valid.
            self.data = vec![0xFF; bytes_for_bits(self.len)];
            self.has_nulls = true;
        }
        let byte_idx = self.len / 8;
        let bit_idx = self.len % 8;
        if byte_idx >= self.data.len() {
            self.data.push(0);
        } else {
            // The backfill may have pre-set this bit.
            self.data[byte_idx] &= !(1 << bit_idx);
        }
        self.len += 1;
        self.null_count += 1;
    }

    #[inline]
    pub fn push(&mut self, valid: bool) {
        if valid {
            self.push_valid();
        } else {
            self.push_null();
        }
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        if !self.has_nulls {
            return true;
        }
        self.data[idx / 8] & (1 << (idx % 8)) != 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn null_count(&self) -> usize {
        if self.has_nulls {
            self.null_count
        } else {
            0
        }
    }

    pub fn has_nulls(&self) -> bool {
        self.has_nulls
    }

    pub fn append_from(&mut self, other: &NullBitmap) {
        if other.len == 0 {
            return;
        }
        if !other.has_nulls {
            if !self.has_nulls {
                self.len += other.len;
            } else {
                for _ in 0..other.len {
                    self.push_valid();
                }
            }
        } else {
            for i in 0..other.len {
                self.push(other.is_valid(i));
            }
        }
    }

    /// Convert into an Arrow null buffer; `None` when every value is valid.
    pub fn into_arrow(self) -> Option<arrow_buffer::NullBuffer> {
        if !self.has_nulls {
            return None;
        }
        let buffer = arrow_buffer::Buffer::from_vec(self.data);
        let bits = arrow_buffer::BooleanBuffer::new(buffer, 0, self.len);
        Some(arrow_buffer::NullBuffer::new(bits))
    }
}

/// Contiguous string storage: one data buffer plus n+1 offsets.
///
/// `offsets[0] == 0`, offsets are monotone non-decreasing, and string i
/// occupies `data[offsets[i]..offsets[i+1]]`. Offsets are i32 to match the
/// Arrow Utf8 layout.
#[derive(Clone, Debug)]
pub struct StringBuffer {
    data: Vec<u8>,
    offsets: Vec<i32>,
}

impl Default for StringBuffer {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            offsets: vec![0],
        }
    }
}

impl StringBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve(&mut self, n_strings: usize, estimated_total_len: usize) {
        self.offsets.reserve(n_strings);
        if estimated_total_len > 0 {
            self.data.reserve(estimated_total_len);
        }
    }

    #[inline]
    pub fn push(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
        self.offsets.push(self.data.len() as i32);
    }

    /// Append an empty slot without copying (used for nulls).
    #[inline]
    pub fn push_empty(&mut self) {
        self.offsets.push(self.data.len() as i32);
    }

    pub fn get(&self, idx: usize) -> &[u8] {
        let start = self.offsets[idx] as usize;
        let end = self.offsets[idx + 1] as usize;
        &self.data[start..end]
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    pub fn append_from(&mut self, other: &StringBuffer) {
        let base = self.data.len() as i32;
        self.data.extend_from_slice(&other.data);
        self.offsets
            .extend(other.offsets.iter().skip(1).map(|&o| o + base));
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<i32>) {
        (self.data, self.offsets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_stays_lazy_while_all_valid() {
        let mut b = NullBitmap::new();
        for _ in 0..100 {
            b.push_valid();
        }
        assert_eq!(b.len(), 100);
        assert_eq!(b.null_count(), 0);
        assert!(!b.has_nulls());
        assert!(b.into_arrow().is_none());
    }

    #[test]
    fn first_null_backfills_valid_prefix() {
        let mut b = NullBitmap::new();
        for _ in 0..10 {
            b.push_valid();
        }
        b.push_null();
        b.push_valid();
        assert_eq!(b.len(), 12);
        assert_eq!(b.null_count(), 1);
        for i in 0..10 {
            assert!(b.is_valid(i));
        }
        assert!(!b.is_valid(10));
        assert!(b.is_valid(11));
    }

    #[test]
    fn null_plus_valid_counts_cover_len() {
        let mut b = NullBitmap::new();
        let pattern = [true, false, true, true, false, false, true];
        for &v in pattern.iter().cycle().take(1000) {
            b.push(v);
        }
        let valid = (0..b.len()).filter(|&i| b.is_valid(i)).count();
        assert_eq!(valid + b.null_count(), b.len());
    }

    #[test]
    fn bitmap_into_arrow() {
        let mut b = NullBitmap::new();
        b.push_valid();
        b.push_null();
        b.push_valid();
        let nb = b.into_arrow().unwrap();
        assert_eq!(nb.len(), 3);
        assert_eq!(nb.null_count(), 1);
        assert!(nb.is_valid(0));
        assert!(!nb.is_valid(1));
        assert!(nb.is_valid(2));
    }

    #[test]
    fn bitmap_append_from() {
        let mut a = NullBitmap::new();
        a.push_valid();
        a.push_valid();
        let mut b = NullBitmap::new();
        b.push_null();
        b.push_valid();
        a.append_from(&b);
        assert_eq!(a.len(), 4);
        assert_eq!(a.null_count(), 1);
        assert!(a.is_valid(0) && a.is_valid(1) && !a.is_valid(2) && a.is_valid(3));
    }

    #[test]
    fn string_buffer_offsets() {
        let mut s = StringBuffer::new();
        s.push(b"ab");
        s.push_empty();
        s.push(b"xyz");
        assert_eq!(s.len(), 3);
        assert_eq!(s.get(0), b"ab");
        assert_eq!(s.get(1), b"");
        assert_eq!(s.get(2), b"xyz");
        let (data, offsets) = s.into_parts();
        assert_eq!(data, b"abxyz");
        assert_eq!(offsets, vec![0, 2, 2, 5]);
    }

    #[test]
    fn string_buffer_append_from() {
        let mut a = StringBuffer::new();
        a.push(b"one");
        let mut b = StringBuffer::new();
        b.push(b"two");
        b.push(b"three");
        a.append_from(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(0), b"one");
        assert_eq!(a.get(1), b"two");
        assert_eq!(a.get(2), b"three");
    }
}
