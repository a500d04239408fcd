//! Elias-Fano encoding of monotone non-decreasing integer sequences.
//!
//! Each value splits into high bits (unary coded in a bitvector) and low
//! bits (packed array). `select(i)` recovers the i-th value in O(1) word
//! operations. Used to persist sampled row offsets compactly in the index
//! cache.

use velocsv_core::errors::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EliasFano {
    num_elements: u64,
    universe: u64,
    low_bits: u32,
    high_bitvec: Vec<u64>,
    low_array: Vec<u64>,
}

impl EliasFano {
    /// Encode a non-decreasing sequence. `universe` is the exclusive upper
    /// bound on values.
    pub fn encode(values: &[u64], universe: u64) -> Self {
        let mut ef = EliasFano {
            num_elements: values.len() as u64,
            universe,
            ..Default::default()
        };
        if values.is_empty() {
            return ef;
        }

        // low bit width: floor(log2(universe / n)), zero when dense
        if universe > ef.num_elements {
            let ratio = universe / ef.num_elements;
            ef.low_bits = 63 - ratio.leading_zeros();
        }

        if ef.low_bits > 0 {
            let total_low_bits = values.len() * ef.low_bits as usize;
            ef.low_array = vec![0; (total_low_bits + 63) / 64];
            let low_mask = (1u64 << ef.low_bits) - 1;
            for (i, &v) in values.iter().enumerate() {
                set_bits(
                    &mut ef.low_array,
                    i * ef.low_bits as usize,
                    ef.low_bits as usize,
                    v & low_mask,
                );
            }
        }

        // high bits: element i sets bit (high_value + i)
        let max_high = values[values.len() - 1] >> ef.low_bits;
        let high_bits_count = values.len() as u64 + max_high + 1;
        ef.high_bitvec = vec![0; ((high_bits_count + 63) / 64) as usize];
        for (i, &v) in values.iter().enumerate() {
            let pos = (v >> ef.low_bits) as usize + i;
            ef.high_bitvec[pos / 64] |= 1u64 << (pos % 64);
        }

        ef
    }

    /// The i-th value. Panics if `i >= len()` in debug builds.
    pub fn select(&self, i: usize) -> u64 {
        debug_assert!((i as u64) < self.num_elements);
        let pos = self.select1(i);
        let high = (pos - i) as u64;
        let low = if self.low_bits > 0 {
            get_bits(
                &self.low_array,
                i * self.low_bits as usize,
                self.low_bits as usize,
            )
        } else {
            0
        };
        (high << self.low_bits) | low
    }

    /// Position of the (i+1)-th set bit in the high bitvector.
    fn select1(&self, i: usize) -> usize {
        let mut remaining = i as u64;
        for (word_idx, &word) in self.high_bitvec.iter().enumerate() {
            let ones = word.count_ones() as u64;
            if remaining < ones {
                let mut w = word;
                for _ in 0..remaining {
                    w &= w - 1;
                }
                return word_idx * 64 + w.trailing_zeros() as usize;
            }
            remaining -= ones;
        }
        // Unreachable for a well-formed structure with i < num_elements.
        self.high_bitvec.len() * 64
    }

    pub fn len(&self) -> usize {
        self.num_elements as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    pub fn universe(&self) -> u64 {
        self.universe
    }

    pub fn serialized_size(&self) -> usize {
        24 + self.high_bitvec.len() * 8 + self.low_array.len() * 8
    }

    pub fn serialize_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.num_elements.to_le_bytes());
        out.extend_from_slice(&self.universe.to_le_bytes());
        out.extend_from_slice(&self.low_bits.to_le_bytes());
        out.extend_from_slice(&(self.high_bitvec.len() as u32).to_le_bytes());
        for w in &self.high_bitvec {
            out.extend_from_slice(&w.to_le_bytes());
        }
        for w in &self.low_array {
            out.extend_from_slice(&w.to_le_bytes());
        }
    }

    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 24 {
            return Err(Error::ParseError("Elias-Fano header truncated".into()));
        }
        let num_elements = u64::from_le_bytes(bytes[0..8].try_into().unwrap_or_default());
        let universe = u64::from_le_bytes(bytes[8..16].try_into().unwrap_or_default());
        let low_bits = u32::from_le_bytes(bytes[16..20].try_into().unwrap_or_default());
        let high_words = u32::from_le_bytes(bytes[20..24].try_into().unwrap_or_default()) as usize;

        let total_low_bits = num_elements
            .checked_mul(low_bits as u64)
            .ok_or_else(|| Error::ParseError("Elias-Fano header corrupt".into()))?;
        let low_words = if low_bits > 0 {
            ((total_low_bits + 63) / 64) as usize
        } else {
            0
        };
        let need = 24usize
            .checked_add(high_words.checked_mul(8).unwrap_or(usize::MAX))
            .and_then(|n| n.checked_add(low_words.checked_mul(8).unwrap_or(usize::MAX)))
            .unwrap_or(usize::MAX);
        if bytes.len() < need {
            return Err(Error::ParseError("Elias-Fano body truncated".into()));
        }

        let mut cursor = 24;
        let mut read_words = |n: usize, cursor: &mut usize| {
            let mut words = Vec::with_capacity(n);
            for _ in 0..n {
                words.push(u64::from_le_bytes(
                    bytes[*cursor..*cursor + 8].try_into().unwrap_or_default(),
                ));
                *cursor += 8;
            }
            words
        };
        let high_bitvec = read_words(high_words, &mut cursor);
        let low_array = read_words(low_words, &mut cursor);

        Ok((
            EliasFano {
                num_elements,
                universe,
                low_bits,
                high_bitvec,
                low_array,
            },
            cursor,
        ))
    }
}

fn set_bits(words: &mut [u64], bit_pos: usize, width: usize, value: u64) {
    let word_idx = bit_pos / 64;
    let bit_idx = bit_pos % 64;
    words[word_idx] |= value << bit_idx;
    if bit_idx + width > 64 {
        words[word_idx + 1] |= value >> (64 - bit_idx);
    }
}

fn get_bits(words: &[u64], bit_pos: usize, width: usize) -> u64 {
    let word_idx = bit_pos / 64;
    let bit_idx = bit_pos % 64;
    let mask = if width == 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };
    let mut value = words[word_idx] >> bit_idx;
    if bit_idx + width > 64 {
        value |= words[word_idx + 1] << (64 - bit_idx);
    }
    value & mask
}
