//! Field iterator for a single row.
//!
//! `SplitFields` walks one row of bytes and yields `(field, needs_escaping)`
//! pairs until it consumes an unquoted line terminator or runs out of input.
//! Long fields are scanned 64 bytes at a time; every boundary found in a
//! scanned block is kept in `previous_valid_ends` so later `next()` calls
//! pop boundaries from the cached mask instead of re-scanning.

use crate::block::{eq2_mask, eq_mask, BLOCK_LEN};
use crate::quote_parity::prefix_xorsum_inclusive;

pub struct SplitFields<'a> {
    v: &'a [u8],
    separator: u8,
    quote: u8,
    eol: u8,
    quoting: bool,
    finished: bool,
    finished_inside_quote: bool,
    /// Boundary mask left over from the last 64-byte scan, relative to the
    /// current start of `v`.
    previous_valid_ends: u64,
}

impl<'a> SplitFields<'a> {
    pub fn new(slice: &'a [u8], separator: u8, quote: u8, eol: u8) -> Self {
        Self {
            v: slice,
            separator,
            quote,
            eol,
            quoting: quote != 0,
            finished: false,
            finished_inside_quote: false,
            previous_valid_ends: 0,
        }
    }

    /// Bytes not yet consumed. The row driver uses this to advance its
    /// offset past the terminator the iterator swallowed.
    pub fn remaining(&self) -> usize {
        self.v.len()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// True when input ended while still inside an unclosed quoted field.
    pub fn finished_inside_quote(&self) -> bool {
        self.finished_inside_quote
    }

    fn finish_eol(&mut self, pos: usize, needs_escaping: bool) -> Option<(&'a [u8], bool)> {
        self.finished = true;
        let v = self.v;
        self.v = &v[pos + 1..];
        Some((&v[..pos], needs_escaping))
    }

    fn finish(&mut self, needs_escaping: bool) -> Option<(&'a [u8], bool)> {
        self.finished = true;
        // A quoted field that starts and ends with the quote byte closed
        // properly; anything else that began quoted ran off the end of input.
        if needs_escaping
            && !(self.v.len() >= 2
                && self.v[0] == self.quote
                && self.v[self.v.len() - 1] == self.quote)
        {
            self.finished_inside_quote = true;
        }
        let v = self.v;
        self.v = &v[v.len()..];
        Some((v, needs_escaping))
    }

    fn scan_quoted_field(&mut self) -> usize {
        let mut total_idx = 0usize;
        let mut not_in_field_previous_iter = true;

        while self.v.len() - total_idx > BLOCK_LEN {
            let bytes = &self.v[total_idx..];

            let sep_mask = eq_mask(bytes, self.separator);
            let eol_mask = eq_mask(bytes, self.eol);
            let quote_mask = eq_mask(bytes, self.quote);

            let mut end_mask = sep_mask | eol_mask;

            let mut not_in_quote_field = prefix_xorsum_inclusive(quote_mask);
            if not_in_field_previous_iter {
                not_in_quote_field = !not_in_quote_field;
            }
            not_in_field_previous_iter = not_in_quote_field & (1u64 << (BLOCK_LEN - 1)) != 0;
            end_mask &= not_in_quote_field;

            if end_mask != 0 {
                let pos = end_mask.trailing_zeros() as usize;
                total_idx += pos;
                self.previous_valid_ends = if pos == BLOCK_LEN - 1 {
                    0
                } else {
                    end_mask >> (pos + 1)
                };
                return total_idx;
            }
            total_idx += BLOCK_LEN;
        }

        // Scalar tail
        let mut in_field = !not_in_field_previous_iter;
        for (i, &c) in self.v[total_idx..].iter().enumerate() {
            if c == self.quote {
                in_field = !in_field;
            }
            if !in_field && (c == self.separator || c == self.eol) {
                return total_idx + i;
            }
        }
        self.v.len()
    }

    fn scan_unquoted_field(&mut self) -> usize {
        let mut total_idx = 0usize;

        while self.v.len() - total_idx > BLOCK_LEN {
            let bytes = &self.v[total_idx..];
            let end_mask = eq2_mask(bytes, self.separator, self.eol);

            if end_mask != 0 {
                let pos = end_mask.trailing_zeros() as usize;
                total_idx += pos;
                self.previous_valid_ends = if pos == BLOCK_LEN - 1 {
                    0
                } else {
                    end_mask >> (pos + 1)
                };
                return total_idx;
            }
            total_idx += BLOCK_LEN;
        }

        // Scalar tail
        for (i, &c) in self.v[total_idx..].iter().enumerate() {
            if c == self.separator || c == self.eol {
                return total_idx + i;
            }
        }
        self.v.len()
    }
}

impl<'a> Iterator for SplitFields<'a> {
    type Item = (&'a [u8], bool);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        // Hot path: pop the next boundary from the cached mask.
        if self.previous_valid_ends != 0 {
            let pos = self.previous_valid_ends.trailing_zeros() as usize;
            self.previous_valid_ends = if pos >= 63 {
                0
            } else {
                self.previous_valid_ends >> (pos + 1)
            };

            let needs_escaping = self.quoting && !self.v.is_empty() && self.v[0] == self.quote;

            if self.v[pos] == self.eol {
                return self.finish_eol(pos, needs_escaping);
            }

            let v = self.v;
            self.v = &v[pos + 1..];
            return Some((&v[..pos], needs_escaping));
        }

        if self.v.is_empty() {
            return self.finish(false);
        }

        let mut needs_escaping = false;
        let pos = if self.quoting && self.v[0] == self.quote {
            needs_escaping = true;
            self.scan_quoted_field()
        } else {
            self.scan_unquoted_field()
        };

        if pos >= self.v.len() {
            return self.finish(needs_escaping);
        }

        if self.v[pos] == self.eol {
            return self.finish_eol(pos, needs_escaping);
        }

        let v = self.v;
        self.v = &v[pos + 1..];
        Some((&v[..pos], needs_escaping))
    }
}
