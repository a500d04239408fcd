//! Sampled type inference.
//!
//! Reads up to `sample_rows` rows from the post-header region with the
//! single-threaded field iterator and folds each observed value's
//! classification into a per-column running type through the promotion
//! lattice. Null-matching and empty values contribute nothing.

use velocsv_scan::{atoi, SplitFields};

use crate::options::CsvOptions;
use crate::parse::temporal::{parse_date, parse_timestamp};
use crate::parse::ParseConfig;
use crate::schema::{wider_type, DataType};

pub struct TypeInference<'a> {
    opts: &'a CsvOptions,
    cfg: &'a ParseConfig,
}

impl<'a> TypeInference<'a> {
    pub fn new(opts: &'a CsvOptions, cfg: &'a ParseConfig) -> Self {
        Self { opts, cfg }
    }

    /// Classify one non-null field by the tightest accepting parser.
    pub fn infer_field(&self, value: &[u8]) -> DataType {
        if self.cfg.bools.is_true(value) || self.cfg.bools.is_false(value) {
            return DataType::Bool;
        }
        if atoi::parse_i32(value).is_some() {
            return DataType::Int32;
        }
        if atoi::parse_i64(value).is_some() {
            return DataType::Int64;
        }
        if let Ok(s) = std::str::from_utf8(value) {
            if s.parse::<f64>().is_ok() {
                return DataType::Float64;
            }
        }
        if parse_date(value).is_some() {
            return DataType::Date;
        }
        if parse_timestamp(value).is_some() {
            return DataType::Timestamp;
        }
        DataType::String
    }

    /// Infer column types from the leading rows of the data region.
    /// Columns that never see a typed value come back as String.
    pub fn infer_from_sample(&self, data: &[u8], n_columns: usize) -> Vec<DataType> {
        let mut types = vec![DataType::Null; n_columns];
        let quote = self.opts.quote;
        let mut offset = 0usize;
        let mut rows_seen = 0usize;

        while offset < data.len() && rows_seen < self.opts.sample_rows {
            // Skip empty lines the same way the parser will.
            while offset < data.len() && (data[offset] == b'\n' || data[offset] == b'\r') {
                offset += 1;
            }
            if offset >= data.len() {
                break;
            }

            let remaining = data.len() - offset;
            let mut iter = SplitFields::new(
                &data[offset..],
                self.opts.separator,
                quote,
                b'\n',
            );
            let mut col_idx = 0usize;
            for (mut field, needs_escaping) in iter.by_ref() {
                if col_idx >= n_columns {
                    break;
                }
                if field.last() == Some(&b'\r') {
                    field = &field[..field.len() - 1];
                }
                if needs_escaping
                    && field.len() >= 2
                    && field[0] == quote
                    && field[field.len() - 1] == quote
                {
                    field = &field[1..field.len() - 1];
                }
                if !field.is_empty() && !self.cfg.nulls.is_null(field) {
                    types[col_idx] = wider_type(types[col_idx], self.infer_field(field));
                }
                col_idx += 1;
            }
            offset += remaining - iter.remaining();
            rows_seen += 1;
        }

        for t in types.iter_mut() {
            if *t == DataType::Null {
                *t = DataType::String;
            }
        }
        types
    }
}
