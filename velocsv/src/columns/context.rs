//! Devirtualized typed append path.
//!
//! The chunk driver's inner loop appends one field per column per row. An
//! enum match per value would re-dispatch on the column type every time, so
//! each column instead gets a small plain record: raw pointers to its value
//! buffer and null bitmap plus two function pointers bound to the column's
//! type. The record is built once per chunk, before the row loop, and must
//! not outlive its builder (the lifetime parameter enforces that).

use std::marker::PhantomData;

use velocsv_scan::atoi;

use super::{builder::ColumnBuilder, NullBitmap, StringBuffer};
use crate::parse::temporal::{parse_date, parse_timestamp};
use crate::parse::ParseConfig;

type AppendFn = unsafe fn(*mut (), *mut NullBitmap, &ParseConfig, &[u8]);
type AppendNullFn = unsafe fn(*mut (), *mut NullBitmap);

pub struct AppendContext<'a> {
    values: *mut (),
    nulls: *mut NullBitmap,
    cfg: &'a ParseConfig,
    append_fn: AppendFn,
    append_null_fn: AppendNullFn,
    _builder: PhantomData<&'a mut ColumnBuilder>,
}

impl<'a> AppendContext<'a> {
    pub fn new(builder: &'a mut ColumnBuilder, cfg: &'a ParseConfig) -> Self {
        let (values, nulls, append_fn, append_null_fn): (
            *mut (),
            *mut NullBitmap,
            AppendFn,
            AppendNullFn,
        ) = match builder {
            ColumnBuilder::Int32 { values, nulls } => (
                values as *mut Vec<i32> as *mut (),
                nulls as *mut NullBitmap,
                append_int32,
                append_null_int32,
            ),
            ColumnBuilder::Int64 { values, nulls } => (
                values as *mut Vec<i64> as *mut (),
                nulls as *mut NullBitmap,
                append_int64,
                append_null_int64,
            ),
            ColumnBuilder::Float64 { values, nulls } => (
                values as *mut Vec<f64> as *mut (),
                nulls as *mut NullBitmap,
                append_float64,
                append_null_float64,
            ),
            ColumnBuilder::Bool { values, nulls } => (
                values as *mut Vec<u8> as *mut (),
                nulls as *mut NullBitmap,
                append_bool,
                append_null_bool,
            ),
            ColumnBuilder::Date { values, nulls } => (
                values as *mut Vec<i32> as *mut (),
                nulls as *mut NullBitmap,
                append_date,
                append_null_date,
            ),
            ColumnBuilder::Timestamp { values, nulls } => (
                values as *mut Vec<i64> as *mut (),
                nulls as *mut NullBitmap,
                append_timestamp,
                append_null_timestamp,
            ),
            ColumnBuilder::Str { strings, nulls } => (
                strings as *mut StringBuffer as *mut (),
                nulls as *mut NullBitmap,
                append_string,
                append_null_string,
            ),
        };
        Self {
            values,
            nulls,
            cfg,
            append_fn,
            append_null_fn,
            _builder: PhantomData,
        }
    }

    #[inline]
    pub fn append(&mut self, field: &[u8]) {
        // SAFETY: `values`/`nulls` point into the builder this context
        // mutably borrows for 'a, and each append function casts `values`
        // back to the exact type it was created from.
        unsafe { (self.append_fn)(self.values, self.nulls, self.cfg, field) }
    }

    #[inline]
    pub fn append_null(&mut self) {
        // SAFETY: as in `append`.
        unsafe { (self.append_null_fn)(self.values, self.nulls) }
    }
}

// SAFETY: the context is a unique borrow of one builder; moving it to
// another thread moves the borrow with it.
unsafe impl Send for AppendContext<'_> {}

// ---------------------------------------------------------------------------
// Typed append implementations. Failed parses store the type sentinel and
// mark the slot null.
// ---------------------------------------------------------------------------

unsafe fn append_int32(values: *mut (), nulls: *mut NullBitmap, _cfg: &ParseConfig, field: &[u8]) {
    let values = &mut *(values as *mut Vec<i32>);
    let nulls = &mut *nulls;
    match atoi::parse_i32(field) {
        Some(v) => {
            values.push(v);
            nulls.push_valid();
        }
        None => {
            values.push(0);
            nulls.push_null();
        }
    }
}

unsafe fn append_null_int32(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut Vec<i32>)).push(0);
    (*nulls).push_null();
}

unsafe fn append_int64(values: *mut (), nulls: *mut NullBitmap, _cfg: &ParseConfig, field: &[u8]) {
    let values = &mut *(values as *mut Vec<i64>);
    let nulls = &mut *nulls;
    match atoi::parse_i64(field) {
        Some(v) => {
            values.push(v);
            nulls.push_valid();
        }
        None => {
            values.push(0);
            nulls.push_null();
        }
    }
}

unsafe fn append_null_int64(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut Vec<i64>)).push(0);
    (*nulls).push_null();
}

unsafe fn append_float64(
    values: *mut (),
    nulls: *mut NullBitmap,
    _cfg: &ParseConfig,
    field: &[u8],
) {
    let values = &mut *(values as *mut Vec<f64>);
    let nulls = &mut *nulls;
    let parsed = std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse::<f64>().ok());
    match parsed {
        Some(v) => {
            values.push(v);
            nulls.push_valid();
        }
        None => {
            values.push(f64::NAN);
            nulls.push_null();
        }
    }
}

unsafe fn append_null_float64(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut Vec<f64>)).push(f64::NAN);
    (*nulls).push_null();
}

unsafe fn append_bool(values: *mut (), nulls: *mut NullBitmap, cfg: &ParseConfig, field: &[u8]) {
    let values = &mut *(values as *mut Vec<u8>);
    let nulls = &mut *nulls;
    if cfg.bools.is_true(field) {
        values.push(1);
        nulls.push_valid();
    } else if cfg.bools.is_false(field) {
        values.push(0);
        nulls.push_valid();
    } else {
        values.push(0);
        nulls.push_null();
    }
}

unsafe fn append_null_bool(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut Vec<u8>)).push(0);
    (*nulls).push_null();
}

unsafe fn append_date(values: *mut (), nulls: *mut NullBitmap, _cfg: &ParseConfig, field: &[u8]) {
    let values = &mut *(values as *mut Vec<i32>);
    let nulls = &mut *nulls;
    match parse_date(field) {
        Some(days) => {
            values.push(days);
            nulls.push_valid();
        }
        None => {
            values.push(0);
            nulls.push_null();
        }
    }
}

unsafe fn append_null_date(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut Vec<i32>)).push(0);
    (*nulls).push_null();
}

unsafe fn append_timestamp(
    values: *mut (),
    nulls: *mut NullBitmap,
    _cfg: &ParseConfig,
    field: &[u8],
) {
    let values = &mut *(values as *mut Vec<i64>);
    let nulls = &mut *nulls;
    match parse_timestamp(field) {
        Some(micros) => {
            values.push(micros);
            nulls.push_valid();
        }
        None => {
            values.push(0);
            nulls.push_null();
        }
    }
}

unsafe fn append_null_timestamp(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut Vec<i64>)).push(0);
    (*nulls).push_null();
}

unsafe fn append_string(values: *mut (), nulls: *mut NullBitmap, _cfg: &ParseConfig, field: &[u8]) {
    (*(values as *mut StringBuffer)).push(field);
    (*nulls).push_valid();
}

unsafe fn append_null_string(values: *mut (), nulls: *mut NullBitmap) {
    (*(values as *mut StringBuffer)).push_empty();
    (*nulls).push_null();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CsvOptions;
    use crate::schema::DataType;
    use arrow_array::{Array, Float64Array, Int32Array, StringArray};

    fn cfg() -> ParseConfig {
        ParseConfig::from_options(&CsvOptions::default())
    }

    #[test]
    fn int32_appends_and_null_sentinels() {
        let cfg = cfg();
        let mut b = ColumnBuilder::create(DataType::Int32);
        {
            let mut ctx = AppendContext::new(&mut b, &cfg);
            ctx.append(b"10");
            ctx.append(b"oops");
            ctx.append_null();
            ctx.append(b"-3");
        }
        let arr = b.finalize().unwrap();
        let arr = arr.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.value(0), 10);
        assert!(arr.is_null(1));
        assert!(arr.is_null(2));
        assert_eq!(arr.value(3), -3);
    }

    #[test]
    fn float_parses_exponent_and_nan_sentinel() {
        let cfg = cfg();
        let mut b = ColumnBuilder::create(DataType::Float64);
        {
            let mut ctx = AppendContext::new(&mut b, &cfg);
            ctx.append(b"1.5e3");
            ctx.append(b"bad");
        }
        let arr = b.finalize().unwrap();
        let arr = arr.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(arr.value(0), 1500.0);
        assert!(arr.is_null(1));
    }

    #[test]
    fn bool_uses_configured_word_lists() {
        let opts = CsvOptions::builder()
            .set_true_values("on")
            .set_false_values("off")
            .build();
        let cfg = ParseConfig::from_options(&opts);
        let mut b = ColumnBuilder::create(DataType::Bool);
        {
            let mut ctx = AppendContext::new(&mut b, &cfg);
            ctx.append(b"on");
            ctx.append(b"off");
            ctx.append(b"true"); // not in the configured list
        }
        assert_eq!(b.len(), 3);
        assert_eq!(b.null_count(), 1);
    }

    #[test]
    fn string_appends() {
        let cfg = cfg();
        let mut b = ColumnBuilder::create(DataType::String);
        {
            let mut ctx = AppendContext::new(&mut b, &cfg);
            ctx.append(b"a");
            ctx.append_null();
            ctx.append(b"bc");
        }
        let arr = b.finalize().unwrap();
        let arr = arr.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(arr.value(0), "a");
        assert!(arr.is_null(1));
        assert_eq!(arr.value(2), "bc");
    }

    #[test]
    fn date_and_timestamp_parse() {
        let cfg = cfg();
        let mut d = ColumnBuilder::create(DataType::Date);
        {
            let mut ctx = AppendContext::new(&mut d, &cfg);
            ctx.append(b"1970-01-02");
            ctx.append(b"not a date");
        }
        assert_eq!(d.null_count(), 1);

        let mut t = ColumnBuilder::create(DataType::Timestamp);
        {
            let mut ctx = AppendContext::new(&mut t, &cfg);
            ctx.append(b"1970-01-01T00:00:01Z");
            ctx.append(b"nope");
        }
        assert_eq!(t.null_count(), 1);
    }
}
