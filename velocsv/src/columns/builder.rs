//! Per-chunk typed column builders.
//!
//! One builder per column per chunk, built up by exactly one worker and then
//! either merged into a row-group accumulator or finalized into an Arrow
//! array. Null slots keep a type sentinel in the value buffer (0 for
//! integers, NaN for floats) that is never observable as valid.

use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow_buffer::{BooleanBuffer, Buffer, OffsetBuffer, ScalarBuffer};
use velocsv_core::errors::{Error, Result};

use super::{NullBitmap, StringBuffer};
use crate::schema::DataType;

#[derive(Debug)]
pub enum ColumnBuilder {
    Int32 {
        values: Vec<i32>,
        nulls: NullBitmap,
    },
    Int64 {
        values: Vec<i64>,
        nulls: NullBitmap,
    },
    Float64 {
        values: Vec<f64>,
        nulls: NullBitmap,
    },
    Bool {
        values: Vec<u8>,
        nulls: NullBitmap,
    },
    Date {
        values: Vec<i32>,
        nulls: NullBitmap,
    },
    Timestamp {
        values: Vec<i64>,
        nulls: NullBitmap,
    },
    Str {
        strings: StringBuffer,
        nulls: NullBitmap,
    },
}

impl ColumnBuilder {
    pub fn create(dtype: DataType) -> Self {
        match dtype {
            DataType::Int32 => ColumnBuilder::Int32 {
                values: Vec::new(),
                nulls: NullBitmap::new(),
            },
            DataType::Int64 => ColumnBuilder::Int64 {
                values: Vec::new(),
                nulls: NullBitmap::new(),
            },
            DataType::Float64 => ColumnBuilder::Float64 {
                values: Vec::new(),
                nulls: NullBitmap::new(),
            },
            DataType::Bool => ColumnBuilder::Bool {
                values: Vec::new(),
                nulls: NullBitmap::new(),
            },
            DataType::Date => ColumnBuilder::Date {
                values: Vec::new(),
                nulls: NullBitmap::new(),
            },
            DataType::Timestamp => ColumnBuilder::Timestamp {
                values: Vec::new(),
                nulls: NullBitmap::new(),
            },
            // Inference widens residual Null columns to String before
            // builders are created.
            DataType::String | DataType::Null => ColumnBuilder::Str {
                strings: StringBuffer::new(),
                nulls: NullBitmap::new(),
            },
        }
    }

    pub fn dtype(&self) -> DataType {
        match self {
            ColumnBuilder::Int32 { .. } => DataType::Int32,
            ColumnBuilder::Int64 { .. } => DataType::Int64,
            ColumnBuilder::Float64 { .. } => DataType::Float64,
            ColumnBuilder::Bool { .. } => DataType::Bool,
            ColumnBuilder::Date { .. } => DataType::Date,
            ColumnBuilder::Timestamp { .. } => DataType::Timestamp,
            ColumnBuilder::Str { .. } => DataType::String,
        }
    }

    pub fn reserve(&mut self, n: usize) {
        match self {
            ColumnBuilder::Int32 { values, .. } | ColumnBuilder::Date { values, .. } => {
                values.reserve(n)
            }
            ColumnBuilder::Int64 { values, .. } | ColumnBuilder::Timestamp { values, .. } => {
                values.reserve(n)
            }
            ColumnBuilder::Float64 { values, .. } => values.reserve(n),
            ColumnBuilder::Bool { values, .. } => values.reserve(n),
            // Assume short strings; the data buffer grows on demand.
            ColumnBuilder::Str { strings, .. } => strings.reserve(n, 0),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnBuilder::Int32 { nulls, .. }
            | ColumnBuilder::Int64 { nulls, .. }
            | ColumnBuilder::Float64 { nulls, .. }
            | ColumnBuilder::Bool { nulls, .. }
            | ColumnBuilder::Date { nulls, .. }
            | ColumnBuilder::Timestamp { nulls, .. }
            | ColumnBuilder::Str { nulls, .. } => nulls.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnBuilder::Int32 { nulls, .. }
            | ColumnBuilder::Int64 { nulls, .. }
            | ColumnBuilder::Float64 { nulls, .. }
            | ColumnBuilder::Bool { nulls, .. }
            | ColumnBuilder::Date { nulls, .. }
            | ColumnBuilder::Timestamp { nulls, .. }
            | ColumnBuilder::Str { nulls, .. } => nulls.null_count(),
        }
    }

    /// O(n) append of another builder of the same variant. Used when
    /// assembling numeric row groups of the configured target size.
    pub fn merge_from(&mut self, other: &ColumnBuilder) -> Result<()> {
        match (self, other) {
            (
                ColumnBuilder::Int32 { values, nulls },
                ColumnBuilder::Int32 {
                    values: ov,
                    nulls: on,
                },
            )
            | (
                ColumnBuilder::Date { values, nulls },
                ColumnBuilder::Date {
                    values: ov,
                    nulls: on,
                },
            ) => {
                values.extend_from_slice(ov);
                nulls.append_from(on);
                Ok(())
            }
            (
                ColumnBuilder::Int64 { values, nulls },
                ColumnBuilder::Int64 {
                    values: ov,
                    nulls: on,
                },
            )
            | (
                ColumnBuilder::Timestamp { values, nulls },
                ColumnBuilder::Timestamp {
                    values: ov,
                    nulls: on,
                },
            ) => {
                values.extend_from_slice(ov);
                nulls.append_from(on);
                Ok(())
            }
            (
                ColumnBuilder::Float64 { values, nulls },
                ColumnBuilder::Float64 {
                    values: ov,
                    nulls: on,
                },
            ) => {
                values.extend_from_slice(ov);
                nulls.append_from(on);
                Ok(())
            }
            (
                ColumnBuilder::Bool { values, nulls },
                ColumnBuilder::Bool {
                    values: ov,
                    nulls: on,
                },
            ) => {
                values.extend_from_slice(ov);
                nulls.append_from(on);
                Ok(())
            }
            (
                ColumnBuilder::Str { strings, nulls },
                ColumnBuilder::Str {
                    strings: os,
                    nulls: on,
                },
            ) => {
                strings.append_from(os);
                nulls.append_from(on);
                Ok(())
            }
            (a, b) => Err(Error::General(format!(
                "cannot merge column builder of type {} into {}",
                b.dtype().name(),
                a.dtype().name()
            ))),
        }
    }

    /// Hand the accumulated buffers to Arrow. Buffers move; nothing is
    /// copied except the bool bit-packing.
    pub fn finalize(self) -> Result<ArrayRef> {
        Ok(match self {
            ColumnBuilder::Int32 { values, nulls } => Arc::new(Int32Array::new(
                ScalarBuffer::from(values),
                nulls.into_arrow(),
            )),
            ColumnBuilder::Int64 { values, nulls } => Arc::new(Int64Array::new(
                ScalarBuffer::from(values),
                nulls.into_arrow(),
            )),
            ColumnBuilder::Float64 { values, nulls } => Arc::new(Float64Array::new(
                ScalarBuffer::from(values),
                nulls.into_arrow(),
            )),
            ColumnBuilder::Bool { values, nulls } => {
                let bits: BooleanBuffer = values.iter().map(|&v| v != 0).collect();
                Arc::new(BooleanArray::new(bits, nulls.into_arrow()))
            }
            ColumnBuilder::Date { values, nulls } => Arc::new(Date32Array::new(
                ScalarBuffer::from(values),
                nulls.into_arrow(),
            )),
            ColumnBuilder::Timestamp { values, nulls } => Arc::new(
                TimestampMicrosecondArray::new(ScalarBuffer::from(values), nulls.into_arrow())
                    .with_timezone("UTC"),
            ),
            ColumnBuilder::Str { strings, nulls } => {
                let (data, offsets) = strings.into_parts();
                let array = StringArray::try_new(
                    OffsetBuffer::new(ScalarBuffer::from(offsets)),
                    Buffer::from_vec(data),
                    nulls.into_arrow(),
                )?;
                Arc::new(array)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::Array;

    #[test]
    fn int32_finalize() {
        let mut b = ColumnBuilder::create(DataType::Int32);
        if let ColumnBuilder::Int32 { values, nulls } = &mut b {
            values.push(1);
            nulls.push_valid();
            values.push(0);
            nulls.push_null();
            values.push(3);
            nulls.push_valid();
        }
        assert_eq!(b.len(), 3);
        assert_eq!(b.null_count(), 1);
        let arr = b.finalize().unwrap();
        let arr = arr.as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(arr.value(0), 1);
        assert!(arr.is_null(1));
        assert_eq!(arr.value(2), 3);
    }

    #[test]
    fn string_finalize() {
        let mut b = ColumnBuilder::create(DataType::String);
        if let ColumnBuilder::Str { strings, nulls } = &mut b {
            strings.push(b"hello");
            nulls.push_valid();
            strings.push_empty();
            nulls.push_null();
        }
        let arr = b.finalize().unwrap();
        let arr = arr.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(arr.value(0), "hello");
        assert!(arr.is_null(1));
    }

    #[test]
    fn null_count_plus_valid_equals_len() {
        let mut b = ColumnBuilder::create(DataType::Float64);
        if let ColumnBuilder::Float64 { values, nulls } = &mut b {
            for i in 0..100 {
                if i % 3 == 0 {
                    values.push(f64::NAN);
                    nulls.push_null();
                } else {
                    values.push(i as f64);
                    nulls.push_valid();
                }
            }
        }
        let len = b.len();
        let nulls = b.null_count();
        let arr = b.finalize().unwrap();
        assert_eq!(arr.len(), len);
        assert_eq!(arr.null_count(), nulls);
    }

    #[test]
    fn merge_same_type() {
        let mut a = ColumnBuilder::create(DataType::Int64);
        let mut b = ColumnBuilder::create(DataType::Int64);
        if let ColumnBuilder::Int64 { values, nulls } = &mut a {
            values.push(1);
            nulls.push_valid();
        }
        if let ColumnBuilder::Int64 { values, nulls } = &mut b {
            values.push(2);
            nulls.push_valid();
            values.push(0);
            nulls.push_null();
        }
        a.merge_from(&b).unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.null_count(), 1);
    }

    #[test]
    fn merge_type_mismatch_fails() {
        let mut a = ColumnBuilder::create(DataType::Int32);
        let b = ColumnBuilder::create(DataType::String);
        assert!(a.merge_from(&b).is_err());
    }

    #[test]
    fn timestamp_carries_utc() {
        let mut b = ColumnBuilder::create(DataType::Timestamp);
        if let ColumnBuilder::Timestamp { values, nulls } = &mut b {
            values.push(42);
            nulls.push_valid();
        }
        let arr = b.finalize().unwrap();
        match arr.data_type() {
            arrow_schema::DataType::Timestamp(arrow_schema::TimeUnit::Microsecond, Some(tz)) => {
                assert_eq!(tz.as_ref(), "UTC")
            }
            other => panic!("unexpected type {other:?}"),
        }
    }
}
