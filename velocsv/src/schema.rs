//! Column types and the inference promotion lattice.

use arrow_schema::{DataType as ArrowDataType, Field, TimeUnit};

/// Type hierarchy: Null < Bool < Int32 < Int64 < Float64 < String.
/// Lower types can be promoted to higher types during inference; Date and
/// Timestamp promote only to String.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataType {
    Null = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Float64 = 4,
    String = 5,
    Date = 6,
    Timestamp = 7,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Null => "null",
            DataType::Bool => "bool",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
        }
    }

    pub fn to_arrow(self) -> ArrowDataType {
        match self {
            // Null columns are widened to String before builders exist; a
            // residual Null still exports as Utf8.
            DataType::Null | DataType::String => ArrowDataType::Utf8,
            DataType::Bool => ArrowDataType::Boolean,
            DataType::Int32 => ArrowDataType::Int32,
            DataType::Int64 => ArrowDataType::Int64,
            DataType::Float64 => ArrowDataType::Float64,
            DataType::Date => ArrowDataType::Date32,
            DataType::Timestamp => {
                ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
        }
    }
}

/// The join (wider type) of two classifications.
pub fn wider_type(a: DataType, b: DataType) -> DataType {
    use DataType::*;
    if a == Null {
        return b;
    }
    if b == Null {
        return a;
    }
    if a == String || b == String {
        return String;
    }
    // Date and Timestamp promote only to String: any join with a
    // different type, temporal or not, has no common shape but text.
    if (a == Date || a == Timestamp || b == Date || b == Timestamp) && a != b {
        return String;
    }
    if a as u8 >= b as u8 {
        a
    } else {
        b
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub index: u32,
    pub dtype: DataType,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn to_arrow_field(&self) -> Field {
        Field::new(&self.name, self.dtype.to_arrow(), self.nullable)
    }
}
