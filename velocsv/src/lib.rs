//! High-throughput CSV reader with Arrow-compatible columnar output and a
//! pipelined Parquet encoder.
//!
//! The input is split into byte ranges that each end on an unquoted row
//! terminator. A single cheap pass per range counts rows for both possible
//! starting quote states; linking the ranges then tells every parser worker
//! which state it starts in, so each range is parsed exactly once, in
//! parallel, into per-chunk column builders. Finished chunks either assemble
//! into a [`table::Table`] or stream through the bounded ordered queue into
//! the Parquet encode/write pipeline.

pub mod cache;
pub mod columns;
pub mod convert;
pub mod diagnostics;
pub mod encoding;
pub mod infer;
pub mod options;
pub mod parse;
pub mod reader;
pub mod schema;
pub mod source;
pub mod table;
pub mod writer;

pub use convert::{convert_csv_to_parquet, ConversionSummary, ConvertOptions};
pub use diagnostics::{ErrorCode, ErrorMode, ErrorSeverity, ParseError};
pub use options::{Compression, CsvOptions, ParquetOptions};
pub use reader::{CsvReader, ParsedChunks};
pub use schema::{ColumnSchema, DataType};
pub use table::Table;
pub use velocsv_core::errors::{Error, Result};
pub use writer::ParquetSink;
