//! Multi-batch columnar table assembled from parsed chunks.
//!
//! Each parser chunk finalizes into one `RecordBatch`; the batches share
//! one schema. The table can be walked as a `RecordBatchReader`, exported
//! over the Arrow C Data Interface as an `ArrowArrayStream` (one batch per
//! source chunk), or written out as an Arrow IPC file.

use std::io::Write;
use std::sync::Arc;

use arrow::ffi_stream::FFI_ArrowArrayStream;
use arrow_array::{RecordBatch, RecordBatchReader};
use arrow_schema::{ArrowError, Schema, SchemaRef};
use velocsv_core::errors::Result;

use crate::reader::ParsedChunks;
use crate::schema::ColumnSchema;

pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Finalize parsed chunks into record batches. Empty chunks are
    /// dropped; schema length always matches every chunk's column count.
    pub fn from_chunks(schema: &[ColumnSchema], parsed: ParsedChunks) -> Result<Self> {
        let arrow_schema: SchemaRef = Arc::new(Schema::new(
            schema
                .iter()
                .map(|c| c.to_arrow_field())
                .collect::<Vec<_>>(),
        ));

        let mut batches = Vec::with_capacity(parsed.chunks.len());
        for chunk in parsed.chunks {
            if chunk.is_empty() || chunk[0].is_empty() {
                continue;
            }
            let arrays = chunk
                .into_iter()
                .map(|b| b.finalize())
                .collect::<Result<Vec<_>>>()?;
            batches.push(RecordBatch::try_new(Arc::clone(&arrow_schema), arrays)?);
        }

        Ok(Self {
            schema: arrow_schema,
            batches,
        })
    }

    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Consume the table into a batch reader.
    pub fn into_reader(self) -> TableReader {
        TableReader {
            schema: self.schema,
            batches: self.batches.into_iter(),
        }
    }

    /// Export over the C Data Interface. The stream emits one batch per
    /// source chunk; release callbacks free the per-array private data and
    /// the boxed reader keeps the buffers alive until the consumer releases
    /// the stream.
    pub fn into_ffi_stream(self) -> FFI_ArrowArrayStream {
        FFI_ArrowArrayStream::new(Box::new(self.into_reader()))
    }

    /// Write the batches as an Arrow IPC file.
    pub fn write_ipc<W: Write>(&self, sink: W) -> Result<()> {
        let mut writer = arrow_ipc::writer::FileWriter::try_new(sink, self.schema.as_ref())?;
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.finish()?;
        Ok(())
    }
}

pub struct TableReader {
    schema: SchemaRef,
    batches: std::vec::IntoIter<RecordBatch>,
}

impl Iterator for TableReader {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.next().map(Ok)
    }
}

impl RecordBatchReader for TableReader {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }
}
