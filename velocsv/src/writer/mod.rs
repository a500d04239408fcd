//! Pipelined Parquet emission.
//!
//! Stage E encodes every column of a row group independently on the rayon
//! pool (definition levels, page bodies, optional compression and page
//! headers all happen inside the `parquet` column writers). Stage W is a
//! single thread that appends pre-encoded row groups to the file in
//! submission order and finally writes the footer. A bounded queue of
//! depth four couples the stages; an encoder or writer failure latches a
//! pipeline error that subsequent submissions and `finish_pipeline`
//! surface.

pub mod queue;

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use arrow_array::ArrayRef;
use arrow_schema::{Schema, SchemaRef};
use log::debug;
use parquet::arrow::arrow_to_parquet_schema;
use parquet::arrow::arrow_writer::{compute_leaves, get_column_writers, ArrowColumnChunk};
use parquet::basic::{Compression as ParquetCompression, GzipLevel, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::types::SchemaDescriptor;
use rayon::prelude::*;

use velocsv_core::errors::{Error, Result};

use crate::columns::ColumnBuilder;
use crate::options::{Compression, ParquetOptions};
use crate::schema::ColumnSchema;
use crate::writer::queue::{EncodedRowGroup, EncodedRowGroupQueue, DEFAULT_QUEUE_DEPTH};

type BoxedSink = Box<dyn Write + Send>;

struct SinkSchema {
    arrow: SchemaRef,
    parquet: SchemaDescriptor,
    props: Arc<WriterProperties>,
}

struct Pipeline {
    queue: Arc<EncodedRowGroupQueue>,
    error: Arc<Mutex<Option<String>>>,
    handle: JoinHandle<()>,
    next_sequence: usize,
}

enum SinkState {
    /// No sink opened yet.
    Unopened,
    /// Sink present, waiting for a schema.
    Opened(BoxedSink),
    /// File writer live; row groups are appended inline.
    Direct(Box<SerializedFileWriter<BoxedSink>>),
    /// Writer thread owns the file writer.
    Piped(Pipeline),
    Finished,
}

/// Parquet output sink: open, set a schema, feed row groups, close. The
/// footer and the bracketing `PAR1` magics are written on close by the
/// underlying file writer.
pub struct ParquetSink {
    options: ParquetOptions,
    schema: Option<Arc<SinkSchema>>,
    state: SinkState,
}

impl ParquetSink {
    pub fn new(options: ParquetOptions) -> Self {
        Self {
            options,
            schema: None,
            state: SinkState::Unopened,
        }
    }

    /// Open a file path as the output sink.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.state = SinkState::Opened(Box::new(file));
        Ok(())
    }

    /// Use an arbitrary writable stream as the output sink.
    pub fn open_stream(&mut self, sink: impl Write + Send + 'static) -> Result<()> {
        self.state = SinkState::Opened(Box::new(sink));
        Ok(())
    }

    /// Fix the schema and stand up the file writer. Must be called after
    /// `open` and before any write.
    pub fn set_schema(&mut self, columns: &[ColumnSchema]) -> Result<()> {
        let arrow: SchemaRef = Arc::new(Schema::new(
            columns
                .iter()
                .map(|c| c.to_arrow_field())
                .collect::<Vec<_>>(),
        ));
        let parquet = arrow_to_parquet_schema(&arrow)?;
        let props = Arc::new(self.writer_properties()?);

        let sink = match std::mem::replace(&mut self.state, SinkState::Unopened) {
            SinkState::Opened(sink) => sink,
            other => {
                self.state = other;
                return Err(Error::General(
                    "open() must be called before set_schema()".into(),
                ));
            }
        };
        let writer =
            SerializedFileWriter::new(sink, parquet.root_schema_ptr(), Arc::clone(&props))?;
        self.schema = Some(Arc::new(SinkSchema {
            arrow,
            parquet,
            props,
        }));
        self.state = SinkState::Direct(Box::new(writer));
        Ok(())
    }

    /// Encode and append one row group inline (no pipeline).
    pub fn write(&mut self, columns: Vec<ColumnBuilder>) -> Result<()> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| Error::General("set_schema() must be called before write()".into()))?;
        let row_group = encode_row_group(&schema, columns, 0)?;
        match &mut self.state {
            SinkState::Direct(writer) => append_row_group(writer, row_group),
            SinkState::Piped(_) => Err(Error::General(
                "write() is not available while the pipeline is running".into(),
            )),
            _ => Err(Error::General("writer is not open".into())),
        }
    }

    /// Move the file writer onto a dedicated thread and start accepting
    /// pipelined row groups.
    pub fn start_pipeline(&mut self) -> Result<()> {
        let writer = match std::mem::replace(&mut self.state, SinkState::Unopened) {
            SinkState::Direct(writer) => writer,
            other => {
                self.state = other;
                return Err(Error::General(
                    "set_schema() must be called before start_pipeline()".into(),
                ));
            }
        };

        let queue = Arc::new(EncodedRowGroupQueue::new(DEFAULT_QUEUE_DEPTH));
        let error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let thread_queue = Arc::clone(&queue);
        let thread_error = Arc::clone(&error);
        let handle = std::thread::spawn(move || {
            let mut writer = writer;
            while let Some(row_group) = thread_queue.pop() {
                debug!(
                    "writing row group {} ({} rows)",
                    row_group.sequence, row_group.num_rows
                );
                if let Err(e) = append_row_group(&mut writer, row_group) {
                    if let Ok(mut slot) = thread_error.lock() {
                        *slot = Some(e.to_string());
                    }
                    // Unblock any producer still parked on the full queue.
                    thread_queue.close();
                    return;
                }
            }
            if let Err(e) = writer.close() {
                if let Ok(mut slot) = thread_error.lock() {
                    *slot = Some(e.to_string());
                }
            }
        });

        self.state = SinkState::Piped(Pipeline {
            queue,
            error,
            handle,
            next_sequence: 0,
        });
        Ok(())
    }

    /// Encode a row group (columns in parallel) and hand it to the writer
    /// thread. Blocks while the pipeline queue is full.
    pub fn submit_row_group(&mut self, columns: Vec<ColumnBuilder>) -> Result<()> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| Error::General("set_schema() must be called first".into()))?;
        let pipeline = match &mut self.state {
            SinkState::Piped(p) => p,
            _ => {
                return Err(Error::General(
                    "start_pipeline() must be called before submit_row_group()".into(),
                ))
            }
        };
        if let Some(msg) = pipeline
            .error
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
        {
            return Err(Error::General(format!("parquet pipeline failed: {msg}")));
        }

        let sequence = pipeline.next_sequence;
        pipeline.next_sequence += 1;
        let row_group = encode_row_group(&schema, columns, sequence)?;
        if !pipeline.queue.push(row_group) {
            let msg = pipeline
                .error
                .lock()
                .ok()
                .and_then(|slot| slot.clone())
                .unwrap_or_else(|| "pipeline closed".to_string());
            return Err(Error::General(format!("parquet pipeline failed: {msg}")));
        }
        Ok(())
    }

    /// Drain the queue, join the writer thread and surface any stored
    /// error. The footer is written here.
    pub fn finish_pipeline(&mut self) -> Result<()> {
        let pipeline = match std::mem::replace(&mut self.state, SinkState::Finished) {
            SinkState::Piped(p) => p,
            other => {
                self.state = other;
                return Err(Error::General("pipeline is not running".into()));
            }
        };
        pipeline.queue.close();
        pipeline
            .handle
            .join()
            .map_err(|_| Error::General("parquet writer thread panicked".into()))?;
        if let Some(msg) = pipeline.error.lock().ok().and_then(|slot| slot.clone()) {
            return Err(Error::General(format!("parquet pipeline failed: {msg}")));
        }
        Ok(())
    }

    /// Finalize the file. For direct writes this emits the footer; a
    /// running pipeline is finished first.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SinkState::Finished) {
            SinkState::Direct(writer) => {
                writer.close()?;
                Ok(())
            }
            SinkState::Piped(p) => {
                self.state = SinkState::Piped(p);
                self.finish_pipeline()
            }
            _ => Ok(()),
        }
    }

    fn writer_properties(&self) -> Result<WriterProperties> {
        let compression = match self.options.compression {
            Compression::None => ParquetCompression::UNCOMPRESSED,
            Compression::Zstd => {
                ParquetCompression::ZSTD(ZstdLevel::try_new(self.options.compression_level)?)
            }
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Lz4 => ParquetCompression::LZ4,
            Compression::Gzip => ParquetCompression::GZIP(GzipLevel::try_new(
                self.options.compression_level.max(0) as u32,
            )?),
        };
        let statistics = if self.options.write_statistics {
            EnabledStatistics::Chunk
        } else {
            EnabledStatistics::None
        };
        Ok(WriterProperties::builder()
            .set_compression(compression)
            .set_statistics_enabled(statistics)
            .set_dictionary_enabled(self.options.enable_dictionary)
            .set_data_page_size_limit(self.options.page_size)
            .build())
    }
}

/// Stage E: finalize the builders into arrays and encode every column of
/// the row group concurrently.
fn encode_row_group(
    schema: &SinkSchema,
    columns: Vec<ColumnBuilder>,
    sequence: usize,
) -> Result<EncodedRowGroup> {
    if columns.len() != schema.arrow.fields().len() {
        return Err(Error::General(format!(
            "row group has {} columns, schema expects {}",
            columns.len(),
            schema.arrow.fields().len()
        )));
    }
    let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
    let arrays: Vec<ArrayRef> = columns
        .into_iter()
        .map(|c| c.finalize())
        .collect::<Result<_>>()?;

    let writers = get_column_writers(&schema.parquet, &schema.props, &schema.arrow)?;
    let fields: Vec<_> = schema.arrow.fields().iter().cloned().collect();

    let chunks: Vec<ArrowColumnChunk> = writers
        .into_par_iter()
        .zip(fields.into_par_iter().zip(arrays.into_par_iter()))
        .map(|(mut writer, (field, array))| -> Result<ArrowColumnChunk> {
            for leaf in compute_leaves(field.as_ref(), &array)? {
                writer.write(&leaf)?;
            }
            writer.close().map_err(Error::from)
        })
        .collect::<Result<_>>()?;

    Ok(EncodedRowGroup {
        sequence,
        num_rows,
        chunks,
    })
}

/// Stage W: append one pre-encoded row group sequentially.
fn append_row_group(
    writer: &mut SerializedFileWriter<BoxedSink>,
    row_group: EncodedRowGroup,
) -> Result<()> {
    let mut rg_writer = writer.next_row_group()?;
    for chunk in row_group.chunks {
        chunk.append_to_row_group(&mut rg_writer)?;
    }
    rg_writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;

    fn int_chunk(values: &[i32]) -> Vec<ColumnBuilder> {
        let mut b = ColumnBuilder::create(DataType::Int32);
        if let ColumnBuilder::Int32 { values: v, nulls } = &mut b {
            for &x in values {
                v.push(x);
                nulls.push_valid();
            }
        }
        vec![b]
    }

    fn int_schema() -> Vec<ColumnSchema> {
        vec![ColumnSchema {
            name: "a".into(),
            index: 0,
            dtype: DataType::Int32,
            nullable: true,
        }]
    }

    #[test]
    fn lifecycle_enforced() {
        let mut sink = ParquetSink::new(ParquetOptions::default());
        assert!(sink.set_schema(&int_schema()).is_err());
        assert!(sink.write(int_chunk(&[1])).is_err());
        assert!(sink.start_pipeline().is_err());
    }

    #[test]
    fn direct_write_produces_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direct.parquet");
        let mut sink = ParquetSink::new(ParquetOptions {
            compression: Compression::None,
            ..ParquetOptions::default()
        });
        sink.open(&path).unwrap();
        sink.set_schema(&int_schema()).unwrap();
        sink.write(int_chunk(&[1, 2, 3])).unwrap();
        sink.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], b"PAR1");
        assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");

        let file = File::open(&path).unwrap();
        let reader =
            parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
                .unwrap()
                .build()
                .unwrap();
        let rows: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn pipeline_preserves_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piped.parquet");
        let mut sink = ParquetSink::new(ParquetOptions {
            compression: Compression::None,
            ..ParquetOptions::default()
        });
        sink.open(&path).unwrap();
        sink.set_schema(&int_schema()).unwrap();
        sink.start_pipeline().unwrap();
        for base in 0..10 {
            sink.submit_row_group(int_chunk(&[base * 2, base * 2 + 1]))
                .unwrap();
        }
        sink.finish_pipeline().unwrap();

        let file = File::open(&path).unwrap();
        let builder =
            parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 10);
        let reader = builder.build().unwrap();
        let mut all = Vec::new();
        for batch in reader {
            let batch = batch.unwrap();
            let col = batch
                .column(0)
                .as_any()
                .downcast_ref::<arrow_array::Int32Array>()
                .unwrap();
            all.extend(col.values().iter().copied());
        }
        let expect: Vec<i32> = (0..20).collect();
        assert_eq!(all, expect);
    }

    #[test]
    fn submit_after_finish_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.parquet");
        let mut sink = ParquetSink::new(ParquetOptions::default());
        sink.open(&path).unwrap();
        sink.set_schema(&int_schema()).unwrap();
        sink.start_pipeline().unwrap();
        sink.finish_pipeline().unwrap();
        assert!(sink.submit_row_group(int_chunk(&[1])).is_err());
    }
}
