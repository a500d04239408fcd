//! CSV → Parquet conversion entry point.
//!
//! Opens the input, reads all chunks, and drives the pipelined writer.
//! Batching policy: if any column is a string, every parser chunk becomes
//! one row group (merging string buffers is the expensive case); numeric-
//! only schemas accumulate consecutive chunks into row groups of at least
//! the configured target size before submission.

use std::path::PathBuf;

use log::debug;

use velocsv_core::errors::Result;

use crate::columns::ColumnBuilder;
use crate::diagnostics::ParseError;
use crate::options::{CsvOptions, ParquetOptions};
use crate::reader::CsvReader;
use crate::schema::DataType;
use crate::writer::ParquetSink;

#[derive(Clone, Debug)]
pub struct ConvertOptions {
    pub csv: CsvOptions,
    pub parquet: ParquetOptions,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

/// Conversion outcome. `parse_errors` holds everything the configured
/// error mode collected; `error` is set only when a fatal condition
/// prevented completion.
#[derive(Debug, Default)]
pub struct ConversionSummary {
    pub rows: usize,
    pub cols: usize,
    pub parse_errors: Vec<ParseError>,
    pub error: Option<String>,
}

pub fn convert_csv_to_parquet(options: &ConvertOptions) -> ConversionSummary {
    let mut summary = ConversionSummary::default();

    let mut reader = CsvReader::new(options.csv.clone());
    if let Err(e) = reader.open(&options.input_path) {
        summary.parse_errors = reader.errors().to_vec();
        summary.error = Some(e.to_string());
        return summary;
    }
    summary.cols = reader.schema().len();

    let parsed = match reader.read_all() {
        Ok(parsed) => parsed,
        Err(e) => {
            summary.parse_errors = reader.errors().to_vec();
            summary.error = Some(e.to_string());
            return summary;
        }
    };
    summary.parse_errors = reader.errors().to_vec();
    summary.rows = parsed.total_rows;
    debug!(
        "parsed {} rows in {} chunks",
        parsed.total_rows,
        parsed.chunks.len()
    );

    let schema = reader.schema().to_vec();
    let mut sink = ParquetSink::new(options.parquet.clone());
    if let Err(e) = write_parquet(&mut sink, options, &schema, parsed) {
        summary.error = Some(e.to_string());
    }
    summary
}

fn write_parquet(
    sink: &mut ParquetSink,
    options: &ConvertOptions,
    schema: &[crate::schema::ColumnSchema],
    parsed: crate::reader::ParsedChunks,
) -> Result<()> {
    sink.open(&options.output_path)?;
    sink.set_schema(schema)?;

    let chunks: Vec<Vec<ColumnBuilder>> = parsed
        .chunks
        .into_iter()
        .filter(|c| !c.is_empty() && !c[0].is_empty())
        .collect();

    if chunks.is_empty() {
        sink.close()?;
        return Ok(());
    }

    if chunks.len() == 1 {
        // Single chunk: direct write, no pipeline overhead.
        let mut chunks = chunks;
        sink.write(chunks.pop().unwrap_or_default())?;
        sink.close()?;
        return Ok(());
    }

    sink.start_pipeline()?;

    let has_strings = schema.iter().any(|c| c.dtype == DataType::String);
    if has_strings {
        for chunk in chunks {
            sink.submit_row_group(chunk)?;
        }
    } else {
        let target = options.parquet.row_group_size.max(1);
        let mut accum: Option<Vec<ColumnBuilder>> = None;
        for chunk in chunks {
            match accum.as_mut() {
                None => accum = Some(chunk),
                Some(acc) => {
                    for (dst, src) in acc.iter_mut().zip(chunk.iter()) {
                        dst.merge_from(src)?;
                    }
                }
            }
            let accumulated_rows = accum
                .as_ref()
                .and_then(|a| a.first())
                .map(|c| c.len())
                .unwrap_or(0);
            if accumulated_rows >= target {
                if let Some(batch) = accum.take() {
                    sink.submit_row_group(batch)?;
                }
            }
        }
        if let Some(batch) = accum.take() {
            sink.submit_row_group(batch)?;
        }
    }

    sink.finish_pipeline()?;
    sink.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Compression;
    use std::fs;

    fn convert(data: &str, csv: CsvOptions) -> (ConversionSummary, PathBuf, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.parquet");
        fs::write(&input, data).unwrap();
        let opts = ConvertOptions {
            csv,
            parquet: ParquetOptions {
                compression: Compression::None,
                ..ParquetOptions::default()
            },
            input_path: input,
            output_path: output.clone(),
        };
        (convert_csv_to_parquet(&opts), output, dir)
    }

    fn read_rows(path: &PathBuf) -> usize {
        let file = fs::File::open(path).unwrap();
        parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .sum()
    }

    #[test]
    fn small_file_converts() {
        let (summary, output, _dir) = convert("a,b\n1,2\n3,4\n", CsvOptions::default());
        assert!(summary.error.is_none(), "{:?}", summary.error);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.cols, 2);
        assert_eq!(read_rows(&output), 2);
    }

    #[test]
    fn multi_chunk_numeric_batches_row_groups() {
        let mut body = String::from("a\n");
        for i in 0..300 {
            body.push_str(&format!("{i}\n"));
        }
        let csv = CsvOptions::builder().set_chunk_size(64).build();
        let (summary, output, _dir) = convert(&body, csv);
        assert!(summary.error.is_none(), "{:?}", summary.error);
        assert_eq!(summary.rows, 300);
        assert_eq!(read_rows(&output), 300);

        // Numeric-only chunks merge up to the row-group target, so the
        // file has a single row group despite many parser chunks.
        let file = fs::File::open(&output).unwrap();
        let builder =
            parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 1);
    }

    #[test]
    fn string_chunks_become_row_groups() {
        let mut body = String::from("s\n");
        for i in 0..300 {
            body.push_str(&format!("word{i}\n"));
        }
        let csv = CsvOptions::builder().set_chunk_size(64).build();
        let (summary, output, _dir) = convert(&body, csv);
        assert!(summary.error.is_none());
        let file = fs::File::open(&output).unwrap();
        let builder =
            parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
        assert!(builder.metadata().num_row_groups() > 1);
        assert_eq!(read_rows(&output), 300);
    }

    #[test]
    fn missing_input_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ConvertOptions {
            csv: CsvOptions::default(),
            parquet: ParquetOptions::default(),
            input_path: dir.path().join("absent.csv"),
            output_path: dir.path().join("out.parquet"),
        };
        let summary = convert_csv_to_parquet(&opts);
        assert!(summary.error.is_some());
        assert_eq!(summary.rows, 0);
    }
}
