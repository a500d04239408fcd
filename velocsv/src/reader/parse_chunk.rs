//! Per-chunk parse driver.
//!
//! Each worker owns one byte range, its column builders and its error
//! collector; it touches no shared state and performs no I/O. Rows are
//! attributed to the chunk their first byte falls in: a row that starts
//! before the chunk boundary is parsed to completion even when its
//! terminator lies beyond it, and a chunk that starts inside a quoted
//! field skips forward past the close quote and the next unquoted row
//! terminator, discarding the partial prefix the previous worker already
//! consumed. Together the two rules parse every row exactly once.

use velocsv_scan::SplitFields;

use crate::columns::{AppendContext, ColumnBuilder};
use crate::diagnostics::{ErrorCode, ErrorCollector, ErrorSeverity};
use crate::options::CsvOptions;
use crate::parse::{unescape_quotes, ParseConfig};

pub(crate) struct ChunkJob<'a> {
    /// The whole (transcoded) input; offsets below are absolute.
    pub data: &'a [u8],
    pub chunk_start: usize,
    pub chunk_end: usize,
    pub start_inside_quote: bool,
    /// Base row number for error reporting (1-based); `None` in the
    /// multi-threaded path, which reports row 0.
    pub first_row_number: Option<u64>,
    /// Only the worker owning the final chunk reports an unclosed quote at
    /// end of input.
    pub is_final_chunk: bool,
}

/// Parse one chunk into `columns`. Returns the number of rows appended.
pub(crate) fn parse_chunk(
    job: &ChunkJob<'_>,
    opts: &CsvOptions,
    cfg: &ParseConfig,
    columns: &mut [ColumnBuilder],
    collector: &mut ErrorCollector,
) -> usize {
    let data = job.data;
    let quote = opts.quote;
    let sep = opts.separator;
    let num_cols = columns.len();
    if num_cols == 0 || job.chunk_start >= job.chunk_end {
        return 0;
    }

    let mut contexts: Vec<AppendContext<'_>> = columns
        .iter_mut()
        .map(|col| AppendContext::new(col, cfg))
        .collect();

    let check_errors = collector.is_enabled();
    let mut offset = job.chunk_start;
    let mut row_count = 0usize;
    let mut row_number = job.first_row_number.unwrap_or(0);

    // A chunk that begins mid-quote owns no row start: the partial row was
    // completed by the previous worker. Skip past the close quote, then
    // past the row terminator.
    if job.start_inside_quote {
        offset = skip_partial_quoted_row(data, offset, quote);
    }

    'rows: while offset < job.chunk_end {
        // Leading terminators are empty rows.
        let line_start = offset;
        while offset < job.chunk_end {
            let c = data[offset];
            if c == b'\n' {
                offset += 1;
            } else if c == b'\r' {
                offset += 1;
                if offset < data.len() && data[offset] == b'\n' {
                    offset += 1;
                }
            } else {
                break;
            }
        }
        if !opts.skip_empty_rows && offset > line_start {
            // Each skipped terminator was an empty row: emit it as all
            // nulls.
            let mut scan = line_start;
            while scan < offset {
                for ctx in contexts.iter_mut() {
                    ctx.append_null();
                }
                row_count += 1;
                if data[scan] == b'\r' && scan + 1 < offset && data[scan + 1] == b'\n' {
                    scan += 2;
                } else {
                    scan += 1;
                }
            }
        }
        if offset >= job.chunk_end {
            break;
        }

        // The row may run past chunk_end; the iterator sees everything up
        // to input end and stops at the row's real terminator.
        let row_start = offset;
        let start_remaining = data.len() - offset;
        let mut iter = SplitFields::new(&data[offset..], sep, quote, b'\n');
        let mut col_idx = 0usize;

        while let Some((mut field, needs_escaping)) = iter.next() {
            if field.last() == Some(&b'\r') {
                field = &field[..field.len() - 1];
            }

            if check_errors {
                if let Some(pos) = memchr::memchr(0, field) {
                    let byte_off = (field.as_ptr() as usize - data.as_ptr() as usize + pos) as u64;
                    collector.add(
                        ErrorCode::NullByte,
                        ErrorSeverity::Recoverable,
                        row_number,
                        col_idx as u64 + 1,
                        byte_off,
                        "unexpected null byte in data",
                    );
                    if collector.should_stop() {
                        break 'rows;
                    }
                }
                if !needs_escaping
                    && !field.is_empty()
                    && memchr::memchr(quote, field).is_some()
                {
                    let byte_off = (field.as_ptr() as usize - data.as_ptr() as usize) as u64;
                    collector.add(
                        ErrorCode::QuoteInUnquotedField,
                        ErrorSeverity::Recoverable,
                        row_number,
                        col_idx as u64 + 1,
                        byte_off,
                        "quote character in unquoted field",
                    );
                    if collector.should_stop() {
                        break 'rows;
                    }
                }
                if opts.max_field_size > 0 && field.len() > opts.max_field_size {
                    let byte_off = (field.as_ptr() as usize - data.as_ptr() as usize) as u64;
                    collector.add(
                        ErrorCode::FieldTooLarge,
                        ErrorSeverity::Recoverable,
                        row_number,
                        col_idx as u64 + 1,
                        byte_off,
                        format!(
                            "field of {} bytes exceeds the {} byte limit",
                            field.len(),
                            opts.max_field_size
                        ),
                    );
                    if collector.should_stop() {
                        break 'rows;
                    }
                }
            }

            if col_idx >= num_cols {
                // Surplus fields are discarded; the count mismatch is
                // reported after the row.
                col_idx += 1;
                continue;
            }

            if cfg.nulls.is_null(field) {
                contexts[col_idx].append_null();
            } else if needs_escaping {
                let mut inner = field;
                if inner.first() == Some(&quote) {
                    inner = &inner[1..];
                    if inner.last() == Some(&quote) {
                        inner = &inner[..inner.len() - 1];
                    }
                }
                let mut invalid_escape = false;
                let unescaped = unescape_quotes(
                    inner,
                    quote,
                    check_errors.then_some(&mut invalid_escape),
                );
                if invalid_escape {
                    let byte_off = (field.as_ptr() as usize - data.as_ptr() as usize) as u64;
                    collector.add(
                        ErrorCode::InvalidQuoteEscape,
                        ErrorSeverity::Recoverable,
                        row_number,
                        col_idx as u64 + 1,
                        byte_off,
                        "invalid quote escape sequence",
                    );
                    if collector.should_stop() {
                        break 'rows;
                    }
                }
                if cfg.nulls.is_null(&unescaped) {
                    contexts[col_idx].append_null();
                } else {
                    contexts[col_idx].append(&unescaped);
                }
            } else {
                contexts[col_idx].append(field);
            }
            col_idx += 1;
        }

        if check_errors && col_idx != num_cols {
            collector.add(
                ErrorCode::InconsistentFieldCount,
                ErrorSeverity::Recoverable,
                row_number,
                0,
                row_start as u64,
                format!("expected {num_cols} fields, got {col_idx}"),
            );
            // The row is still delivered below with null padding; the
            // stop check after the row honors FailFast.
        }

        for ctx in contexts.iter_mut().skip(col_idx.min(num_cols)) {
            ctx.append_null();
        }

        row_count += 1;
        offset += start_remaining - iter.remaining();

        if check_errors
            && job.is_final_chunk
            && iter.finished_inside_quote()
            && offset >= data.len()
        {
            collector.add(
                ErrorCode::UnclosedQuote,
                ErrorSeverity::Recoverable,
                row_number,
                0,
                row_start as u64,
                "quoted field not closed before end of data",
            );
        }

        if collector.should_stop() {
            break;
        }
        if row_number > 0 {
            row_number += 1;
        }
    }

    row_count
}

/// From a mid-quote position, find the first offset after the partial row:
/// past the matching close quote, then past the next unquoted terminator.
fn skip_partial_quoted_row(data: &[u8], mut offset: usize, quote: u8) -> usize {
    // Close the open quote; doubled quotes stay inside.
    while offset < data.len() {
        if data[offset] == quote {
            if offset + 1 < data.len() && data[offset + 1] == quote {
                offset += 2;
                continue;
            }
            offset += 1;
            break;
        }
        offset += 1;
    }
    // Finish the row.
    velocsv_scan::find_row_end(data, offset, quote)
}
