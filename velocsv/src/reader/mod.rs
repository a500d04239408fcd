//! CSV reader orchestration.
//!
//! `open` maps the input, settles its encoding, parses the header and
//! infers the schema. `read_all` then runs the three-phase plan: carve
//! chunk ranges, analyze each range once for both starting quote states,
//! link ranges to resolve the real starting states, and parse every range
//! exactly once in parallel. `start_streaming`/`next_chunk` run the same
//! plan but deliver chunks through the bounded ordered queue as they
//! finish.

mod parse_chunk;
pub mod planner;
pub mod queue;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::debug;
use rayon::prelude::*;

use velocsv_core::errors::{Error, Result};
use velocsv_scan::{analyze_chunk_dual_state, find_row_end, DualStateStats, SplitFields};

use crate::cache::{CachedIndex, ChunkMeta, EliasFano, IndexCache};
use crate::columns::ColumnBuilder;
use crate::diagnostics::{ErrorCode, ErrorCollector, ErrorMode, ErrorSeverity, ParseError};
use crate::encoding::{detect_encoding, transcode_to_utf8, CharEncoding, EncodingReport};
use crate::infer::TypeInference;
use crate::options::{calculate_chunk_size, CsvOptions};
use crate::parse::{unescape_quotes, ParseConfig};
use crate::reader::parse_chunk::{parse_chunk, ChunkJob};
use crate::reader::planner::{
    chunk_ends_inside, expected_rows, link_starting_states, plan_chunk_ranges,
};
use crate::reader::queue::{ParsedChunkQueue, DEFAULT_MAX_BUFFERED};
use crate::schema::{ColumnSchema, DataType};
use crate::source::ByteSource;

/// Inputs smaller than this parse single-threaded unless an explicit chunk
/// size forces the parallel plan.
pub const PARALLEL_THRESHOLD: usize = 1024 * 1024;

/// Parsed output: one vector of column builders per chunk. The consumer
/// owns it exclusively; each chunk can become a separate Parquet row group.
#[derive(Default)]
pub struct ParsedChunks {
    pub chunks: Vec<Vec<ColumnBuilder>>,
    pub total_rows: usize,
    pub used_cache: bool,
    pub cache_path: Option<PathBuf>,
}

/// Read-only state shared with streaming workers.
struct WorkerCtx {
    options: CsvOptions,
    cfg: ParseConfig,
    schema: Vec<ColumnSchema>,
}

struct StreamingState {
    queue: Arc<ParsedChunkQueue>,
    collectors: Arc<Mutex<Vec<Option<ErrorCollector>>>>,
    // Kept alive so workers can finish; dropped after the queue closes.
    _pool: Arc<rayon::ThreadPool>,
    last_chunk_unclosed: bool,
    last_range_start: usize,
    merged: bool,
}

impl Drop for StreamingState {
    fn drop(&mut self) {
        // Unblock any producer still parked on the queue before the pool
        // join in `_pool`'s drop.
        self.queue.close();
    }
}

pub struct CsvReader {
    options: CsvOptions,
    cfg: ParseConfig,
    source: Option<Arc<ByteSource>>,
    file_path: Option<PathBuf>,
    encoding: EncodingReport,
    schema: Vec<ColumnSchema>,
    header_end: usize,
    collector: ErrorCollector,
    row_count: usize,
    num_threads: usize,
    streaming: Option<StreamingState>,
}

impl CsvReader {
    pub fn new(options: CsvOptions) -> Self {
        let cfg = ParseConfig::from_options(&options);
        let collector = ErrorCollector::new(options.error_mode, options.max_errors);
        let num_threads = options.resolved_threads();
        Self {
            options,
            cfg,
            source: None,
            file_path: None,
            encoding: EncodingReport {
                encoding: CharEncoding::Unknown,
                bom_length: 0,
                confidence: 0.0,
                needs_transcoding: false,
            },
            schema: Vec::new(),
            header_end: 0,
            collector,
            row_count: 0,
            num_threads,
            streaming: None,
        }
    }

    /// Open a file through a memory mapping.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.file_path = Some(path.as_ref().to_path_buf());
        let source = ByteSource::open(path.as_ref())?;
        self.prepare(source)
    }

    /// Open from a pre-loaded buffer (e.g. stdin), taking ownership.
    pub fn open_from_buffer(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.file_path = None;
        self.prepare(ByteSource::from_vec(bytes))
    }

    pub fn schema(&self) -> &[ColumnSchema] {
        &self.schema
    }

    /// Detected input encoding; valid after open.
    pub fn encoding(&self) -> &EncodingReport {
        &self.encoding
    }

    /// Total rows parsed so far (after `read_all`, or cumulatively while
    /// streaming).
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn errors(&self) -> &[ParseError] {
        self.collector.errors()
    }

    pub fn has_errors(&self) -> bool {
        self.collector.has_errors()
    }

    fn prepare(&mut self, source: ByteSource) -> Result<()> {
        let report = detect_encoding(source.as_bytes());
        self.encoding = report;

        let source = if report.needs_transcoding {
            debug!(
                "transcoding {} input ({} bytes)",
                report.encoding.name(),
                source.len()
            );
            let utf8 = transcode_to_utf8(source.as_bytes(), &report)?;
            ByteSource::from_vec(utf8)
        } else {
            source
        };
        // Transcoders consume the BOM; an in-place UTF-8 BOM is skipped.
        let mut pos = if report.needs_transcoding {
            0
        } else {
            report.bom_length
        };

        let source = Arc::new(source);
        let data = source.as_bytes();

        // Comment lines are honored in the pre-data region only.
        if self.options.comment != 0 {
            while pos < data.len() && data[pos] == self.options.comment {
                pos = match memchr::memchr(b'\n', &data[pos..]) {
                    Some(nl) => pos + nl + 1,
                    None => data.len(),
                };
            }
        }

        self.schema.clear();
        if self.options.has_header {
            if pos >= data.len() {
                self.collector.add(
                    ErrorCode::EmptyHeader,
                    ErrorSeverity::Fatal,
                    1,
                    1,
                    pos as u64,
                    "header row is empty",
                );
                if self.options.error_mode == ErrorMode::FailFast {
                    return Err(Error::ParseError("header row is empty".into()));
                }
                self.header_end = pos;
            } else {
                let header_end = find_row_end(data, pos, self.options.quote);
                let names = self.parse_header_row(&data[pos..header_end]);
                if self.collector.is_enabled() {
                    let effectively_empty =
                        names.is_empty() || (names.len() == 1 && names[0].is_empty());
                    if effectively_empty {
                        self.collector.add(
                            ErrorCode::EmptyHeader,
                            ErrorSeverity::Fatal,
                            1,
                            1,
                            pos as u64,
                            "header row is empty",
                        );
                        if self.options.error_mode == ErrorMode::FailFast {
                            return Err(Error::ParseError("header row is empty".into()));
                        }
                    }
                    let mut seen: HashSet<&str> = HashSet::with_capacity(names.len());
                    for (i, name) in names.iter().enumerate() {
                        if !name.is_empty() && !seen.insert(name.as_str()) {
                            self.collector.add(
                                ErrorCode::DuplicateColumnNames,
                                ErrorSeverity::Warning,
                                1,
                                i as u64 + 1,
                                pos as u64,
                                format!("duplicate column name: '{name}'"),
                            );
                        }
                    }
                }
                self.schema = names
                    .into_iter()
                    .enumerate()
                    .map(|(i, name)| ColumnSchema {
                        name,
                        index: i as u32,
                        dtype: DataType::String,
                        nullable: true,
                    })
                    .collect();
                self.header_end = header_end;
            }
        } else {
            if pos < data.len() {
                let first_row_end = find_row_end(data, pos, self.options.quote);
                let n_cols = count_columns(
                    &data[pos..first_row_end],
                    self.options.separator,
                    self.options.quote,
                );
                self.schema = (0..n_cols)
                    .map(|i| ColumnSchema {
                        name: format!("V{}", i + 1),
                        index: i as u32,
                        dtype: DataType::String,
                        nullable: true,
                    })
                    .collect();
            }
            self.header_end = pos;
        }

        if !self.schema.is_empty() {
            let inference = TypeInference::new(&self.options, &self.cfg);
            let types =
                inference.infer_from_sample(&data[self.header_end..], self.schema.len());
            for (col, dtype) in self.schema.iter_mut().zip(types) {
                col.dtype = dtype;
            }
            debug!(
                "inferred schema: {}",
                self.schema
                    .iter()
                    .map(|c| format!("{}:{}", c.name, c.dtype.name()))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        self.source = Some(source);
        self.row_count = 0;
        self.streaming = None;
        Ok(())
    }

    fn parse_header_row(&self, row: &[u8]) -> Vec<String> {
        let mut names = Vec::new();
        for (mut field, needs_escaping) in
            SplitFields::new(row, self.options.separator, self.options.quote, b'\n')
        {
            if field.last() == Some(&b'\r') {
                field = &field[..field.len() - 1];
            }
            if needs_escaping
                && field.len() >= 2
                && field[0] == self.options.quote
                && field[field.len() - 1] == self.options.quote
            {
                field = &field[1..field.len() - 1];
            }
            let unescaped = unescape_quotes(field, self.options.quote, None);
            names.push(String::from_utf8_lossy(&unescaped).into_owned());
        }
        names
    }

    /// Parse everything and return the per-chunk builders.
    pub fn read_all(&mut self) -> Result<ParsedChunks> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| Error::General("open() must be called before read_all()".into()))?;
        let data = source.as_bytes();

        if self.schema.is_empty() {
            return Ok(ParsedChunks::default());
        }

        let data_start = self.header_end;
        let data_size = data.len() - data_start;

        let cache_path = match (&self.options.cache, &self.file_path) {
            (Some(cfg), Some(path)) => Some(IndexCache::compute_path(path, cfg)),
            _ => None,
        };

        // Cache hit: reuse the persisted plan and skip the analysis phase.
        if let (Some(path), Some(src)) = (cache_path.clone(), self.file_path.clone()) {
            if !self.options.force_cache_refresh {
                if let Ok(cached) = IndexCache::load(&path, &src) {
                    if cached.schema.len() == self.schema.len()
                        && cached.header_end_offset == self.header_end as u64
                        && !cached.chunk_boundaries.is_empty()
                    {
                        debug!("index cache hit: {}", path.display());
                        let ranges: Vec<(usize, usize)> = cached
                            .chunk_boundaries
                            .iter()
                            .map(|&(s, e)| (s as usize, e as usize))
                            .collect();
                        let analyses: Vec<DualStateStats> = cached
                            .chunk_analysis
                            .iter()
                            .map(|m| DualStateStats {
                                rows_if_started_outside: m.row_count as usize,
                                rows_if_started_inside: m.row_count as usize,
                                ends_inside_starting_outside: m.ends_inside_starting_outside,
                            })
                            .collect();
                        let mut out = if ranges.len() == 1 {
                            self.read_serial(data, data_start)?
                        } else {
                            self.parse_planned(data, &ranges, analyses)?.0
                        };
                        out.used_cache = true;
                        out.cache_path = Some(path);
                        self.failfast_check()?;
                        return Ok(out);
                    }
                }
            }
        }

        let force_parallel = self.options.chunk_size > 0;
        let ranges = if data_size < PARALLEL_THRESHOLD && !force_parallel {
            vec![(data_start, data.len())]
        } else {
            let target = if self.options.chunk_size > 0 {
                self.options.chunk_size
            } else {
                calculate_chunk_size(data_size, self.schema.len(), self.num_threads)
            };
            plan_chunk_ranges(data, data_start, target, self.options.quote)
        };

        let (out, analyses, states) = if ranges.len() <= 1 {
            let out = self.read_serial(data, data_start)?;
            let meta = DualStateStats {
                rows_if_started_outside: out.total_rows,
                rows_if_started_inside: out.total_rows,
                ends_inside_starting_outside: false,
            };
            (out, vec![meta], vec![false])
        } else {
            debug!(
                "parallel read: {} chunks on {} threads",
                ranges.len(),
                self.num_threads.min(ranges.len())
            );
            let analyses = self.analyze_ranges(data, &ranges)?;
            let (out, states) = self.parse_planned(data, &ranges, analyses.clone())?;
            (out, analyses, states)
        };

        let mut out = out;
        if let (Some(path), Some(src)) = (&cache_path, &self.file_path) {
            let ranges_for_cache: Vec<(usize, usize)> = if ranges.is_empty() {
                vec![(data_start, data.len())]
            } else {
                ranges.clone()
            };
            let index = self.build_cache_index(data, &ranges_for_cache, &analyses, &states, &out);
            if let Err(e) = IndexCache::write_atomic(path, &index, src) {
                debug!("index cache write failed: {e}");
            } else {
                out.cache_path = Some(path.clone());
            }
        }

        self.failfast_check()?;
        Ok(out)
    }

    /// Streaming API: run analysis synchronously, then dispatch chunk
    /// parsing to the pool. Chunks are fetched in order with
    /// [`CsvReader::next_chunk`].
    pub fn start_streaming(&mut self) -> Result<()> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| Error::General("open() must be called before streaming".into()))?;
        let data = source.as_bytes();
        let data_start = self.header_end;
        let data_size = data.len().saturating_sub(data_start);

        let ranges: Vec<(usize, usize)> = if self.schema.is_empty() || data_size == 0 {
            Vec::new()
        } else {
            let target = if self.options.chunk_size > 0 {
                self.options.chunk_size
            } else {
                calculate_chunk_size(data_size, self.schema.len(), self.num_threads)
            };
            plan_chunk_ranges(data, data_start, target, self.options.quote)
        };
        let n = ranges.len();

        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.num_threads.min(n.max(1)))
                .build()
                .map_err(|e| Error::General(format!("cannot build thread pool: {e}")))?,
        );

        let analyses: Vec<DualStateStats> = pool.install(|| {
            ranges
                .par_iter()
                .map(|&(s, e)| analyze_chunk_dual_state(&data[s..e], self.options.quote))
                .collect()
        });
        let states = link_starting_states(&analyses);
        let last_chunk_unclosed = n > 0 && chunk_ends_inside(&analyses[n - 1], states[n - 1]);

        let queue = Arc::new(ParsedChunkQueue::new(n, DEFAULT_MAX_BUFFERED));
        let collectors: Arc<Mutex<Vec<Option<ErrorCollector>>>> =
            Arc::new(Mutex::new((0..n).map(|_| None).collect()));
        let ctx = Arc::new(WorkerCtx {
            options: self.options.clone(),
            cfg: self.cfg.clone(),
            schema: self.schema.clone(),
        });

        for (i, &(chunk_start, chunk_end)) in ranges.iter().enumerate() {
            let source = Arc::clone(&source);
            let ctx = Arc::clone(&ctx);
            let queue = Arc::clone(&queue);
            let collectors = Arc::clone(&collectors);
            let start_inside = states[i];
            let expected = expected_rows(&analyses[i], states[i]);
            pool.spawn_fifo(move || {
                let data = source.as_bytes();
                let mut columns: Vec<ColumnBuilder> = ctx
                    .schema
                    .iter()
                    .map(|c| {
                        let mut b = ColumnBuilder::create(c.dtype);
                        b.reserve(expected);
                        b
                    })
                    .collect();
                let mut collector =
                    ErrorCollector::new(ctx.options.error_mode, ctx.options.max_errors);
                let job = ChunkJob {
                    data,
                    chunk_start,
                    chunk_end,
                    start_inside_quote: start_inside,
                    first_row_number: None,
                    is_final_chunk: false,
                };
                parse_chunk(&job, &ctx.options, &ctx.cfg, &mut columns, &mut collector);
                if let Ok(mut slots) = collectors.lock() {
                    slots[i] = Some(collector);
                }
                queue.push(i, columns);
            });
        }

        let last_range_start = ranges.last().map(|r| r.0).unwrap_or(0);
        self.streaming = Some(StreamingState {
            queue,
            collectors,
            _pool: pool,
            last_chunk_unclosed,
            last_range_start,
            merged: false,
        });
        Ok(())
    }

    /// Next parsed chunk in source order, or `None` when the stream is
    /// exhausted (at which point collected errors are merged and visible
    /// through [`CsvReader::errors`]).
    pub fn next_chunk(&mut self) -> Option<Vec<ColumnBuilder>> {
        let popped = self.streaming.as_ref()?.queue.pop();
        match popped {
            Some(columns) => {
                if let Some(first) = columns.first() {
                    self.row_count += first.len();
                }
                Some(columns)
            }
            None => {
                self.finish_streaming();
                None
            }
        }
    }

    fn finish_streaming(&mut self) {
        let (collected, last_unclosed, last_start) = {
            let Some(st) = self.streaming.as_mut() else {
                return;
            };
            if st.merged {
                return;
            }
            st.merged = true;
            let mut collected = Vec::new();
            if let Ok(mut slots) = st.collectors.lock() {
                for slot in slots.iter_mut() {
                    collected.push(slot.take().unwrap_or_else(ErrorCollector::disabled));
                }
            }
            (collected, st.last_chunk_unclosed, st.last_range_start)
        };
        let mut collected = collected;
        if last_unclosed {
            if let Some(last) = collected.last_mut() {
                last.add(
                    ErrorCode::UnclosedQuote,
                    ErrorSeverity::Recoverable,
                    0,
                    0,
                    last_start as u64,
                    "quoted field not closed before end of data",
                );
            }
        }
        self.collector.merge_in_order(collected);
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn read_serial(&mut self, data: &[u8], data_start: usize) -> Result<ParsedChunks> {
        let mut columns: Vec<ColumnBuilder> = self
            .schema
            .iter()
            .map(|c| ColumnBuilder::create(c.dtype))
            .collect();
        let job = ChunkJob {
            data,
            chunk_start: data_start,
            chunk_end: data.len(),
            start_inside_quote: false,
            first_row_number: Some(if self.options.has_header { 2 } else { 1 }),
            is_final_chunk: true,
        };
        let rows = parse_chunk(
            &job,
            &self.options,
            &self.cfg,
            &mut columns,
            &mut self.collector,
        );
        self.row_count = rows;
        Ok(ParsedChunks {
            chunks: vec![columns],
            total_rows: rows,
            used_cache: false,
            cache_path: None,
        })
    }

    fn analyze_ranges(
        &self,
        data: &[u8],
        ranges: &[(usize, usize)],
    ) -> Result<Vec<DualStateStats>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads.min(ranges.len()))
            .build()
            .map_err(|e| Error::General(format!("cannot build thread pool: {e}")))?;
        let quote = self.options.quote;
        Ok(pool.install(|| {
            ranges
                .par_iter()
                .map(|&(s, e)| analyze_chunk_dual_state(&data[s..e], quote))
                .collect()
        }))
    }

    /// Phase 3: parse every range once with its resolved starting state.
    fn parse_planned(
        &mut self,
        data: &[u8],
        ranges: &[(usize, usize)],
        analyses: Vec<DualStateStats>,
    ) -> Result<(ParsedChunks, Vec<bool>)> {
        let states = link_starting_states(&analyses);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads.min(ranges.len()))
            .build()
            .map_err(|e| Error::General(format!("cannot build thread pool: {e}")))?;

        let options = &self.options;
        let cfg = &self.cfg;
        let schema = &self.schema;
        let mode = self.collector.mode();
        let max_errors = self.collector.max_errors();
        let analyses_ref = &analyses;
        let states_ref = &states;

        let results: Vec<(Vec<ColumnBuilder>, usize, ErrorCollector)> = pool.install(|| {
            ranges
                .par_iter()
                .enumerate()
                .map(|(i, &(chunk_start, chunk_end))| {
                    let mut columns: Vec<ColumnBuilder> = schema
                        .iter()
                        .map(|c| {
                            let mut b = ColumnBuilder::create(c.dtype);
                            b.reserve(expected_rows(&analyses_ref[i], states_ref[i]));
                            b
                        })
                        .collect();
                    let mut collector = ErrorCollector::new(mode, max_errors);
                    let job = ChunkJob {
                        data,
                        chunk_start,
                        chunk_end,
                        start_inside_quote: states_ref[i],
                        first_row_number: None,
                        is_final_chunk: false,
                    };
                    let rows = parse_chunk(&job, options, cfg, &mut columns, &mut collector);
                    (columns, rows, collector)
                })
                .collect()
        });

        let mut chunks = Vec::with_capacity(results.len());
        let mut collectors = Vec::with_capacity(results.len());
        let mut total_rows = 0usize;
        for (columns, rows, collector) in results {
            total_rows += rows;
            chunks.push(columns);
            collectors.push(collector);
        }

        if self.collector.is_enabled() {
            let last = ranges.len() - 1;
            if chunk_ends_inside(&analyses[last], states[last]) {
                if let Some(c) = collectors.last_mut() {
                    c.add(
                        ErrorCode::UnclosedQuote,
                        ErrorSeverity::Recoverable,
                        0,
                        0,
                        ranges[last].0 as u64,
                        "quoted field not closed before end of data",
                    );
                }
            }
        }
        self.collector.merge_in_order(collectors);
        self.row_count = total_rows;

        Ok((
            ParsedChunks {
                chunks,
                total_rows,
                used_cache: false,
                cache_path: None,
            },
            states,
        ))
    }

    fn build_cache_index(
        &self,
        data: &[u8],
        ranges: &[(usize, usize)],
        analyses: &[DualStateStats],
        states: &[bool],
        out: &ParsedChunks,
    ) -> CachedIndex {
        let chunk_analysis = analyses
            .iter()
            .zip(states.iter())
            .map(|(a, &inside)| ChunkMeta {
                row_count: expected_rows(a, inside) as u32,
                ends_inside_starting_outside: a.ends_inside_starting_outside,
            })
            .collect();
        let starts: Vec<u64> = ranges.iter().map(|&(s, _)| s as u64).collect();
        CachedIndex {
            source_mtime: 0,
            source_size: 0,
            header_end_offset: self.header_end as u64,
            total_rows: out.total_rows as u64,
            sample_interval: self
                .options
                .cache
                .as_ref()
                .map(|c| c.sample_interval)
                .unwrap_or(32),
            schema: self.schema.clone(),
            chunk_boundaries: ranges.iter().map(|&(s, e)| (s as u64, e as u64)).collect(),
            chunk_analysis,
            sampled_offsets: EliasFano::encode(&starts, data.len().max(1) as u64),
        }
    }

    fn failfast_check(&self) -> Result<()> {
        if self.options.error_mode == ErrorMode::FailFast {
            if let Some(e) = self
                .collector
                .errors()
                .iter()
                .find(|e| e.severity >= ErrorSeverity::Recoverable)
            {
                return Err(Error::ParseError(e.to_string()));
            }
        }
        Ok(())
    }
}

/// Quote-aware separator count over the first row.
fn count_columns(row: &[u8], separator: u8, quote: u8) -> usize {
    let mut in_quote = false;
    let mut count = 1usize;
    let mut i = 0usize;
    while i < row.len() {
        let c = row[i];
        if quote != 0 && c == quote {
            if in_quote && i + 1 < row.len() && row[i + 1] == quote {
                i += 2;
                continue;
            }
            in_quote = !in_quote;
        } else if c == separator && !in_quote {
            count += 1;
        }
        i += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(opts: CsvOptions) -> CsvReader {
        CsvReader::new(opts)
    }

    fn open_str(opts: CsvOptions, data: &str) -> CsvReader {
        let mut r = reader(opts);
        r.open_from_buffer(data.as_bytes().to_vec()).unwrap();
        r
    }

    #[test]
    fn header_names_and_types() {
        let r = open_str(CsvOptions::default(), "a,b\n1,2\n3,4\n");
        let schema = r.schema();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].name, "a");
        assert_eq!(schema[1].name, "b");
        assert_eq!(schema[0].dtype, DataType::Int32);
    }

    #[test]
    fn quoted_header_names_unescaped() {
        let r = open_str(CsvOptions::default(), "\"col, one\",\"say \"\"hi\"\"\"\nx,y\n");
        assert_eq!(r.schema()[0].name, "col, one");
        assert_eq!(r.schema()[1].name, "say \"hi\"");
    }

    #[test]
    fn headerless_names_are_generated() {
        let opts = CsvOptions::builder().set_has_header(false).build();
        let r = open_str(opts, "1,2,3\n");
        let names: Vec<&str> = r.schema().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["V1", "V2", "V3"]);
    }

    #[test]
    fn comment_lines_skipped_before_header() {
        let opts = CsvOptions::builder().set_comment(b'#').build();
        let r = open_str(opts, "# leading comment\n# another\na,b\n1,2\n");
        assert_eq!(r.schema()[0].name, "a");
    }

    #[test]
    fn empty_input_without_header_is_empty() {
        let opts = CsvOptions::builder().set_has_header(false).build();
        let mut r = reader(opts);
        r.open_from_buffer(Vec::new()).unwrap();
        let out = r.read_all().unwrap();
        assert_eq!(out.total_rows, 0);
        assert!(!r.has_errors());
    }

    #[test]
    fn empty_input_with_required_header_reports() {
        let opts = CsvOptions::builder()
            .set_error_mode(ErrorMode::Permissive)
            .build();
        let mut r = reader(opts);
        r.open_from_buffer(Vec::new()).unwrap();
        assert_eq!(r.errors().len(), 1);
        assert_eq!(r.errors()[0].code, ErrorCode::EmptyHeader);
    }

    #[test]
    fn duplicate_header_names_warn() {
        let opts = CsvOptions::builder()
            .set_error_mode(ErrorMode::Permissive)
            .build();
        let r = open_str(opts, "x,x\n1,2\n");
        assert_eq!(r.errors().len(), 1);
        assert_eq!(r.errors()[0].code, ErrorCode::DuplicateColumnNames);
        assert_eq!(r.errors()[0].severity, ErrorSeverity::Warning);
    }

    #[test]
    fn count_columns_respects_quotes() {
        assert_eq!(count_columns(b"a,b,c", b',', b'"'), 3);
        assert_eq!(count_columns(b"\"a,b\",c", b',', b'"'), 2);
        assert_eq!(count_columns(b"\"a\"\",b\",c", b',', b'"'), 2);
        assert_eq!(count_columns(b"a", b',', b'"'), 1);
    }

    #[test]
    fn read_all_small_serial() {
        let mut r = open_str(CsvOptions::default(), "a,b\n1,2\n3,4\n");
        let out = r.read_all().unwrap();
        assert_eq!(out.total_rows, 2);
        assert_eq!(out.chunks.len(), 1);
        assert_eq!(r.row_count(), 2);
    }

    #[test]
    fn chunked_read_matches_serial() {
        // Force tiny chunks so the parallel plan runs on a small input.
        let mut body = String::from("a,b\n");
        for i in 0..200 {
            body.push_str(&format!("{i},{}\n", i * 2));
        }
        let serial = {
            let mut r = open_str(CsvOptions::default(), &body);
            r.read_all().unwrap()
        };
        let chunked = {
            let opts = CsvOptions::builder().set_chunk_size(64).build();
            let mut r = open_str(opts, &body);
            r.read_all().unwrap()
        };
        assert!(chunked.chunks.len() > 1);
        assert_eq!(serial.total_rows, chunked.total_rows);

        let flat = |p: &ParsedChunks| -> Vec<i32> {
            let mut v = Vec::new();
            for chunk in &p.chunks {
                if let ColumnBuilder::Int32 { values, .. } = &chunk[0] {
                    v.extend_from_slice(values);
                }
            }
            v
        };
        assert_eq!(flat(&serial), flat(&chunked));
    }

    #[test]
    fn streaming_delivers_in_order() {
        let mut body = String::from("v\n");
        for i in 0..500 {
            body.push_str(&format!("{i}\n"));
        }
        let opts = CsvOptions::builder().set_chunk_size(32).build();
        let mut r = open_str(opts, &body);
        r.start_streaming().unwrap();
        let mut seen = Vec::new();
        while let Some(chunk) = r.next_chunk() {
            if let ColumnBuilder::Int32 { values, .. } = &chunk[0] {
                seen.extend_from_slice(values);
            }
        }
        let expect: Vec<i32> = (0..500).collect();
        assert_eq!(seen, expect);
        assert_eq!(r.row_count(), 500);
    }
}
