//! Reader and writer configuration.

use crate::cache::CacheConfig;
use crate::diagnostics::{ErrorMode, DEFAULT_MAX_ERRORS};

pub const DEFAULT_SAMPLE_ROWS: usize = 1000;
/// Upper bound on `n_chunks * n_cols`; keeps builder allocation in check on
/// very wide files.
pub const ALLOCATION_BUDGET: usize = 500_000;
pub const MIN_CHUNK_SIZE: usize = 1024 * 1024;
pub const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// CSV parsing options.
#[derive(Clone, Debug)]
pub struct CsvOptions {
    /// Field delimiter byte.
    pub separator: u8,
    /// Quote byte; 0 disables quoting.
    pub quote: u8,
    /// Reserved for backslash-style escapes.
    pub escape: u8,
    /// If nonzero, lines beginning with this byte are skipped in the
    /// pre-data region only.
    pub comment: u8,
    pub has_header: bool,
    pub skip_empty_rows: bool,
    /// Comma-separated literals treated as null. An empty token means the
    /// empty string is null.
    pub null_values: String,
    pub true_values: String,
    pub false_values: String,
    /// Rows sampled for type inference.
    pub sample_rows: usize,
    /// Target chunk size in bytes; 0 derives it from file size and width.
    /// A nonzero value also forces the parallel path regardless of file
    /// size, which is how tests exercise chunk boundaries on small inputs.
    pub chunk_size: usize,
    /// 0 = hardware concurrency.
    pub num_threads: usize,
    /// Cap on a single field's byte length; 0 = unlimited.
    pub max_field_size: usize,
    pub error_mode: ErrorMode,
    pub max_errors: usize,
    /// Optional sidecar index cache.
    pub cache: Option<CacheConfig>,
    pub force_cache_refresh: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            quote: b'"',
            escape: b'\\',
            comment: 0,
            has_header: true,
            skip_empty_rows: true,
            null_values: "NA,null,NULL,".to_string(),
            true_values: "true,TRUE,True,yes,YES,Yes".to_string(),
            false_values: "false,FALSE,False,no,NO,No".to_string(),
            sample_rows: DEFAULT_SAMPLE_ROWS,
            chunk_size: 0,
            num_threads: 0,
            max_field_size: 0,
            error_mode: ErrorMode::Disabled,
            max_errors: DEFAULT_MAX_ERRORS,
            cache: None,
            force_cache_refresh: false,
        }
    }
}

impl CsvOptions {
    pub fn builder() -> CsvOptionsBuilder {
        CsvOptionsBuilder::with_defaults()
    }

    /// Threads to use after resolving 0 to the hardware count.
    pub fn resolved_threads(&self) -> usize {
        if self.num_threads > 0 {
            self.num_threads
        } else {
            num_cpus::get().max(1)
        }
    }
}

pub struct CsvOptionsBuilder {
    opts: CsvOptions,
}

impl CsvOptionsBuilder {
    pub fn with_defaults() -> Self {
        Self {
            opts: CsvOptions::default(),
        }
    }

    pub fn build(self) -> CsvOptions {
        self.opts
    }

    pub fn set_separator(mut self, separator: u8) -> Self {
        self.opts.separator = separator;
        self
    }

    pub fn set_quote(mut self, quote: u8) -> Self {
        self.opts.quote = quote;
        self
    }

    pub fn set_comment(mut self, comment: u8) -> Self {
        self.opts.comment = comment;
        self
    }

    pub fn set_has_header(mut self, has_header: bool) -> Self {
        self.opts.has_header = has_header;
        self
    }

    pub fn set_skip_empty_rows(mut self, skip: bool) -> Self {
        self.opts.skip_empty_rows = skip;
        self
    }

    pub fn set_null_values(mut self, null_values: impl Into<String>) -> Self {
        self.opts.null_values = null_values.into();
        self
    }

    pub fn set_true_values(mut self, true_values: impl Into<String>) -> Self {
        self.opts.true_values = true_values.into();
        self
    }

    pub fn set_false_values(mut self, false_values: impl Into<String>) -> Self {
        self.opts.false_values = false_values.into();
        self
    }

    pub fn set_sample_rows(mut self, sample_rows: usize) -> Self {
        self.opts.sample_rows = sample_rows;
        self
    }

    pub fn set_chunk_size(mut self, chunk_size: usize) -> Self {
        self.opts.chunk_size = chunk_size;
        self
    }

    pub fn set_num_threads(mut self, num_threads: usize) -> Self {
        self.opts.num_threads = num_threads;
        self
    }

    pub fn set_max_field_size(mut self, max_field_size: usize) -> Self {
        self.opts.max_field_size = max_field_size;
        self
    }

    pub fn set_error_mode(mut self, mode: ErrorMode) -> Self {
        self.opts.error_mode = mode;
        self
    }

    pub fn set_max_errors(mut self, max_errors: usize) -> Self {
        self.opts.max_errors = max_errors;
        self
    }

    pub fn set_cache(mut self, cache: Option<CacheConfig>) -> Self {
        self.opts.cache = cache;
        self
    }

    pub fn set_force_cache_refresh(mut self, force: bool) -> Self {
        self.opts.force_cache_refresh = force;
        self
    }
}

/// Compression codec for Parquet pages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    None,
    #[default]
    Zstd,
    Snappy,
    Lz4,
    Gzip,
}

/// Parquet writing options.
#[derive(Clone, Debug)]
pub struct ParquetOptions {
    pub compression: Compression,
    pub compression_level: i32,
    /// Target rows per row group when batching numeric-only chunks.
    pub row_group_size: usize,
    pub page_size: usize,
    pub write_statistics: bool,
    pub enable_dictionary: bool,
}

/// Numeric-only chunks are merged until a row group reaches this many rows.
pub const TARGET_ROW_GROUP_SIZE: usize = 512 * 512;

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Zstd,
            compression_level: 3,
            row_group_size: TARGET_ROW_GROUP_SIZE,
            page_size: 1024 * 1024,
            write_statistics: true,
            enable_dictionary: false,
        }
    }
}

/// Chunk-size formula: aim for `threads * 16` chunks, capped so that
/// `n_chunks * n_cols` stays within the allocation budget, then clamp the
/// resulting byte size to [1 MiB, 4 MiB].
pub fn calculate_chunk_size(file_size: usize, n_cols: usize, n_threads: usize) -> usize {
    let max_chunks = ALLOCATION_BUDGET / n_cols.max(1);
    let n_parts = (n_threads * 16).min(max_chunks).max(1);
    (file_size / n_parts).clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}
