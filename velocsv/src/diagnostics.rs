//! Parse-time error taxonomy and collection.
//!
//! Data-level problems (stray quotes, ragged rows, unclosed quotes, ...) do
//! not abort the reader; they are recorded per chunk and merged in chunk
//! order once all workers join. API-level failures use
//! [`velocsv_core::errors::Error`] instead.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NullByte,
    QuoteInUnquotedField,
    InvalidQuoteEscape,
    UnclosedQuote,
    InconsistentFieldCount,
    DuplicateColumnNames,
    EmptyHeader,
    FieldTooLarge,
    EncodingError,
}

impl ErrorCode {
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::NullByte => "NULL_BYTE",
            ErrorCode::QuoteInUnquotedField => "QUOTE_IN_UNQUOTED_FIELD",
            ErrorCode::InvalidQuoteEscape => "INVALID_QUOTE_ESCAPE",
            ErrorCode::UnclosedQuote => "UNCLOSED_QUOTE",
            ErrorCode::InconsistentFieldCount => "INCONSISTENT_FIELD_COUNT",
            ErrorCode::DuplicateColumnNames => "DUPLICATE_COLUMN_NAMES",
            ErrorCode::EmptyHeader => "EMPTY_HEADER",
            ErrorCode::FieldTooLarge => "FIELD_TOO_LARGE",
            ErrorCode::EncodingError => "ENCODING_ERROR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Warning,
    Recoverable,
    Fatal,
}

/// Error collection policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// No collection; recoverable problems degrade to nulls silently.
    #[default]
    Disabled,
    /// Collect up to `max_errors`, keep parsing.
    Permissive,
    /// Stop at the first non-warning error.
    FailFast,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub code: ErrorCode,
    pub severity: ErrorSeverity,
    /// 1-based row number; 0 when unknown (multi-threaded chunk parsing does
    /// not track absolute row offsets).
    pub row: u64,
    /// 1-based column number; 0 when the error covers the whole row.
    pub column: u64,
    pub byte_offset: u64,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at row {} col {} (byte {}): {}",
            self.code.name(),
            self.row,
            self.column,
            self.byte_offset,
            self.message
        )
    }
}

/// Per-chunk error sink. Each parser worker owns exactly one; the reader
/// merges them in chunk order after the workers join.
#[derive(Clone, Debug)]
pub struct ErrorCollector {
    mode: ErrorMode,
    max_errors: usize,
    errors: Vec<ParseError>,
    dropped: usize,
    saw_fatal: bool,
}

pub const DEFAULT_MAX_ERRORS: usize = 1000;

impl ErrorCollector {
    pub fn new(mode: ErrorMode, max_errors: usize) -> Self {
        Self {
            mode,
            max_errors,
            errors: Vec::new(),
            dropped: 0,
            saw_fatal: false,
        }
    }

    pub fn disabled() -> Self {
        Self::new(ErrorMode::Disabled, 0)
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != ErrorMode::Disabled
    }

    pub fn add(
        &mut self,
        code: ErrorCode,
        severity: ErrorSeverity,
        row: u64,
        column: u64,
        byte_offset: u64,
        message: impl Into<String>,
    ) {
        if self.mode == ErrorMode::Disabled {
            return;
        }
        if severity == ErrorSeverity::Fatal {
            self.saw_fatal = true;
        }
        if self.errors.len() >= self.max_errors {
            self.dropped += 1;
            return;
        }
        self.errors.push(ParseError {
            code,
            severity,
            row,
            column,
            byte_offset,
            message: message.into(),
        });
    }

    /// Whether the current worker should abandon its chunk.
    pub fn should_stop(&self) -> bool {
        match self.mode {
            ErrorMode::Disabled => false,
            ErrorMode::Permissive => self.saw_fatal,
            ErrorMode::FailFast => self
                .errors
                .last()
                .map(|e| e.severity >= ErrorSeverity::Recoverable)
                .unwrap_or(false),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.saw_fatal
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Fold per-chunk collectors into this one, preserving chunk order.
    pub fn merge_in_order<I: IntoIterator<Item = ErrorCollector>>(&mut self, collectors: I) {
        for c in collectors {
            self.saw_fatal |= c.saw_fatal;
            self.dropped += c.dropped;
            for e in c.errors {
                if self.errors.len() >= self.max_errors {
                    self.dropped += 1;
                    continue;
                }
                self.errors.push(e);
            }
        }
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.dropped = 0;
        self.saw_fatal = false;
    }
}
