use std::{
    fmt::{Display, Formatter},
    io, result,
};

use arrow_schema::ArrowError;
use parquet::errors::ParquetError;
use snafu::Location;

/// Derived from parquet-rs
#[derive(Debug)]
pub enum Error {
    /// General error.
    /// Returned when code violates normal workflow of working with files.
    General(String),
    /// "Not yet implemented" error.
    /// Returned when functionality is not yet available.
    NYI(String),
    /// "End of file" error.
    /// Returned when IO related failures occur, e.g. when there are not enough bytes to
    /// decode.
    EOF(String),
    /// Input byte stream could not be decoded or transcoded to UTF-8.
    Encoding(String),
    /// Malformed header or cache index.
    ParseError(String),
    IO(String, Location),
    /// An external error variant
    External(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = result::Result<T, E>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::External(Box::new(e))
    }
}

impl From<ArrowError> for Error {
    fn from(e: ArrowError) -> Error {
        Error::External(Box::new(e))
    }
}

impl From<ParquetError> for Error {
    fn from(e: ParquetError) -> Error {
        Error::External(Box::new(e))
    }
}

/// Create a "Not Yet Implemented" error with a message
pub fn nyi_err<T>(msg: impl Into<String>) -> Error {
    Error::NYI(msg.into())
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::General(source) => write!(f, "General error: {}", source),
            Error::NYI(source) => write!(f, "Not yet implemented: {}", source),
            Error::EOF(source) => write!(f, "End of file: {}", source),
            Error::Encoding(source) => write!(f, "Encoding error: {}", source),
            Error::ParseError(source) => write!(f, "Parse error: {}", source),
            Error::IO(source, location) => write!(f, "IO error: {} at {}", source, location),
            Error::External(source) => write!(f, "External error: {}", source),
        }
    }
}

impl std::error::Error for Error {}

/// A macro to simplify common error handling patterns
#[macro_export]
macro_rules! general_error {
    ($msg:expr) => {
        $crate::errors::Error::General($msg.into())
    };
    ($msg:expr, $err:expr) => {
        $crate::errors::Error::General(format!("{}: {}", $msg, $err))
    };
}

/// A macro to simplify "Not Yet Implemented" error handling patterns
#[macro_export]
macro_rules! nyi_err {
    ($msg:expr) => {
        Err($crate::errors::Error::NYI($msg.into()))
    };
}
