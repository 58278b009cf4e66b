//! Error types for matrix-factorization training.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for factorization operations.
pub type Result<T> = std::result::Result<T, MfError>;

/// Errors raised while loading data, persisting parameters or training.
#[derive(Debug, Error)]
pub enum MfError {
    /// I/O failure on a named file.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A token could not be parsed as a float.
    #[error("parse error in {path} line {line}: invalid number {token:?}")]
    Parse {
        /// Source of the text (a file path or `<memory>`).
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Offending token.
        token: String,
    },

    /// Two operands that must share a length do not.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// A line carries more values than the record has room for.
    #[error("{path} line {line}: record overflows width {width}")]
    RecordOverflow {
        /// Source file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Configured record width.
        width: usize,
    },

    /// Input ended in the middle of a record.
    #[error("{path}: input ends mid-record ({filled} of {width} values)")]
    TruncatedRecord {
        /// Source file.
        path: PathBuf,
        /// Values read for the pending record.
        filled: usize,
        /// Configured record width.
        width: usize,
    },

    /// Mask entry outside `{0, 1}`.
    #[error("mask entry R[{user}][{item}] = {value} is not 0 or 1")]
    InvalidMask {
        /// User row.
        user: usize,
        /// Item column.
        item: usize,
        /// Offending value.
        value: f32,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Empty input where non-empty was required.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// TOML configuration could not be decoded.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl MfError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn shape(expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch { expected, actual }
    }
}
