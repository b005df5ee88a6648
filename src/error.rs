//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::record::RecordId;

/// Convenient result type used throughout the crate.
pub type Result<T, E = TriploError> = std::result::Result<T, E>;

/// Domain-specific error describing failures during ingest, import, configuration, or generation.
///
/// Every variant is recoverable: callers report it and keep the session alive.
#[derive(Debug, Error)]
pub enum TriploError {
    /// The input payload is not text.
    #[error("input is not text: {0}")]
    InputType(String),
    /// The input table does not contain a header and at least one data row.
    #[error("input table has the wrong shape: {0}")]
    InputShape(String),
    /// An alias or training-set payload could not be parsed; prior state is unchanged.
    #[error("failed to import payload: {0}")]
    ImportParse(String),
    /// Pipeline configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A record carries more distinct tokens than subset generation allows.
    #[error("record {record} has {tokens} distinct tokens, above the subset limit of {limit}")]
    SubsetLimit {
        /// Offending record.
        record: RecordId,
        /// Number of distinct word/alias tokens in the record.
        tokens: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Serialization failure while exporting a payload.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for TriploError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for TriploError {
    fn from(err: csv::Error) -> Self {
        Self::InputShape(err.to_string())
    }
}

impl TriploError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Wraps a JSON parse failure raised while importing a payload.
    pub(crate) fn import(err: serde_json::Error) -> Self {
        Self::ImportParse(err.to_string())
    }
}
