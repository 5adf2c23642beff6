//! Error types for u-attribution.
//!
//! Degenerate inputs to the two core functions (missing columns, empty
//! partitions, non-finite numbers) are not errors: they yield an absent
//! summary or `null`. [`AttributionError`] covers everything that *can* fail:
//! loading data, fitting a model, persisting snapshots, reading config.

use thiserror::Error;

/// All errors produced by u-attribution operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttributionError {
    /// CSV parsing failed.
    #[error("CSV parse error at line {line}: {message}")]
    CsvParse { line: usize, message: String },

    /// A named column is not part of the dataset.
    #[error("column '{name}' not found")]
    ColumnNotFound { name: String },

    /// Column lengths disagree.
    #[error("expected {expected} elements, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Not enough complete rows for the requested operation.
    #[error("need at least {min_required} rows, got {actual}")]
    InsufficientData { min_required: usize, actual: usize },

    /// The regression design matrix is rank deficient.
    #[error("design matrix is singular: {reason}")]
    SingularDesign { reason: String },

    /// File extension the loader cannot read.
    #[error("unsupported file format '{filename}': upload CSV data")]
    UnsupportedFormat { filename: String },

    /// A session operation needs a dataset and none is loaded.
    #[error("no dataset loaded")]
    NoDataset,

    /// Snapshot store read or write failed.
    #[error("snapshot store: {0}")]
    Snapshot(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse config {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Configuration value out of range.
    #[error("invalid config value for {field}: {message}")]
    ConfigInvalid { field: String, message: String },

    /// I/O error while reading or writing files.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for AttributionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AttributionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
