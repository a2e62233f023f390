//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur while loading or validating feature frames.
#[derive(Debug, Error)]
pub enum DataError {
    /// A required column is not present in the frame
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A column has a type the pipeline cannot interpret
    #[error("Column {column} has unsupported type {dtype}")]
    InvalidColumnType {
        /// Column name
        column: String,
        /// Observed data type
        dtype: String,
    },

    /// The (entity, time) natural key is not unique
    #[error("Found {count} duplicated (entity, time) keys")]
    DuplicateKeys {
        /// Number of duplicated key groups
        count: usize,
    },

    /// A time boundary cannot be applied to the frame's time column
    #[error("Invalid time boundary: {0}")]
    InvalidBoundary(String),

    /// Missing data
    #[error("Missing data from {source_name}: {reason}")]
    MissingData {
        /// Feature source that was queried
        source_name: String,
        /// Reason for missing data
        reason: String,
    },

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
