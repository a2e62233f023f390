//! Error types for feature stages.

use outbreak_data::DataError;
use thiserror::Error;

/// Result type for feature stages.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Errors raised while deriving features, labels, splits or windows.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Schema drift, missing feature values or insufficient rows
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// A time boundary leaves a pool without rows
    #[error("Split produced an empty {pool} pool (boundary {boundary})")]
    EmptySplit {
        /// Pool name (train, validation or test)
        pool: String,
        /// Boundary that produced the empty pool
        boundary: String,
    },

    /// Invalid stage configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame validation or IO error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
