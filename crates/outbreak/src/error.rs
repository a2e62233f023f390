//! Error type of the end-to-end pipeline.

use outbreak_data::DataError;
use outbreak_features::FeatureError;
use outbreak_model::ModelError;
use outbreak_output::{ExportError, ReportError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while configuring or running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("Cannot read configuration {}: {source}", .path.display())]
    ConfigIo {
        /// Configuration path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for a configuration
    #[error("Invalid configuration file {}: {source}", .path.display())]
    ConfigFormat {
        /// Configuration path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A resumed checkpoint was trained on different features
    #[error("Checkpoint features {checkpoint:?} do not match frame features {frame:?}")]
    SchemaMismatch {
        /// Feature columns stored in the checkpoint
        checkpoint: Vec<String>,
        /// Feature columns of the current frame
        frame: Vec<String>,
    },

    /// Data loading or validation error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Feature stage error
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Training, checkpoint or evaluation error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Export error
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Report error
    #[error(transparent)]
    Report(#[from] ReportError),
}
