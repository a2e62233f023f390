//! Error types for training, checkpointing and evaluation.

use outbreak_features::FeatureError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by the classifier, trainer and evaluator.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Input sequences do not match the model's expected shape
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// Invalid hyperparameter or model configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No windows to train or evaluate on
    #[error("No windows in the {0} set")]
    EmptyWindows(String),

    /// The training loss stopped being finite
    #[error("Training diverged at epoch {epoch}: loss is {loss}")]
    Diverged {
        /// Epoch at which the loss became non-finite
        epoch: usize,
        /// Observed loss
        loss: f64,
    },

    /// Checkpoint file could not be read or written
    #[error("Checkpoint IO error at {}: {source}", .path.display())]
    CheckpointIo {
        /// Checkpoint path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file is not a valid checkpoint
    #[error("Invalid checkpoint at {}: {source}", .path.display())]
    CheckpointFormat {
        /// Checkpoint path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Feature scaling or windowing error
    #[error(transparent)]
    Feature(#[from] FeatureError),
}
