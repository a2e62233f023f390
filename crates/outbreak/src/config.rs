//! Pipeline configuration.
//!
//! Every field has a default, so a JSON configuration file only needs the
//! keys it overrides. `split_boundary` has no default and must be set
//! before the configuration validates.

use crate::error::{PipelineError, Result};
use outbreak_data::{ColumnNames, TimeBoundary};
use outbreak_features::{LabelWindow, LagFeatureBuilder, OutbreakLabeler, SequenceWindower};
use outbreak_model::{LstmConfig, TrainerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A covariate CSV joined onto the input frame by `(entity, time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Name used in logs
    pub name: String,
    /// CSV file with the entity and time key columns
    pub path: PathBuf,
}

impl FromStr for SourceConfig {
    type Err = PipelineError;

    /// Parse `name=path`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok(Self {
                name: name.to_string(),
                path: PathBuf::from(path),
            }),
            _ => Err(PipelineError::Config(format!(
                "expected a source as name=path, got '{s}'"
            ))),
        }
    }
}

/// Settings of an end-to-end run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Names of the key, target and label columns
    pub columns: ColumnNames,
    /// Covariate files joined onto the input, in order
    pub sources: Vec<SourceConfig>,
    /// Rows per window
    pub window_length: usize,
    /// Lag depths of the target signal
    pub lag_depths: Vec<usize>,
    /// Standard deviations above the mean that mark an outbreak
    pub label_z_multiplier: f64,
    /// Rows the labeling statistics are computed over
    pub label_window: LabelWindow,
    /// Recompute labels even when the input already has a label column
    pub relabel: bool,
    /// Last time key of the training pool
    pub split_boundary: Option<TimeBoundary>,
    /// Last time key of the validation pool; later rows form the test pool
    pub test_boundary: Option<TimeBoundary>,
    /// Initial learning rate
    pub learning_rate: f64,
    /// Maximum number of epochs
    pub max_epochs: usize,
    /// Early stopping patience, in epochs
    pub patience: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Epochs without improvement before the learning rate is halved
    pub lr_plateau_patience: usize,
    /// Seed for shuffling and dropout
    pub seed: u64,
    /// Classifier architecture
    pub model: LstmConfig,
    /// Where the best checkpoint is written
    pub checkpoint_path: PathBuf,
    /// Continue from an existing checkpoint instead of starting over
    pub resume: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let trainer = TrainerConfig::default();
        Self {
            columns: ColumnNames::default(),
            sources: Vec::new(),
            window_length: 3,
            lag_depths: vec![1, 2, 3],
            label_z_multiplier: 1.0,
            label_window: LabelWindow::default(),
            relabel: false,
            split_boundary: None,
            test_boundary: None,
            learning_rate: trainer.learning_rate,
            max_epochs: trainer.max_epochs,
            patience: trainer.patience,
            batch_size: trainer.batch_size,
            lr_plateau_patience: trainer.lr_plateau_patience,
            seed: trainer.seed,
            model: LstmConfig::default(),
            checkpoint_path: PathBuf::from("models/outbreak_classifier.json"),
            resume: false,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PipelineError::ConfigFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every setting, including those validated by the stages.
    pub fn validate(&self) -> Result<()> {
        self.split_boundary()?;
        self.windower()?;
        self.lag_builder()?;
        self.labeler()?;
        self.trainer_config().validate()?;
        self.model.validate()?;
        Ok(())
    }

    /// The training boundary, which has no default.
    pub fn split_boundary(&self) -> Result<TimeBoundary> {
        self.split_boundary
            .ok_or_else(|| PipelineError::Config("split_boundary is required".to_string()))
    }

    /// Trainer hyperparameters.
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            learning_rate: self.learning_rate,
            max_epochs: self.max_epochs,
            patience: self.patience,
            batch_size: self.batch_size,
            lr_plateau_patience: self.lr_plateau_patience,
            seed: self.seed,
            ..TrainerConfig::default()
        }
    }

    /// Configured outbreak labeler.
    pub fn labeler(&self) -> Result<OutbreakLabeler> {
        Ok(OutbreakLabeler::new(self.label_z_multiplier, self.label_window)?)
    }

    /// Configured lag builder.
    pub fn lag_builder(&self) -> Result<LagFeatureBuilder> {
        Ok(LagFeatureBuilder::new(self.lag_depths.clone())?)
    }

    /// Configured windower, inferring features from the frame.
    pub fn windower(&self) -> Result<SequenceWindower> {
        Ok(SequenceWindower::new(self.window_length)?)
    }
}
