//! Checkpoint persistence.
//!
//! A checkpoint holds everything needed to resume training or reproduce
//! inference: model and optimizer state, and the input schema (ordered
//! feature columns, window length, fitted scaler). Writes go to a temporary
//! sibling file which is then renamed over the target, so readers never see a
//! partially written checkpoint.

use crate::error::{ModelError, Result};
use crate::optim::{Adam, PlateauScheduler};
use chrono::{DateTime, Utc};
use outbreak_data::ColumnNames;
use outbreak_features::FeatureScaler;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Input contract of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Column names of the frames the model was trained on
    pub columns: ColumnNames,
    /// Ordered feature columns of each sequence row
    pub feature_columns: Vec<String>,
    /// Rows per sequence
    pub window_length: usize,
    /// Standardization fitted on the training pool
    pub scaler: FeatureScaler,
}

/// Snapshot of a training run at its best epoch so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<C> {
    /// Epoch the snapshot was taken at, starting at 1
    pub epoch: usize,
    /// Model parameters
    pub model: C,
    /// Optimizer state
    pub optimizer: Adam,
    /// Learning-rate schedule state
    pub scheduler: PlateauScheduler,
    /// Input contract
    pub schema: ModelSchema,
    /// Validation loss at `epoch`
    pub validation_loss: f64,
    /// Validation AUC at `epoch`
    pub validation_auc: f64,
    /// When the snapshot was written
    pub created_at: DateTime<Utc>,
}

impl<C> Checkpoint<C> {
    /// Version string reported by serving, `outbreak_v{epoch}`.
    pub fn model_version(&self) -> String {
        format!("outbreak_v{}", self.epoch)
    }
}

impl<C: Serialize> Checkpoint<C> {
    /// Atomically write the checkpoint as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let io_err = |source| ModelError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec(self).map_err(|source| ModelError::CheckpointFormat {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = temp_path(path);
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        tracing::debug!(path = %path.display(), epoch = self.epoch, "checkpoint written");
        Ok(())
    }
}

impl<C: DeserializeOwned> Checkpoint<C> {
    /// Read a checkpoint written by [`Checkpoint::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| ModelError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ModelError::CheckpointFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{LstmClassifier, LstmConfig};
    use tempfile::TempDir;

    fn checkpoint() -> Checkpoint<LstmClassifier> {
        let config = LstmConfig {
            hidden_dim: 4,
            num_layers: 1,
            head_dim: 2,
            dropout: 0.0,
            seed: 1,
        };
        let feature_columns = vec!["target_signal".to_string(), "rainfall".to_string()];
        Checkpoint {
            epoch: 3,
            model: LstmClassifier::new(2, config).unwrap(),
            optimizer: Adam::new(1e-3),
            scheduler: PlateauScheduler::new(0.5, 5).unwrap(),
            schema: ModelSchema {
                columns: ColumnNames::default(),
                scaler: FeatureScaler::from_parts(
                    feature_columns.clone(),
                    vec![10.0, 3.0],
                    vec![2.0, 1.5],
                )
                .unwrap(),
                feature_columns,
                window_length: 3,
            },
            validation_loss: 0.42,
            validation_auc: 0.81,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("outbreak.json");
        let original = checkpoint();
        original.save(&path).unwrap();

        assert!(!temp_path(&path).exists());
        let loaded: Checkpoint<LstmClassifier> = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.epoch, 3);
        assert_eq!(loaded.model, original.model);
        assert_eq!(loaded.schema, original.schema);
        assert_eq!(loaded.model_version(), "outbreak_v3");
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("outbreak.json");
        let mut ckpt = checkpoint();
        ckpt.save(&path).unwrap();
        ckpt.epoch = 7;
        ckpt.validation_loss = 0.3;
        ckpt.save(&path).unwrap();

        let loaded: Checkpoint<LstmClassifier> = Checkpoint::load(&path).unwrap();
        assert_eq!(loaded.epoch, 7);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Checkpoint::<LstmClassifier>::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ModelError::CheckpointIo { .. })));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"epoch\": 1}").unwrap();
        let result = Checkpoint::<LstmClassifier>::load(&path);
        assert!(matches!(result, Err(ModelError::CheckpointFormat { .. })));
    }
}
