//! Serving a trained checkpoint.
//!
//! A [`PredictionService`] is built once at startup with an explicit
//! [`ModelState`] and is read-only afterwards. Without a model every
//! prediction fails with [`ServiceError::NotLoaded`].

use ndarray::Array2;
use outbreak_model::{
    Checkpoint, LstmClassifier, ModelError, ModelSchema, SequenceClassifier,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors returned by the prediction service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No checkpoint is loaded
    #[error("No model loaded")]
    NotLoaded,

    /// Input does not match the checkpoint's schema
    #[error("Invalid input: {0}")]
    DataShape(String),

    /// Checkpoint loading or inference error
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Model held by the service.
#[derive(Debug, Clone, Default)]
pub enum ModelState {
    /// No checkpoint available
    #[default]
    Unloaded,
    /// A trained checkpoint
    Loaded(Box<Checkpoint<LstmClassifier>>),
}

/// Coarse risk bucket of a 0-100 risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Score below 33
    Low,
    /// Score from 33 to below 66
    Moderate,
    /// Score of 66 and above
    High,
}

impl RiskLevel {
    /// Bucket a risk score.
    pub fn from_score(score: f64) -> Self {
        if score < 33.0 {
            Self::Low
        } else if score < 66.0 {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Outbreak risk of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Outbreak probability
    pub probability: f64,
    /// `100 * probability`
    pub risk_score: f64,
    /// Bucket of the risk score
    pub risk_level: RiskLevel,
    /// Version of the model that produced the prediction
    pub model_version: String,
}

impl Prediction {
    fn from_probability(probability: f64, model_version: String) -> Self {
        let risk_score = 100.0 * probability;
        Self {
            probability,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            model_version,
        }
    }
}

/// Outbreak risk predictions from a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct PredictionService {
    state: ModelState,
}

impl PredictionService {
    /// Service over an explicit model state.
    pub const fn new(state: ModelState) -> Self {
        Self { state }
    }

    /// Service serving a checkpoint.
    pub fn from_checkpoint(checkpoint: Checkpoint<LstmClassifier>) -> Self {
        Self::new(ModelState::Loaded(Box::new(checkpoint)))
    }

    /// Service serving the checkpoint stored at `path`.
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let checkpoint = Checkpoint::load(path)?;
        tracing::info!(
            path = %path.display(),
            version = %checkpoint.model_version(),
            "model loaded"
        );
        Ok(Self::from_checkpoint(checkpoint))
    }

    /// Current model state.
    pub const fn state(&self) -> &ModelState {
        &self.state
    }

    /// Whether a checkpoint is loaded.
    pub const fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    /// Version of the loaded model.
    pub fn model_version(&self) -> Option<String> {
        self.checkpoint().ok().map(|c| c.model_version())
    }

    /// Input contract of the loaded model.
    pub fn schema(&self) -> Option<&ModelSchema> {
        self.checkpoint().ok().map(|c| &c.schema)
    }

    fn checkpoint(&self) -> Result<&Checkpoint<LstmClassifier>, ServiceError> {
        match &self.state {
            ModelState::Loaded(checkpoint) => Ok(checkpoint.as_ref()),
            ModelState::Unloaded => Err(ServiceError::NotLoaded),
        }
    }

    /// Risk of one raw (unscaled) `window_length x features` sequence whose
    /// columns follow the schema's feature order.
    pub fn predict(&self, sequence: &Array2<f64>) -> Result<Prediction, ServiceError> {
        self.predict_batch(std::slice::from_ref(sequence))?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::DataShape("no prediction produced".to_string()))
    }

    /// Risk of many raw sequences, in input order.
    pub fn predict_batch(&self, sequences: &[Array2<f64>]) -> Result<Vec<Prediction>, ServiceError> {
        let checkpoint = self.checkpoint()?;
        if sequences.is_empty() {
            return Ok(Vec::new());
        }
        let schema = &checkpoint.schema;
        let expected = (schema.window_length, schema.feature_columns.len());

        let mut scaled = Vec::with_capacity(sequences.len());
        for (i, sequence) in sequences.iter().enumerate() {
            if sequence.dim() != expected {
                return Err(ServiceError::DataShape(format!(
                    "sequence {i} is {} x {}, expected {} x {}",
                    sequence.nrows(),
                    sequence.ncols(),
                    expected.0,
                    expected.1
                )));
            }
            let mut sequence = sequence.clone();
            schema
                .scaler
                .transform_sequence(&mut sequence)
                .map_err(|e| ServiceError::DataShape(e.to_string()))?;
            scaled.push(sequence);
        }

        let batch: Vec<&Array2<f64>> = scaled.iter().collect();
        let probabilities = checkpoint.model.predict_proba(&batch)?;
        let version = checkpoint.model_version();
        Ok(probabilities
            .iter()
            .map(|&p| Prediction::from_probability(p, version.clone()))
            .collect())
    }

    /// Risk of a window given as rows of named feature values, oldest first.
    ///
    /// Rows are ordered into the schema's feature columns; extra keys are
    /// ignored and a missing feature is an error.
    pub fn predict_named(&self, rows: &[HashMap<String, f64>]) -> Result<Prediction, ServiceError> {
        let schema = &self.checkpoint()?.schema;
        let columns = &schema.feature_columns;
        let mut sequence = Array2::<f64>::zeros((rows.len(), columns.len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, name) in columns.iter().enumerate() {
                sequence[[i, j]] = *row.get(name).ok_or_else(|| {
                    ServiceError::DataShape(format!("row {i} is missing feature {name}"))
                })?;
            }
        }
        self.predict(&sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use outbreak_data::ColumnNames;
    use outbreak_features::FeatureScaler;
    use outbreak_model::{Adam, LstmConfig, PlateauScheduler};
    use rstest::rstest;

    fn features() -> Vec<String> {
        vec!["target_signal".to_string(), "target_signal_lag_1".to_string()]
    }

    fn service() -> PredictionService {
        let config = LstmConfig {
            hidden_dim: 4,
            num_layers: 1,
            head_dim: 3,
            dropout: 0.0,
            seed: 9,
        };
        PredictionService::from_checkpoint(Checkpoint {
            epoch: 12,
            model: LstmClassifier::new(2, config).unwrap(),
            optimizer: Adam::new(1e-3),
            scheduler: PlateauScheduler::new(0.5, 5).unwrap(),
            schema: ModelSchema {
                columns: ColumnNames::default(),
                feature_columns: features(),
                window_length: 3,
                scaler: FeatureScaler::from_parts(features(), vec![5.0, 5.0], vec![2.0, 2.0])
                    .unwrap(),
            },
            validation_loss: 0.4,
            validation_auc: 0.8,
            created_at: chrono::Utc::now(),
        })
    }

    fn sequence() -> Array2<f64> {
        ndarray::array![[5.0, 5.0], [5.0, 5.0], [20.0, 5.0]]
    }

    #[test]
    fn test_unloaded_service() {
        let service = PredictionService::default();
        assert!(!service.is_loaded());
        assert!(service.model_version().is_none());
        assert!(matches!(
            service.predict(&sequence()),
            Err(ServiceError::NotLoaded)
        ));
        assert!(matches!(
            service.predict_named(&[]),
            Err(ServiceError::NotLoaded)
        ));
    }

    #[test]
    fn test_predict() {
        let service = service();
        assert_eq!(service.model_version().as_deref(), Some("outbreak_v12"));

        let prediction = service.predict(&sequence()).unwrap();
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert_relative_eq!(prediction.risk_score, 100.0 * prediction.probability);
        assert_eq!(
            prediction.risk_level,
            RiskLevel::from_score(prediction.risk_score)
        );
        assert_eq!(prediction.model_version, "outbreak_v12");
    }

    #[test]
    fn test_batch_matches_single() {
        let service = service();
        let other = ndarray::array![[1.0, 2.0], [3.0, 1.0], [2.0, 3.0]];
        let batch = service.predict_batch(&[sequence(), other.clone()]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_relative_eq!(
            batch[1].probability,
            service.predict(&other).unwrap().probability,
            epsilon = 1e-12
        );
        assert!(service.predict_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_shape_errors() {
        let service = service();
        let too_short = ndarray::array![[5.0, 5.0]];
        assert!(matches!(
            service.predict(&too_short),
            Err(ServiceError::DataShape(_))
        ));
        let too_wide = Array2::zeros((3, 3));
        assert!(matches!(
            service.predict_batch(&[sequence(), too_wide]),
            Err(ServiceError::DataShape(_))
        ));
    }

    #[test]
    fn test_predict_named_orders_by_schema() {
        let service = service();
        let rows: Vec<HashMap<String, f64>> = sequence()
            .rows()
            .into_iter()
            .map(|row| {
                HashMap::from([
                    ("target_signal_lag_1".to_string(), row[1]),
                    ("target_signal".to_string(), row[0]),
                    ("rainfall".to_string(), 99.0),
                ])
            })
            .collect();
        let named = service.predict_named(&rows).unwrap();
        let positional = service.predict(&sequence()).unwrap();
        assert_relative_eq!(named.probability, positional.probability, epsilon = 1e-12);

        let mut incomplete = rows;
        incomplete[1].remove("target_signal");
        assert!(matches!(
            service.predict_named(&incomplete),
            Err(ServiceError::DataShape(_))
        ));
    }

    #[rstest]
    #[case(0.0, RiskLevel::Low)]
    #[case(32.9, RiskLevel::Low)]
    #[case(33.0, RiskLevel::Moderate)]
    #[case(65.9, RiskLevel::Moderate)]
    #[case(66.0, RiskLevel::High)]
    #[case(100.0, RiskLevel::High)]
    fn test_risk_levels(#[case] score: f64, #[case] expected: RiskLevel) {
        assert_eq!(RiskLevel::from_score(score), expected);
    }
}
