//! Held-out evaluation of a trained checkpoint.

use crate::checkpoint::Checkpoint;
use crate::classifier::SequenceClassifier;
use crate::error::{ModelError, Result};
use crate::metrics::{auc_or_zero, roc_curve};
use outbreak_features::WindowSet;
use outbreak_output::{ConfusionMatrix, MetricsReport, RocPoint, TimeSliceMetrics};
use std::collections::BTreeMap;

/// Output of an evaluation run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Ranking and classification metrics
    pub report: MetricsReport,
    /// ROC curve over all windows
    pub roc: Vec<RocPoint>,
    /// Outbreak probability of each window, in window order
    pub probabilities: Vec<f64>,
}

/// Scores windows with a checkpoint and summarizes the predictions.
#[derive(Debug, Clone)]
pub struct SequenceEvaluator {
    threshold: f64,
    batch_size: usize,
}

impl Default for SequenceEvaluator {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            batch_size: 256,
        }
    }
}

impl SequenceEvaluator {
    /// Evaluator predicting an outbreak when `p > 0.5`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different decision threshold, in `(0, 1)`.
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "threshold must be in (0, 1), got {threshold}"
            )));
        }
        self.threshold = threshold;
        Ok(self)
    }

    /// Windows per inference batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Decision threshold.
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate raw (unscaled) windows against a checkpoint.
    ///
    /// The windows are standardized with the checkpoint's scaler and scored
    /// in their given order. Slices group windows by the coarse period (the
    /// year for date keys) of their end time.
    pub fn evaluate<C: SequenceClassifier>(
        &self,
        checkpoint: &Checkpoint<C>,
        windows: &WindowSet,
    ) -> Result<Evaluation> {
        let schema = &checkpoint.schema;
        if windows.is_empty() {
            return Err(ModelError::EmptyWindows("evaluation".to_string()));
        }
        if windows.feature_columns != schema.feature_columns {
            return Err(ModelError::Shape(format!(
                "windows have features {:?}, checkpoint expects {:?}",
                windows.feature_columns, schema.feature_columns
            )));
        }
        if let Some(w) = windows
            .windows
            .iter()
            .find(|w| w.sequence.nrows() != schema.window_length)
        {
            return Err(ModelError::Shape(format!(
                "window for {} has {} rows, checkpoint expects {}",
                w.entity,
                w.sequence.nrows(),
                schema.window_length
            )));
        }

        let mut scaled = windows.clone();
        schema.scaler.transform(&mut scaled)?;

        let sequences = scaled.sequences();
        let mut probabilities = Vec::with_capacity(scaled.len());
        for batch in sequences.chunks(self.batch_size) {
            probabilities.extend(checkpoint.model.predict_proba(batch)?);
        }

        let labels = windows.labels();
        let predictions: Vec<bool> = probabilities.iter().map(|&p| p > self.threshold).collect();
        let confusion = ConfusionMatrix::from_predictions(&labels, &predictions);
        let auc = auc_or_zero(&probabilities, &labels, "evaluation");

        let mut slices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (i, window) in windows.windows.iter().enumerate() {
            slices
                .entry(windows.time_kind.period(window.end_time))
                .or_default()
                .push(i);
        }
        let per_time_slice = slices
            .into_iter()
            .map(|(period, members)| {
                let scores: Vec<f64> = members.iter().map(|&i| probabilities[i]).collect();
                let slice_labels: Vec<u8> = members.iter().map(|&i| labels[i]).collect();
                let slice_predictions: Vec<bool> = members.iter().map(|&i| predictions[i]).collect();
                let positives = slice_labels.iter().filter(|&&y| y == 1).count();
                TimeSliceMetrics {
                    time_key: period,
                    n_windows: members.len(),
                    auc: auc_or_zero(&scores, &slice_labels, &format!("time slice {period}")),
                    accuracy: ConfusionMatrix::from_predictions(&slice_labels, &slice_predictions)
                        .accuracy(),
                    outbreak_rate: positives as f64 / members.len() as f64,
                }
            })
            .collect();

        let report = MetricsReport::new(auc, self.threshold, confusion, per_time_slice);
        tracing::info!(
            windows = report.n_windows,
            auc = report.auc,
            sensitivity = report.sensitivity,
            specificity = report.specificity,
            "evaluation complete"
        );

        Ok(Evaluation {
            roc: roc_curve(&probabilities, &labels),
            report,
            probabilities,
        })
    }
}
