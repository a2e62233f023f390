//! Training history records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics recorded at the end of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch number, starting at 1.
    pub epoch: usize,

    /// Mean of the batch losses of the epoch.
    pub train_loss: f64,

    /// Loss over the validation windows.
    pub val_loss: f64,

    /// ROC AUC over the validation windows.
    pub val_auc: f64,

    /// Learning rate used during the epoch.
    pub learning_rate: f64,

    /// Whether the validation loss improved and a checkpoint was written.
    pub improved: bool,
}

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Validation loss did not improve for `patience` epochs.
    EarlyStopping,
    /// The epoch budget was exhausted.
    MaxEpochs,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarlyStopping => write!(f, "early stopping"),
            Self::MaxEpochs => write!(f, "max epochs"),
        }
    }
}

/// Per-epoch record of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Positive class weight used by the loss.
    pub pos_weight: f64,

    /// Epoch records in order.
    pub epochs: Vec<EpochMetrics>,

    /// Why training stopped, once it has.
    pub stop_reason: Option<StopReason>,
}

impl TrainingHistory {
    /// Create an empty history.
    pub const fn new(pos_weight: f64) -> Self {
        Self {
            pos_weight,
            epochs: Vec::new(),
            stop_reason: None,
        }
    }

    /// Append an epoch record.
    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    /// Record why training stopped.
    pub const fn finish(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
    }

    /// Epoch with the lowest validation loss among those that improved.
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().rev().find(|e| e.improved)
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether no epoch was recorded.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\nTraining History (pos_weight {:.3})\n",
            self.pos_weight
        ));
        output.push_str(&"=".repeat(64));
        output.push('\n');
        output.push_str(&format!(
            "{:>6} {:>12} {:>12} {:>10} {:>12} {:>6}\n",
            "Epoch", "Train Loss", "Val Loss", "Val AUC", "LR", ""
        ));
        output.push_str(&"-".repeat(64));
        output.push('\n');

        for e in &self.epochs {
            output.push_str(&format!(
                "{:>6} {:>12.6} {:>12.6} {:>10.4} {:>12.2e} {:>6}\n",
                e.epoch,
                e.train_loss,
                e.val_loss,
                e.val_auc,
                e.learning_rate,
                if e.improved { "*" } else { "" }
            ));
        }

        output.push_str(&"=".repeat(64));
        output.push('\n');
        if let Some(best) = self.best() {
            output.push_str(&format!(
                "Best epoch {} (val loss {:.6})",
                best.epoch, best.val_loss
            ));
            if let Some(reason) = self.stop_reason {
                output.push_str(&format!(", stopped by {reason}"));
            }
            output.push('\n');
        }
        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Training History\n\n");
        output.push_str(&format!("**pos_weight:** {:.3}\n\n", self.pos_weight));
        output.push_str("| Epoch | Train Loss | Val Loss | Val AUC | Learning Rate | Checkpoint |\n");
        output.push_str("|-------|------------|----------|---------|---------------|------------|\n");
        for e in &self.epochs {
            output.push_str(&format!(
                "| {} | {:.6} | {:.6} | {:.4} | {:.2e} | {} |\n",
                e.epoch,
                e.train_loss,
                e.val_loss,
                e.val_auc,
                e.learning_rate,
                if e.improved { "yes" } else { "" }
            ));
        }
        output
    }
}
