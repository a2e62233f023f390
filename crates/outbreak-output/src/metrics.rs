//! Classification metrics records.

use serde::{Deserialize, Serialize};
use std::fmt;

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Binary confusion matrix (rows are true labels, columns predictions).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// True negatives.
    pub tn: usize,

    /// False positives.
    pub fp: usize,

    /// False negatives.
    #[serde(rename = "fn")]
    pub fn_: usize,

    /// True positives.
    pub tp: usize,
}

impl ConfusionMatrix {
    /// Create a confusion matrix from its four cells.
    pub const fn new(tn: usize, fp: usize, fn_: usize, tp: usize) -> Self {
        Self { tn, fp, fn_, tp }
    }

    /// Count outcomes of paired labels and predictions.
    pub fn from_predictions(labels: &[u8], predictions: &[bool]) -> Self {
        let mut matrix = Self::default();
        for (&label, &predicted) in labels.iter().zip(predictions) {
            match (label == 1, predicted) {
                (true, true) => matrix.tp += 1,
                (true, false) => matrix.fn_ += 1,
                (false, true) => matrix.fp += 1,
                (false, false) => matrix.tn += 1,
            }
        }
        matrix
    }

    /// Total number of observations.
    pub const fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// `[[tn, fp], [fn, tp]]`.
    pub const fn as_array(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    /// True positive rate, TP / (TP + FN); 0 without positives.
    pub fn sensitivity(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// True negative rate, TN / (TN + FP); 0 without negatives.
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// Positive predictive value, TP / (TP + FP); 0 without positive predictions.
    pub fn ppv(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Negative predictive value, TN / (TN + FN); 0 without negative predictions.
    pub fn npv(&self) -> f64 {
        ratio(self.tn, self.tn + self.fn_)
    }

    /// (TP + TN) / total; 0 when empty.
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Harmonic mean of precision and recall.
    pub fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }
}

/// Metrics of the windows whose last row falls in one time period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSliceMetrics {
    /// Coarse period of the window end (the year for date keys).
    pub time_key: i64,

    /// Number of windows in the slice.
    pub n_windows: usize,

    /// ROC AUC, 0 when the slice holds a single class.
    pub auc: f64,

    /// Accuracy at the report threshold.
    pub accuracy: f64,

    /// Share of windows labeled as outbreaks.
    pub outbreak_rate: f64,
}

/// One point of a ROC curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    /// Score threshold; scores at or above it are predicted positive.
    pub threshold: f64,

    /// False positive rate.
    pub fpr: f64,

    /// True positive rate.
    pub tpr: f64,
}

/// Evaluation of a classifier over a set of windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// ROC AUC over all windows, 0 when a single class is present.
    pub auc: f64,

    /// Probability threshold above which a window is predicted positive.
    pub threshold: f64,

    /// Number of evaluated windows.
    pub n_windows: usize,

    /// Confusion matrix at the threshold.
    pub confusion_matrix: ConfusionMatrix,

    /// TP / (TP + FN).
    pub sensitivity: f64,

    /// TN / (TN + FP).
    pub specificity: f64,

    /// TP / (TP + FP).
    pub ppv: f64,

    /// TN / (TN + FN).
    pub npv: f64,

    /// (TP + TN) / total.
    pub accuracy: f64,

    /// F1 score.
    pub f1: f64,

    /// Breakdown by period of the window end.
    pub per_time_slice: Vec<TimeSliceMetrics>,
}

impl MetricsReport {
    /// Build a report, deriving the rates from the confusion matrix.
    pub fn new(
        auc: f64,
        threshold: f64,
        confusion_matrix: ConfusionMatrix,
        per_time_slice: Vec<TimeSliceMetrics>,
    ) -> Self {
        Self {
            auc,
            threshold,
            n_windows: confusion_matrix.total(),
            sensitivity: confusion_matrix.sensitivity(),
            specificity: confusion_matrix.specificity(),
            ppv: confusion_matrix.ppv(),
            npv: confusion_matrix.npv(),
            accuracy: confusion_matrix.accuracy(),
            f1: confusion_matrix.f1(),
            confusion_matrix,
            per_time_slice,
        }
    }

    /// Headline metrics as `(name, value)` pairs.
    pub fn headline(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("auc", self.auc),
            ("sensitivity", self.sensitivity),
            ("specificity", self.specificity),
            ("ppv", self.ppv),
            ("npv", self.npv),
            ("accuracy", self.accuracy),
            ("f1", self.f1),
        ]
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();
        let cm = &self.confusion_matrix;

        output.push_str(&format!(
            "\nEvaluation: {} windows, threshold {:.2}\n",
            self.n_windows, self.threshold
        ));
        output.push_str(&"=".repeat(64));
        output.push('\n');

        for (name, value) in self.headline() {
            output.push_str(&format!("  {:<16} {:>10.4}\n", name, value));
        }

        output.push_str("\nConfusion Matrix:\n");
        output.push_str(&"-".repeat(64));
        output.push('\n');
        output.push_str(&format!("{:<16} {:>12} {:>12}\n", "", "Pred 0", "Pred 1"));
        output.push_str(&format!("{:<16} {:>12} {:>12}\n", "True 0", cm.tn, cm.fp));
        output.push_str(&format!("{:<16} {:>12} {:>12}\n", "True 1", cm.fn_, cm.tp));

        if !self.per_time_slice.is_empty() {
            output.push_str("\nBy Period:\n");
            output.push_str(&"-".repeat(64));
            output.push('\n');
            output.push_str(&format!(
                "{:<10} {:>10} {:>10} {:>10} {:>14}\n",
                "Period", "Windows", "AUC", "Accuracy", "Outbreak Rate"
            ));
            for slice in &self.per_time_slice {
                output.push_str(&format!(
                    "{:<10} {:>10} {:>10.4} {:>10.4} {:>13.2}%\n",
                    slice.time_key,
                    slice.n_windows,
                    slice.auc,
                    slice.accuracy,
                    slice.outbreak_rate * 100.0
                ));
            }
        }

        output.push_str(&"=".repeat(64));
        output.push('\n');
        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let cm = &self.confusion_matrix;

        output.push_str("# Evaluation Report\n\n");
        output.push_str(&format!(
            "**Windows:** {} | **Threshold:** {:.2}\n\n",
            self.n_windows, self.threshold
        ));

        output.push_str("## Metrics\n\n");
        output.push_str("| Metric | Value |\n|--------|-------|\n");
        for (name, value) in self.headline() {
            output.push_str(&format!("| {} | {:.4} |\n", name, value));
        }

        output.push_str("\n## Confusion Matrix\n\n");
        output.push_str("| | Pred 0 | Pred 1 |\n|---|---|---|\n");
        output.push_str(&format!("| True 0 | {} | {} |\n", cm.tn, cm.fp));
        output.push_str(&format!("| True 1 | {} | {} |\n", cm.fn_, cm.tp));

        if !self.per_time_slice.is_empty() {
            output.push_str("\n## By Period\n\n");
            output.push_str("| Period | Windows | AUC | Accuracy | Outbreak Rate |\n");
            output.push_str("|--------|---------|-----|----------|---------------|\n");
            for slice in &self.per_time_slice {
                output.push_str(&format!(
                    "| {} | {} | {:.4} | {:.4} | {:.2}% |\n",
                    slice.time_key,
                    slice.n_windows,
                    slice.auc,
                    slice.accuracy,
                    slice.outbreak_rate * 100.0
                ));
            }
        }

        output
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "auc={:.4} sensitivity={:.4} specificity={:.4} ppv={:.4} npv={:.4} accuracy={:.4} (n={})",
            self.auc,
            self.sensitivity,
            self.specificity,
            self.ppv,
            self.npv,
            self.accuracy,
            self.n_windows
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_confusion_matrix_rates() {
        let cm = ConfusionMatrix::new(87, 3, 2, 8);
        assert_eq!(cm.total(), 100);
        assert_relative_eq!(cm.sensitivity(), 0.8);
        assert_relative_eq!(cm.specificity(), 87.0 / 90.0);
        assert_relative_eq!(cm.ppv(), 8.0 / 11.0);
        assert_relative_eq!(cm.npv(), 87.0 / 89.0);
        assert_relative_eq!(cm.accuracy(), 0.95);
        assert_relative_eq!(cm.specificity(), 0.967, epsilon = 1e-3);
        assert_relative_eq!(cm.ppv(), 0.727, epsilon = 1e-3);
        assert_relative_eq!(cm.npv(), 0.977, epsilon = 1e-3);
    }

    #[test]
    fn test_zero_denominators() {
        let cm = ConfusionMatrix::new(10, 0, 0, 0);
        assert_eq!(cm.sensitivity(), 0.0);
        assert_eq!(cm.ppv(), 0.0);
        assert_eq!(cm.f1(), 0.0);
        assert_eq!(cm.specificity(), 1.0);
        assert_eq!(ConfusionMatrix::default().accuracy(), 0.0);
    }

    #[test]
    fn test_from_predictions() {
        let cm = ConfusionMatrix::from_predictions(&[1, 1, 0, 0, 0], &[true, false, true, false, false]);
        assert_eq!(cm.as_array(), [[2, 1], [1, 1]]);
    }

    #[test]
    fn test_confusion_matrix_serializes_fn() {
        let json = serde_json::to_string(&ConfusionMatrix::new(1, 2, 3, 4)).unwrap();
        assert_eq!(json, r#"{"tn":1,"fp":2,"fn":3,"tp":4}"#);
    }

    #[test]
    fn test_report_rendering() {
        let slices = vec![TimeSliceMetrics {
            time_key: 2021,
            n_windows: 100,
            auc: 0.91,
            accuracy: 0.95,
            outbreak_rate: 0.1,
        }];
        let report = MetricsReport::new(0.91, 0.5, ConfusionMatrix::new(87, 3, 2, 8), slices);
        assert_eq!(report.n_windows, 100);
        assert_relative_eq!(report.sensitivity, 0.8);

        let ascii = report.to_ascii_table();
        assert!(ascii.contains("Confusion Matrix"));
        assert!(ascii.contains("2021"));

        let markdown = report.to_markdown();
        assert!(markdown.contains("# Evaluation Report"));
        assert!(markdown.contains("| True 1 | 2 | 8 |"));

        assert!(report.to_string().starts_with("auc=0.9100"));
    }
}
