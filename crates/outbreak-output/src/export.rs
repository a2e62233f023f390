//! Export functionality for pipeline records.
//!
//! CSV and JSON export of evaluation reports, per-slice metrics, training
//! histories and ROC curves.

use crate::history::{EpochMetrics, TrainingHistory};
use crate::metrics::{MetricsReport, RocPoint, TimeSliceMetrics};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }

    /// Infer the format from a file extension; JSON files are pretty-printed.
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.parse(),
            None => Err(ExportError::InvalidFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::PrettyJson),
            "compact-json" | "jsonl" => Ok(Self::Json),
            other => Err(ExportError::InvalidFormat(other.to_string())),
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn to_csv<'a, S, I>(records: I) -> Result<String, ExportError>
where
    S: Serialize + 'a,
    I: IntoIterator<Item = &'a S>,
{
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

fn to_json<T: Serialize + ?Sized>(value: &T, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(value)?),
        _ => Ok(serde_json::to_string(value)?),
    }
}

/// Flattened metric for CSV export.
#[derive(Debug, Serialize, Deserialize)]
struct MetricRecord {
    scope: String,
    metric: String,
    value: f64,
}

impl MetricsReport {
    fn to_flat_records(&self) -> Vec<MetricRecord> {
        let overall = |metric: &str, value: f64| MetricRecord {
            scope: "overall".to_string(),
            metric: metric.to_string(),
            value,
        };

        let mut records: Vec<MetricRecord> = self
            .headline()
            .into_iter()
            .map(|(metric, value)| overall(metric, value))
            .collect();

        let cm = &self.confusion_matrix;
        records.push(overall("threshold", self.threshold));
        records.push(overall("n_windows", self.n_windows as f64));
        records.push(overall("tn", cm.tn as f64));
        records.push(overall("fp", cm.fp as f64));
        records.push(overall("fn", cm.fn_ as f64));
        records.push(overall("tp", cm.tp as f64));

        for slice in &self.per_time_slice {
            let scope = slice.time_key.to_string();
            for (metric, value) in [
                ("n_windows", slice.n_windows as f64),
                ("auc", slice.auc),
                ("accuracy", slice.accuracy),
                ("outbreak_rate", slice.outbreak_rate),
            ] {
                records.push(MetricRecord {
                    scope: scope.clone(),
                    metric: metric.to_string(),
                    value,
                });
            }
        }

        records
    }
}

impl Exporter for MetricsReport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => to_csv(&self.to_flat_records()),
            _ => to_json(self, format),
        }
    }
}

impl Exporter for Vec<TimeSliceMetrics> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => to_csv(self),
            _ => to_json(self, format),
        }
    }
}

impl Exporter for TrainingHistory {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => to_csv::<EpochMetrics, _>(&self.epochs),
            _ => to_json(self, format),
        }
    }
}

impl Exporter for Vec<RocPoint> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => to_csv(self),
            _ => to_json(self, format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::StopReason;
    use crate::metrics::ConfusionMatrix;
    use rstest::rstest;

    fn report() -> MetricsReport {
        MetricsReport::new(
            0.875,
            0.5,
            ConfusionMatrix::new(87, 3, 2, 8),
            vec![TimeSliceMetrics {
                time_key: 2020,
                n_windows: 100,
                auc: 0.875,
                accuracy: 0.95,
                outbreak_rate: 0.1,
            }],
        )
    }

    #[test]
    fn test_metrics_report_csv() {
        let csv = report().export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("scope,metric,value\n"));
        assert!(csv.contains("overall,auc,0.875"));
        assert!(csv.contains("overall,tp,8"));
        assert!(csv.contains("2020,outbreak_rate,0.1"));
    }

    #[test]
    fn test_metrics_report_json() {
        let json = report().export_to_string(ExportFormat::Json).unwrap();
        let back: MetricsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report());
    }

    #[test]
    fn test_metrics_report_pretty_json() {
        let json = report().export_to_string(ExportFormat::PrettyJson).unwrap();
        assert!(json.contains("\"per_time_slice\""));
        assert!(json.contains("  ")); // Indentation indicates pretty format
    }

    #[test]
    fn test_training_history_csv() {
        let mut history = TrainingHistory::new(9.0);
        history.push(EpochMetrics {
            epoch: 1,
            train_loss: 0.5,
            val_loss: 0.25,
            val_auc: 0.75,
            learning_rate: 0.001,
            improved: true,
        });
        history.finish(StopReason::MaxEpochs);

        let csv = history.export_to_string(ExportFormat::Csv).unwrap();
        assert_eq!(
            csv,
            "epoch,train_loss,val_loss,val_auc,learning_rate,improved\n1,0.5,0.25,0.75,0.001,true\n"
        );
    }

    #[test]
    fn test_roc_points_csv() {
        let points = vec![
            RocPoint {
                threshold: 2.0,
                fpr: 0.0,
                tpr: 0.0,
            },
            RocPoint {
                threshold: 0.5,
                fpr: 0.25,
                tpr: 1.0,
            },
        ];
        let csv = points.export_to_string(ExportFormat::Csv).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("0.5,0.25,1.0"));
    }

    #[rstest]
    #[case("csv", ExportFormat::Csv)]
    #[case("JSON", ExportFormat::PrettyJson)]
    #[case("compact-json", ExportFormat::Json)]
    fn test_format_from_str(#[case] input: &str, #[case] expected: ExportFormat) {
        assert_eq!(input.parse::<ExportFormat>().unwrap(), expected);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ExportFormat::from_path(Path::new("out/roc.csv")).unwrap(),
            ExportFormat::Csv
        );
        assert!(ExportFormat::from_path(Path::new("report")).is_err());
        assert!(ExportFormat::from_path(Path::new("report.xlsx")).is_err());
    }
}
