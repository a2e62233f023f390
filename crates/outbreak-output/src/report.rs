//! Report envelopes for pipeline runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A timestamped report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report title (e.g. "evaluation").
    pub title: String,

    /// Version of the model the report was produced with.
    pub model_version: Option<String>,

    /// Report generation timestamp.
    pub timestamp: DateTime<Utc>,

    /// Report contents (JSON format).
    pub contents: serde_json::Value,
}

impl Report {
    /// Create a new report.
    pub fn new(title: String, model_version: Option<String>, contents: serde_json::Value) -> Self {
        Self {
            title,
            model_version,
            timestamp: Utc::now(),
            contents,
        }
    }

    /// Convert report to JSON string.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Builder for creating reports.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    title: Option<String>,
    model_version: Option<String>,
    sections: serde_json::Map<String, serde_json::Value>,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the model version.
    pub fn model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    /// Add a named section serialized from any record.
    pub fn section<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self, ReportError> {
        self.sections
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Build the report.
    pub fn build(self) -> Report {
        Report::new(
            self.title.unwrap_or_else(|| "report".to_string()),
            self.model_version,
            serde_json::Value::Object(self.sections),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ConfusionMatrix;
    use tempfile::TempDir;

    #[test]
    fn test_report_creation() {
        let report = Report::new(
            "evaluation".to_string(),
            None,
            serde_json::json!({"test": "data"}),
        );

        assert_eq!(report.title, "evaluation");
        assert!(report.model_version.is_none());
    }

    #[test]
    fn test_report_builder() {
        let report = ReportBuilder::new()
            .title("evaluation")
            .model_version("outbreak_v12")
            .section("confusion_matrix", &ConfusionMatrix::new(1, 2, 3, 4))
            .unwrap()
            .build();

        assert_eq!(report.model_version.as_deref(), Some("outbreak_v12"));
        assert_eq!(report.contents["confusion_matrix"]["fn"], 3);
    }

    #[test]
    fn test_write_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("run.json");
        ReportBuilder::new().build().write_to_file(&path).unwrap();

        let back: Report = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.title, "report");
    }
}
