#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/outbreak-risk/outbreak/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod history;
pub mod metrics;
pub mod report;

pub use export::{ExportError, ExportFormat, Exporter};
pub use history::{EpochMetrics, StopReason, TrainingHistory};
pub use metrics::{ConfusionMatrix, MetricsReport, RocPoint, TimeSliceMetrics};
pub use report::{Report, ReportBuilder, ReportError};
