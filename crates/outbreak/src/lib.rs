#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/outbreak-risk/outbreak/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;

// Re-export main types from sub-crates
pub use outbreak_data as data;
pub use outbreak_features as features;
pub use outbreak_model as model;
pub use outbreak_output as output;

pub use config::{PipelineConfig, SourceConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{Datasets, Pipeline, PipelineOutcome, PoolSummaries};
pub use service::{ModelState, Prediction, PredictionService, RiskLevel, ServiceError};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
