//! Stage Registry
//!
//! Central registry of the feature pipeline stages, in execution order.
//! Used for discovery (`outbreak stages`) and for documentation of the
//! columns each stage reads and writes.

use std::collections::HashMap;

/// Pipeline stage categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageCategory {
    /// Row-level label derivation
    Labeling,
    /// Column derivation from the target history
    Features,
    /// Row partitioning by time
    Partitioning,
    /// Conversion of rows into model inputs
    Sequencing,
}

impl StageCategory {
    /// Every category in pipeline order
    pub const ALL: [Self; 4] = [
        Self::Labeling,
        Self::Features,
        Self::Partitioning,
        Self::Sequencing,
    ];

    /// Display name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Labeling => "Labeling",
            Self::Features => "Features",
            Self::Partitioning => "Partitioning",
            Self::Sequencing => "Sequencing",
        }
    }
}

/// Stage metadata
#[derive(Debug, Clone)]
pub struct StageInfo {
    /// Stage name (unique identifier)
    pub name: &'static str,
    /// Stage category
    pub category: StageCategory,
    /// Brief description of what the stage does
    pub description: &'static str,
    /// Logical columns the stage reads
    pub reads: &'static [&'static str],
    /// Logical columns the stage writes
    pub writes: &'static [&'static str],
}

/// Get all stages in execution order
pub fn available_stages() -> Vec<StageInfo> {
    vec![
        StageInfo {
            name: "outbreak_labels",
            category: StageCategory::Labeling,
            description: "Binary outbreak label from a per-entity mean + z * std threshold",
            reads: &["entity", "time", "target"],
            writes: &["label"],
        },
        StageInfo {
            name: "lag_features",
            category: StageCategory::Features,
            description: "Lagged target columns; rows without full lag history are dropped",
            reads: &["entity", "time", "target"],
            writes: &["target_lag_{d}"],
        },
        StageInfo {
            name: "temporal_split",
            category: StageCategory::Partitioning,
            description: "Train / validation / test pools by time boundary",
            reads: &["time"],
            writes: &[],
        },
        StageInfo {
            name: "feature_scaler",
            category: StageCategory::Sequencing,
            description: "Per-column standardization fitted on the training pool",
            reads: &["features"],
            writes: &["features"],
        },
        StageInfo {
            name: "sequence_windows",
            category: StageCategory::Sequencing,
            description: "Per-entity sliding windows labeled by their last row",
            reads: &["entity", "time", "features", "label"],
            writes: &[],
        },
    ]
}

/// Get stages by category
pub fn stages_by_category(category: StageCategory) -> Vec<StageInfo> {
    available_stages()
        .into_iter()
        .filter(|s| s.category == category)
        .collect()
}

/// Get stage info by name
pub fn get_stage_info(name: &str) -> Option<StageInfo> {
    available_stages().into_iter().find(|s| s.name == name)
}

/// List all stage names in execution order
pub fn list_stage_names() -> Vec<&'static str> {
    available_stages().into_iter().map(|s| s.name).collect()
}

/// Count stages by category
pub fn count_by_category() -> HashMap<StageCategory, usize> {
    let mut counts = HashMap::new();
    for stage in available_stages() {
        *counts.entry(stage.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FrameStage, LagFeatureBuilder, OutbreakLabeler};

    #[test]
    fn test_execution_order() {
        assert_eq!(
            list_stage_names(),
            vec![
                "outbreak_labels",
                "lag_features",
                "temporal_split",
                "feature_scaler",
                "sequence_windows"
            ]
        );
    }

    #[test]
    fn test_frame_stage_names_are_registered() {
        let lag = LagFeatureBuilder::new(vec![1]).unwrap();
        assert!(get_stage_info(lag.name()).is_some());
        assert!(get_stage_info(OutbreakLabeler::default().name()).is_some());
        assert!(get_stage_info("nonexistent_stage").is_none());
    }

    #[test]
    fn test_count_by_category() {
        let counts = count_by_category();
        assert_eq!(counts.get(&StageCategory::Labeling), Some(&1));
        assert_eq!(counts.get(&StageCategory::Sequencing), Some(&2));
        assert_eq!(stages_by_category(StageCategory::Partitioning).len(), 1);
    }

    #[test]
    fn test_categories_cover_every_stage() {
        let grouped: usize = StageCategory::ALL
            .iter()
            .map(|&category| stages_by_category(category).len())
            .sum();
        assert_eq!(grouped, available_stages().len());
        assert_eq!(StageCategory::Partitioning.name(), "Partitioning");
    }

    #[test]
    fn test_all_stages_read_columns() {
        for stage in available_stages() {
            assert!(!stage.reads.is_empty(), "Stage {} reads nothing", stage.name);
        }
    }
}
