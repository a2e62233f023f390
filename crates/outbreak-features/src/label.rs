//! Outbreak Labels
//!
//! A row is an outbreak when its target signal exceeds a per-entity
//! threshold `mean + z * std`, with the sample (ddof = 1) standard deviation
//! of that entity's target. A single observation has no spread and its
//! threshold is the mean.
//!
//! [`LabelWindow::FullSeries`] computes the statistics over every row of the
//! entity, so early labels depend on later observations.
//! [`LabelWindow::Expanding`] only uses strictly earlier rows of the entity;
//! rows with fewer than two prior observations are labeled 0.

use crate::error::{FeatureError, Result};
use crate::stage::FrameStage;
use derive_more::Display;
use outbreak_data::ColumnNames;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Rows over which the per-entity threshold statistics are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelWindow {
    /// Every row of the entity
    #[default]
    #[display("full_series")]
    FullSeries,
    /// Only rows strictly before the labeled one
    #[display("expanding")]
    Expanding,
}

/// Derives the binary outbreak label column.
#[derive(Debug, Clone)]
pub struct OutbreakLabeler {
    z: f64,
    window: LabelWindow,
}

impl Default for OutbreakLabeler {
    fn default() -> Self {
        Self {
            z: 1.0,
            window: LabelWindow::FullSeries,
        }
    }
}

impl OutbreakLabeler {
    /// Create a labeler with a z multiplier and statistics window.
    pub fn new(z: f64, window: LabelWindow) -> Result<Self> {
        if !z.is_finite() {
            return Err(FeatureError::InvalidConfig(format!(
                "label z multiplier must be finite, got {z}"
            )));
        }
        Ok(Self { z, window })
    }

    /// Threshold multiplier.
    pub const fn z(&self) -> f64 {
        self.z
    }

    /// Statistics window.
    pub const fn window(&self) -> LabelWindow {
        self.window
    }

    fn full_series(&self, target: &str, entity: &str) -> Expr {
        let mean = col(target).mean().over([col(entity)]);
        let std = col(target)
            .std(1)
            .over([col(entity)])
            .fill_nan(lit(0.0))
            .fill_null(lit(0.0));
        col(target).gt(mean + lit(self.z) * std)
    }

    fn expanding(&self, target: &str, entity: &str) -> Expr {
        let x = col(target);
        // Inclusive running aggregates minus the current row.
        let n = x.clone().is_not_null().cast(DataType::Float64).cum_sum(false).over([col(entity)])
            - lit(1.0);
        let sum = x.clone().cum_sum(false).over([col(entity)]) - x.clone();
        let sum_sq = (x.clone() * x.clone()).cum_sum(false).over([col(entity)])
            - x.clone() * x.clone();

        let mean = sum.clone() / n.clone();
        let var = (sum_sq - sum.clone() * sum / n.clone()) / (n.clone() - lit(1.0));
        let std = when(var.clone().lt(lit(0.0)))
            .then(lit(0.0))
            .otherwise(var)
            .sqrt();

        when(n.gt_eq(lit(2.0)))
            .then(x.gt(mean + lit(self.z) * std))
            .otherwise(lit(false))
    }
}

impl FrameStage for OutbreakLabeler {
    fn name(&self) -> &str {
        "outbreak_labels"
    }

    fn required_columns(&self, columns: &ColumnNames) -> Vec<String> {
        vec![
            columns.entity.clone(),
            columns.time.clone(),
            columns.target.clone(),
        ]
    }

    fn transform(&self, data: LazyFrame, columns: &ColumnNames) -> Result<LazyFrame> {
        let entity = columns.entity.as_str();
        let target = columns.target.as_str();

        let outbreak = match self.window {
            LabelWindow::FullSeries => self.full_series(target, entity),
            LabelWindow::Expanding => self.expanding(target, entity),
        };

        Ok(data
            .sort([entity, columns.time.as_str()], SortMultipleOptions::default())
            .with_column(outbreak.cast(DataType::Int32).alias(columns.label.as_str())))
    }
}
