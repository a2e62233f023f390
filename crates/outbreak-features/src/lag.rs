//! Lagged Target Features
//!
//! Adds lagged copies of the target signal per entity. The lag is counted in
//! rows of the entity's own time-ordered series, not in calendar steps, and
//! rows without a complete lag history are dropped rather than filled.

use crate::error::{FeatureError, Result};
use crate::stage::FrameStage;
use outbreak_data::ColumnNames;
use polars::prelude::*;

/// Builds `{target}_lag_{d}` columns for a set of lag depths.
#[derive(Debug, Clone)]
pub struct LagFeatureBuilder {
    depths: Vec<usize>,
}

impl LagFeatureBuilder {
    /// Create a builder; depths must be non-empty and strictly positive.
    pub fn new(depths: impl Into<Vec<usize>>) -> Result<Self> {
        let mut depths = depths.into();
        if depths.is_empty() {
            return Err(FeatureError::InvalidConfig(
                "at least one lag depth is required".to_string(),
            ));
        }
        if depths.contains(&0) {
            return Err(FeatureError::InvalidConfig(
                "lag depth 0 is the signal itself".to_string(),
            ));
        }
        depths.sort_unstable();
        depths.dedup();
        Ok(Self { depths })
    }

    /// Lag depths in ascending order.
    pub fn depths(&self) -> &[usize] {
        &self.depths
    }

    /// Largest lag depth, i.e. the number of leading rows dropped per entity.
    pub fn max_depth(&self) -> usize {
        self.depths.last().copied().unwrap_or_default()
    }

    /// Names of the generated lag columns.
    pub fn lag_columns(&self, columns: &ColumnNames) -> Vec<String> {
        self.depths.iter().map(|&d| columns.lag_column(d)).collect()
    }
}

impl FrameStage for LagFeatureBuilder {
    fn name(&self) -> &str {
        "lag_features"
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
        let names = self.lag_columns(columns);

        let lags: Vec<Expr> = self
            .depths
            .iter()
            .zip(&names)
            .map(|(&depth, name)| {
                col(target)
                    .shift(lit(depth as i64))
                    .over([col(entity)])
                    .alias(name.as_str())
            })
            .collect();

        let complete = names
            .iter()
            .map(|name| col(name.as_str()).is_not_null())
            .reduce(|acc, e| acc.and(e))
            .unwrap_or_else(|| lit(true));

        Ok(data
            .sort([entity, columns.time.as_str()], SortMultipleOptions::default())
            .with_columns(lags)
            .filter(complete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbreak_data::FeatureFrame;
    use rstest::rstest;

    fn frame(counts: &[(&str, usize)]) -> FeatureFrame {
        let mut entities = Vec::new();
        let mut times = Vec::new();
        let mut targets = Vec::new();
        for &(entity, n) in counts {
            for t in 0..n {
                entities.push(entity);
                times.push(2000 + t as i64);
                targets.push((t * 10) as f64);
            }
        }
        let df = df!(
            "entity_id" => entities,
            "time_key" => times,
            "target_signal" => targets,
        )
        .unwrap();
        FeatureFrame::new(df, ColumnNames::default()).unwrap()
    }

    #[rstest]
    #[case(6, vec![1], 5)]
    #[case(6, vec![1, 2, 3], 3)]
    #[case(3, vec![1, 2, 3], 0)]
    #[case(2, vec![4], 0)]
    fn test_rows_retained(#[case] n: usize, #[case] depths: Vec<usize>, #[case] expected: usize) {
        let builder = LagFeatureBuilder::new(depths).unwrap();
        let lagged = builder.apply(&frame(&[("a", n)])).unwrap();
        assert_eq!(lagged.height(), expected);
    }

    #[test]
    fn test_lag_values_follow_entity_rows() {
        let builder = LagFeatureBuilder::new(vec![2, 1]).unwrap();
        let lagged = builder.apply(&frame(&[("a", 4), ("b", 3)])).unwrap();
        let df = lagged.data();

        let entities: Vec<&str> = df
            .column("entity_id")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let lag1: Vec<f64> = df
            .column("target_signal_lag_1")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        let lag2: Vec<f64> = df
            .column("target_signal_lag_2")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();

        assert_eq!(entities, vec!["a", "a", "b"]);
        assert_eq!(lag1, vec![10.0, 20.0, 10.0]);
        assert_eq!(lag2, vec![0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_invalid_depths() {
        assert!(matches!(
            LagFeatureBuilder::new(Vec::new()),
            Err(FeatureError::InvalidConfig(_))
        ));
        assert!(matches!(
            LagFeatureBuilder::new(vec![0, 1]),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_depths_are_sorted_and_deduplicated() {
        let builder = LagFeatureBuilder::new(vec![3, 1, 3]).unwrap();
        assert_eq!(builder.depths(), &[1, 3]);
        assert_eq!(builder.max_depth(), 3);
        assert_eq!(
            builder.lag_columns(&ColumnNames::default()),
            vec!["target_signal_lag_1", "target_signal_lag_3"]
        );
    }
}
