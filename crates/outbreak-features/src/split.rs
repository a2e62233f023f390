//! Temporal train / validation / test partitioning.

use crate::error::{FeatureError, Result};
use outbreak_data::{FeatureFrame, TimeBoundary};
use polars::prelude::*;

/// Splits rows by time key.
///
/// Rows with `time <= boundary` form the training pool and the remaining
/// rows the holdout. With a `test_boundary` the holdout is split again into
/// validation (`<= test_boundary`) and test rows; without one the holdout is
/// used both for validation during training and for the final evaluation.
#[derive(Debug, Clone)]
pub struct TemporalSplitter {
    boundary: TimeBoundary,
    test_boundary: Option<TimeBoundary>,
}

/// Row pools produced by [`TemporalSplitter::split`].
#[derive(Debug, Clone)]
pub struct FrameSplit {
    /// Training rows
    pub train: FeatureFrame,
    /// Validation rows
    pub validation: FeatureFrame,
    /// Test rows, when a test boundary was configured
    pub test: Option<FeatureFrame>,
}

impl FrameSplit {
    /// Rows used for the final evaluation: the test pool when present,
    /// otherwise the validation pool.
    pub fn evaluation(&self) -> &FeatureFrame {
        self.test.as_ref().unwrap_or(&self.validation)
    }
}

impl TemporalSplitter {
    /// Splitter with a single train / holdout boundary.
    pub const fn new(boundary: TimeBoundary) -> Self {
        Self {
            boundary,
            test_boundary: None,
        }
    }

    /// Add a second boundary separating validation from test rows.
    pub const fn with_test_boundary(mut self, test_boundary: TimeBoundary) -> Self {
        self.test_boundary = Some(test_boundary);
        self
    }

    /// Train / holdout boundary.
    pub const fn boundary(&self) -> TimeBoundary {
        self.boundary
    }

    /// Validation / test boundary.
    pub const fn test_boundary(&self) -> Option<TimeBoundary> {
        self.test_boundary
    }

    /// Partition a frame into disjoint pools.
    ///
    /// Fails with [`FeatureError::EmptySplit`] when any pool is empty.
    pub fn split(&self, frame: &FeatureFrame) -> Result<FrameSplit> {
        let kind = frame.time_kind();
        let boundary = self.boundary.to_physical(kind)?;
        let test_boundary = self
            .test_boundary
            .map(|b| b.to_physical(kind))
            .transpose()?;

        if test_boundary.is_some_and(|test_boundary| test_boundary <= boundary) {
            return Err(FeatureError::InvalidConfig(format!(
                "test boundary {} must be after split boundary {}",
                self.test_boundary
                    .map(|b| b.to_string())
                    .unwrap_or_default(),
                self.boundary
            )));
        }

        let time = frame.columns().time.as_str();
        let key = || col(time).cast(DataType::Int64);

        let pool = |name: &str, predicate: Expr, boundary: TimeBoundary| -> Result<FeatureFrame> {
            let data = frame.lazy().filter(predicate).collect()?;
            if data.height() == 0 {
                return Err(FeatureError::EmptySplit {
                    pool: name.to_string(),
                    boundary: boundary.to_string(),
                });
            }
            let pool = frame.with_data(data);
            let summary = pool.summary()?;
            tracing::info!(pool = name, %summary, "split pool");
            Ok(pool)
        };

        let train = pool("train", key().lt_eq(lit(boundary)), self.boundary)?;
        let (validation, test) = match (test_boundary, self.test_boundary) {
            (Some(physical), Some(test_boundary)) => {
                let validation = pool(
                    "validation",
                    key().gt(lit(boundary)).and(key().lt_eq(lit(physical))),
                    test_boundary,
                )?;
                let test = pool("test", key().gt(lit(physical)), test_boundary)?;
                (validation, Some(test))
            }
            _ => (pool("validation", key().gt(lit(boundary)), self.boundary)?, None),
        };

        Ok(FrameSplit {
            train,
            validation,
            test,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbreak_data::ColumnNames;

    fn frame() -> FeatureFrame {
        let df = df!(
            "entity_id" => ["a", "a", "a", "a", "b", "b", "b", "b"],
            "time_key" => [2015i64, 2016, 2017, 2020, 2015, 2016, 2017, 2020],
            "target_signal" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        )
        .unwrap();
        FeatureFrame::new(df, ColumnNames::default()).unwrap()
    }

    fn keys(frame: &FeatureFrame) -> Vec<i64> {
        frame.time_keys().unwrap()
    }

    #[test]
    fn test_single_boundary() {
        let split = TemporalSplitter::new(TimeBoundary::Integer(2016))
            .split(&frame())
            .unwrap();
        assert_eq!(keys(&split.train), vec![2015, 2016, 2015, 2016]);
        assert_eq!(keys(&split.validation), vec![2017, 2020, 2017, 2020]);
        assert!(split.test.is_none());
        assert_eq!(split.evaluation().height(), 4);
    }

    #[test]
    fn test_second_boundary() {
        let split = TemporalSplitter::new(TimeBoundary::Integer(2016))
            .with_test_boundary(TimeBoundary::Integer(2019))
            .split(&frame())
            .unwrap();
        assert_eq!(keys(&split.validation), vec![2017, 2017]);
        let test = split.test.as_ref().unwrap();
        assert_eq!(keys(test), vec![2020, 2020]);
        assert_eq!(keys(split.evaluation()), vec![2020, 2020]);
    }

    #[test]
    fn test_empty_pools() {
        let err = TemporalSplitter::new(TimeBoundary::Integer(2010))
            .split(&frame())
            .unwrap_err();
        assert!(matches!(err, FeatureError::EmptySplit { pool, .. } if pool == "train"));

        let err = TemporalSplitter::new(TimeBoundary::Integer(2020))
            .split(&frame())
            .unwrap_err();
        assert!(matches!(err, FeatureError::EmptySplit { pool, .. } if pool == "validation"));

        let err = TemporalSplitter::new(TimeBoundary::Integer(2016))
            .with_test_boundary(TimeBoundary::Integer(2020))
            .split(&frame())
            .unwrap_err();
        assert!(matches!(err, FeatureError::EmptySplit { pool, .. } if pool == "test"));
    }

    #[test]
    fn test_test_boundary_must_follow_split_boundary() {
        let err = TemporalSplitter::new(TimeBoundary::Integer(2017))
            .with_test_boundary(TimeBoundary::Integer(2016))
            .split(&frame())
            .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidConfig(_)));
    }
}
