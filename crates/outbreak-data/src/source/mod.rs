//! External feature sources.
//!
//! A [`FeatureSource`] supplies covariate columns (climate, demographics,
//! vaccination coverage, ...) keyed by `(entity, time)`. Sources are joined
//! onto a [`FeatureFrame`](crate::FeatureFrame) with
//! [`FeatureFrame::join_covariates`](crate::FeatureFrame::join_covariates).

mod csv;

pub use csv::CsvFeatureSource;

use crate::error::Result;
use crate::frame::FeatureFrame;
use crate::time::{TimeBoundary, TimeKind};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

/// Inclusive time range used to query a source. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// First time key to include
    pub start: Option<TimeBoundary>,
    /// Last time key to include
    pub end: Option<TimeBoundary>,
}

impl TimeRange {
    /// Range with both ends set.
    pub const fn between(start: TimeBoundary, end: TimeBoundary) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Physical `(start, end)` keys for a time column of the given kind.
    pub fn to_physical(&self, kind: TimeKind) -> Result<(Option<i64>, Option<i64>)> {
        let start = self
            .start
            .map(|boundary| boundary.to_physical_start(kind))
            .transpose()?;
        let end = self
            .end
            .map(|boundary| boundary.to_physical(kind))
            .transpose()?;
        Ok((start, end))
    }
}

/// A provider of covariate columns keyed by `(entity, time)`.
pub trait FeatureSource {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetch covariates for the given entities within a time range.
    ///
    /// An empty entity list means all entities. The returned frame carries
    /// the entity and time columns plus one column per covariate.
    fn fetch(&self, entities: &[String], range: &TimeRange) -> Result<DataFrame>;
}

/// Fetch covariates from every source and inner-join them onto a frame.
///
/// Sources are queried for the frame's entities over the given range and
/// joined in order; rows without a match in every source are dropped.
pub fn join_sources(
    frame: &FeatureFrame,
    sources: &[&dyn FeatureSource],
    range: &TimeRange,
) -> Result<FeatureFrame> {
    let entities = frame.entities()?;
    let mut joined = frame.clone();
    for source in sources {
        let covariates = source.fetch(&entities, range)?;
        let before = joined.height();
        joined = joined.join_covariates(&covariates)?;
        tracing::info!(
            source = source.name(),
            rows_before = before,
            rows_after = joined.height(),
            "joined feature source"
        );
    }
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ColumnNames;
    use polars::prelude::df;

    struct StaticSource(DataFrame);

    impl FeatureSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        fn fetch(&self, _entities: &[String], _range: &TimeRange) -> Result<DataFrame> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_join_sources_in_order() {
        let frame = FeatureFrame::new(
            df!(
                "entity_id" => ["a", "a", "b"],
                "time_key" => [1i64, 2, 1],
                "target_signal" => [1.0, 2.0, 3.0],
            )
            .unwrap(),
            ColumnNames::default(),
        )
        .unwrap();
        let climate = StaticSource(
            df!(
                "entity_id" => ["a", "a", "b"],
                "time_key" => [1i64, 2, 1],
                "avg_temp" => [10.0, 11.0, 12.0],
            )
            .unwrap(),
        );
        let census = StaticSource(
            df!(
                "entity_id" => ["a", "a"],
                "time_key" => [1i64, 2],
                "population" => [100.0, 101.0],
            )
            .unwrap(),
        );

        let joined = join_sources(&frame, &[&climate, &census], &TimeRange::default()).unwrap();
        assert_eq!(joined.height(), 2);
        assert_eq!(
            joined.feature_columns(),
            vec!["target_signal", "avg_temp", "population"]
        );
    }

    #[test]
    fn test_year_range_on_dates() {
        let range = TimeRange::between(TimeBoundary::Integer(1970), TimeBoundary::Integer(1970));
        assert_eq!(
            range.to_physical(TimeKind::Date).unwrap(),
            (Some(0), Some(364))
        );
        assert_eq!(TimeRange::default().to_physical(TimeKind::Integer).unwrap(), (None, None));
    }
}
