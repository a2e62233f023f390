//! Entity-time feature frames.
//!
//! A [`FeatureFrame`] is the tabular input of the pipeline: one row per entity
//! per time step, keyed by `(entity, time)`, with a numeric target signal and
//! an arbitrary set of numeric feature columns. Construction validates the
//! key columns, normalizes their types and sorts rows by `(entity, time)`.

use crate::error::{DataError, Result};
use crate::source::TimeRange;
use crate::time::TimeKind;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Names of the identifying and target columns of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// Entity identifier column (e.g. county FIPS code)
    pub entity: String,
    /// Time key column (integer period or date)
    pub time: String,
    /// Target signal column (e.g. reported cases)
    pub target: String,
    /// Binary outbreak label column
    pub label: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            entity: "entity_id".to_string(),
            time: "time_key".to_string(),
            target: "target_signal".to_string(),
            label: "outbreak".to_string(),
        }
    }
}

impl ColumnNames {
    /// Whether a column identifies rows or carries the label, i.e. is never a feature.
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.entity || name == self.time || name == self.label
    }

    /// Name of the lagged target column for a lag depth.
    pub fn lag_column(&self, depth: usize) -> String {
        format!("{}_lag_{depth}", self.target)
    }
}

const fn is_integer(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int32 | DataType::Int64 | DataType::UInt32 | DataType::UInt64
    )
}

const fn is_numeric(dtype: &DataType) -> bool {
    is_integer(dtype) || matches!(dtype, DataType::Float32 | DataType::Float64)
}

fn invalid_type(column: &str, dtype: &DataType) -> DataError {
    DataError::InvalidColumnType {
        column: column.to_string(),
        dtype: dtype.to_string(),
    }
}

/// Validated entity-time dataset.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    data: DataFrame,
    columns: ColumnNames,
    time_kind: TimeKind,
}

impl FeatureFrame {
    /// Validate and normalize a raw DataFrame.
    ///
    /// * entity ids become strings (integer ids are cast)
    /// * integer time keys become `Int64`, date keys stay `Date`
    /// * the target becomes `Float64`
    /// * rows with a null entity, time key or target are dropped
    /// * an existing label column becomes `Int32`
    ///
    /// Fails if a key column is missing, has an unsupported type, or the
    /// `(entity, time)` key is not unique.
    pub fn new(data: DataFrame, columns: ColumnNames) -> Result<Self> {
        for name in [&columns.entity, &columns.time, &columns.target] {
            if data.column(name.as_str()).is_err() {
                return Err(DataError::MissingColumn(name.clone()));
            }
        }

        let entity = columns.entity.as_str();
        let time = columns.time.as_str();
        let target = columns.target.as_str();

        let entity_dtype = data.column(entity)?.dtype().clone();
        let entity_expr = match entity_dtype {
            DataType::String => col(entity),
            ref dtype if is_integer(dtype) => col(entity).cast(DataType::String),
            ref dtype => return Err(invalid_type(entity, dtype)),
        };

        let time_dtype = data.column(time)?.dtype().clone();
        let (time_kind, time_expr) = match time_dtype {
            DataType::Date => (TimeKind::Date, col(time)),
            ref dtype if is_integer(dtype) => (TimeKind::Integer, col(time).cast(DataType::Int64)),
            ref dtype => return Err(invalid_type(time, dtype)),
        };

        let target_dtype = data.column(target)?.dtype().clone();
        if !is_numeric(&target_dtype) {
            return Err(invalid_type(target, &target_dtype));
        }

        let mut normalized = vec![
            entity_expr,
            time_expr,
            col(target).cast(DataType::Float64),
        ];

        if let Ok(label) = data.column(columns.label.as_str()) {
            let dtype = label.dtype();
            if !(is_numeric(dtype) || matches!(dtype, DataType::Boolean)) {
                return Err(invalid_type(&columns.label, dtype));
            }
            normalized.push(col(columns.label.as_str()).cast(DataType::Int32));
        }

        let before = data.height();
        let data = data
            .lazy()
            .with_columns(normalized)
            .filter(
                col(entity)
                    .is_not_null()
                    .and(col(time).is_not_null())
                    .and(col(target).is_not_null()),
            )
            .sort([entity, time], SortMultipleOptions::default())
            .collect()?;

        let dropped = before - data.height();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped rows with a missing key or target");
        }

        let duplicates = data
            .clone()
            .lazy()
            .group_by([col(entity), col(time)])
            .agg([col(target).count().alias("__rows")])
            .filter(col("__rows").gt(lit(1)))
            .collect()?
            .height();
        if duplicates > 0 {
            return Err(DataError::DuplicateKeys { count: duplicates });
        }

        Ok(Self {
            data,
            columns,
            time_kind,
        })
    }

    /// Replace the rows of the frame while keeping its schema description.
    ///
    /// Used by transformation stages whose output is derived from an already
    /// validated frame; key column types must be preserved by the caller.
    pub fn with_data(&self, data: DataFrame) -> Self {
        Self {
            data,
            columns: self.columns.clone(),
            time_kind: self.time_kind,
        }
    }

    /// Underlying DataFrame.
    pub const fn data(&self) -> &DataFrame {
        &self.data
    }

    /// Consume the frame and return the underlying DataFrame.
    pub fn into_data(self) -> DataFrame {
        self.data
    }

    /// Lazy view of the frame.
    pub fn lazy(&self) -> LazyFrame {
        self.data.clone().lazy()
    }

    /// Column names of the identifying and target columns.
    pub const fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Representation of the time key.
    pub const fn time_kind(&self) -> TimeKind {
        self.time_kind
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.data.height()
    }

    /// Whether the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.data.height() == 0
    }

    /// Whether the frame carries an outbreak label column.
    pub fn has_label(&self) -> bool {
        self.data.column(self.columns.label.as_str()).is_ok()
    }

    /// Numeric feature columns in frame order.
    ///
    /// All numeric columns except the entity, time and label columns; the
    /// target signal and its lags are features.
    pub fn feature_columns(&self) -> Vec<String> {
        self.data
            .get_columns()
            .iter()
            .filter(|c| is_numeric(c.dtype()) && !self.columns.is_reserved(c.name().as_str()))
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Distinct entity ids in ascending order.
    pub fn entities(&self) -> Result<Vec<String>> {
        let ids = self.data.column(self.columns.entity.as_str())?.str()?;
        let mut entities: Vec<String> = ids.into_iter().flatten().map(str::to_string).collect();
        entities.dedup();
        Ok(entities)
    }

    /// Physical time keys (integer period or days since epoch), row aligned.
    pub fn time_keys(&self) -> Result<Vec<i64>> {
        let keys = self
            .data
            .column(self.columns.time.as_str())?
            .cast(&DataType::Int64)?;
        Ok(keys.i64()?.into_iter().flatten().collect())
    }

    /// Row counts, entity counts, time range and outbreak rate.
    pub fn summary(&self) -> Result<FrameSummary> {
        let keys = self.time_keys()?;
        let outbreak_rate = if self.has_label() {
            self.data
                .column(self.columns.label.as_str())?
                .cast(&DataType::Float64)?
                .f64()?
                .mean()
        } else {
            None
        };

        Ok(FrameSummary {
            rows: self.height(),
            entities: self.entities()?.len(),
            time_start: keys.iter().min().copied(),
            time_end: keys.iter().max().copied(),
            time_kind: self.time_kind,
            outbreak_rate,
        })
    }

    /// Inclusive range spanned by the time keys; open when the frame is empty.
    pub fn time_range(&self) -> Result<TimeRange> {
        let keys = self.time_keys()?;
        let bound = |key: Option<&i64>| key.map(|&k| self.time_kind.boundary(k));
        Ok(TimeRange {
            start: bound(keys.iter().min()),
            end: bound(keys.iter().max()),
        })
    }

    /// Inner-join covariate columns keyed by `(entity, time)`.
    ///
    /// Columns already present in this frame are ignored on the covariate
    /// side, so a source cannot overwrite the target or the keys.
    pub fn join_covariates(&self, covariates: &DataFrame) -> Result<Self> {
        let entity = self.columns.entity.as_str();
        let time = self.columns.time.as_str();

        for name in [entity, time] {
            if covariates.column(name).is_err() {
                return Err(DataError::MissingColumn(name.to_string()));
            }
        }

        let existing: HashSet<String> = self
            .data
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let time_expr = match self.time_kind {
            TimeKind::Integer => col(time).cast(DataType::Int64),
            TimeKind::Date => col(time).cast(DataType::Date),
        };

        let mut selection = vec![col(entity).cast(DataType::String), time_expr];
        selection.extend(
            covariates
                .get_column_names()
                .iter()
                .filter(|name| !existing.contains(name.as_str()))
                .map(|name| col(name.as_str())),
        );

        let joined = self
            .lazy()
            .join(
                covariates.clone().lazy().select(selection),
                [col(entity), col(time)],
                [col(entity), col(time)],
                JoinArgs::new(JoinType::Inner),
            )
            .collect()?;

        Self::new(joined, self.columns.clone())
    }
}

/// Descriptive statistics of a frame, logged at each pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    /// Number of rows
    pub rows: usize,
    /// Number of distinct entities
    pub entities: usize,
    /// Earliest physical time key
    pub time_start: Option<i64>,
    /// Latest physical time key
    pub time_end: Option<i64>,
    /// Representation of the time keys
    pub time_kind: TimeKind,
    /// Share of rows labeled as outbreaks, when labels exist
    pub outbreak_rate: Option<f64>,
}

impl fmt::Display for FrameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rows, {} entities", self.rows, self.entities)?;
        if let (Some(start), Some(end)) = (self.time_start, self.time_end) {
            write!(
                f,
                ", {}..{}",
                self.time_kind.format(start),
                self.time_kind.format(end)
            )?;
        }
        if let Some(rate) = self.outbreak_rate {
            write!(f, ", outbreak rate {:.1}%", rate * 100.0)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeBoundary;

    fn raw() -> DataFrame {
        df!(
            "entity_id" => ["b", "a", "a", "b", "a"],
            "time_key" => [2001i64, 2002, 2001, 2000, 2003],
            "target_signal" => [Some(3.0), Some(2.0), Some(1.0), Some(4.0), None],
            "population" => [10.0, 20.0, 20.0, 10.0, 20.0],
            "county" => ["B", "A", "A", "B", "A"],
        )
        .unwrap()
    }

    #[test]
    fn test_new_sorts_and_drops_null_targets() {
        let frame = FeatureFrame::new(raw(), ColumnNames::default()).unwrap();
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.time_kind(), TimeKind::Integer);
        assert_eq!(frame.entities().unwrap(), vec!["a", "b"]);
        assert_eq!(frame.time_keys().unwrap(), vec![2001, 2002, 2000, 2001]);
    }

    #[test]
    fn test_feature_columns_exclude_keys_and_strings() {
        let frame = FeatureFrame::new(raw(), ColumnNames::default()).unwrap();
        assert_eq!(frame.feature_columns(), vec!["target_signal", "population"]);
    }

    #[test]
    fn test_time_range_spans_keys() {
        let frame = FeatureFrame::new(raw(), ColumnNames::default()).unwrap();
        assert_eq!(
            frame.time_range().unwrap(),
            TimeRange::between(TimeBoundary::Integer(2000), TimeBoundary::Integer(2002))
        );
    }

    #[test]
    fn test_missing_column() {
        let df = df!("entity_id" => ["a"], "time_key" => [1i64]).unwrap();
        let err = FeatureFrame::new(df, ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(name) if name == "target_signal"));
    }

    #[test]
    fn test_string_time_key_is_rejected() {
        let df = df!(
            "entity_id" => ["a"],
            "time_key" => ["2020"],
            "target_signal" => [1.0],
        )
        .unwrap();
        let err = FeatureFrame::new(df, ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::InvalidColumnType { .. }));
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let df = df!(
            "entity_id" => ["a", "a"],
            "time_key" => [2020i64, 2020],
            "target_signal" => [1.0, 2.0],
        )
        .unwrap();
        let err = FeatureFrame::new(df, ColumnNames::default()).unwrap_err();
        assert!(matches!(err, DataError::DuplicateKeys { count: 1 }));
    }

    #[test]
    fn test_summary_with_labels() {
        let df = df!(
            "entity_id" => ["a", "a", "b", "b"],
            "time_key" => [1i64, 2, 1, 2],
            "target_signal" => [1.0, 2.0, 3.0, 4.0],
            "outbreak" => [0i64, 1, 0, 0],
        )
        .unwrap();
        let frame = FeatureFrame::new(df, ColumnNames::default()).unwrap();
        let summary = frame.summary().unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.time_start, Some(1));
        assert_eq!(summary.time_end, Some(2));
        assert_eq!(summary.outbreak_rate, Some(0.25));
        assert!(summary.to_string().contains("outbreak rate 25.0%"));
    }

    #[test]
    fn test_join_covariates() {
        let frame = FeatureFrame::new(raw(), ColumnNames::default()).unwrap();
        let climate = df!(
            "entity_id" => ["a", "a", "b"],
            "time_key" => [2001i64, 2002, 2000],
            "avg_temp" => [55.0, 57.5, 60.0],
            "target_signal" => [99.0, 99.0, 99.0],
        )
        .unwrap();

        let joined = frame.join_covariates(&climate).unwrap();
        assert_eq!(joined.height(), 3);
        assert!(joined.feature_columns().contains(&"avg_temp".to_string()));
        let targets: Vec<f64> = joined
            .data()
            .column("target_signal")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(targets, vec![1.0, 2.0, 4.0]);
    }
}
