//! Covariates read from a local CSV file.

use super::{FeatureSource, TimeRange};
use crate::error::{DataError, Result};
use crate::frame::ColumnNames;
use crate::io::read_csv;
use crate::time::TimeKind;
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Feature source backed by a CSV file with entity and time key columns.
#[derive(Debug, Clone)]
pub struct CsvFeatureSource {
    name: String,
    path: PathBuf,
    entity_column: String,
    time_column: String,
}

impl CsvFeatureSource {
    /// Create a source using the key column names of a frame.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>, columns: &ColumnNames) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            entity_column: columns.entity.clone(),
            time_column: columns.time.clone(),
        }
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FeatureSource for CsvFeatureSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, entities: &[String], range: &TimeRange) -> Result<DataFrame> {
        let entity = self.entity_column.as_str();
        let time = self.time_column.as_str();

        let df = read_csv(&self.path, &[entity])?;
        for name in [entity, time] {
            if df.column(name).is_err() {
                return Err(DataError::MissingColumn(name.to_string()));
            }
        }

        let kind = match df.column(time)?.dtype() {
            DataType::Date => TimeKind::Date,
            dtype if dtype.is_integer() => TimeKind::Integer,
            dtype => {
                return Err(DataError::InvalidColumnType {
                    column: time.to_string(),
                    dtype: dtype.to_string(),
                });
            }
        };

        let mut lf = df.lazy();

        let (start, end) = range.to_physical(kind)?;
        if let Some(start) = start {
            lf = lf.filter(col(time).cast(DataType::Int64).gt_eq(lit(start)));
        }
        if let Some(end) = end {
            lf = lf.filter(col(time).cast(DataType::Int64).lt_eq(lit(end)));
        }

        if !entities.is_empty() {
            let wanted = DataFrame::new(vec![
                Series::new(entity.into(), entities.to_vec()).into(),
            ])?;
            lf = lf.join(
                wanted.lazy(),
                [col(entity)],
                [col(entity)],
                JoinArgs::new(JoinType::Inner),
            );
        }

        let df = lf.collect()?;
        if df.height() == 0 {
            return Err(DataError::MissingData {
                source_name: self.name.clone(),
                reason: "no rows match the requested entities and time range".to_string(),
            });
        }

        tracing::info!(source = %self.name, rows = df.height(), "fetched covariates");
        Ok(df)
    }
}
