//! Fixed-length sliding windows over each entity's time series.

use crate::error::{FeatureError, Result};
use ndarray::Array2;
use outbreak_data::{FeatureFrame, TimeKind};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// One training or inference example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Entity the rows belong to
    pub entity: String,
    /// `L x F` feature matrix, oldest row first
    pub sequence: Array2<f64>,
    /// Outbreak label of the last row
    pub label: u8,
    /// Physical time key of the last row
    pub end_time: i64,
}

/// Windows cut from one frame, with the feature schema they follow.
#[derive(Debug, Clone)]
pub struct WindowSet {
    /// Ordered feature columns of every sequence
    pub feature_columns: Vec<String>,
    /// Representation of `end_time`
    pub time_kind: TimeKind,
    /// Windows ordered by entity, then start offset
    pub windows: Vec<Window>,
    /// Entities dropped because of missing values
    pub skipped_entities: Vec<String>,
}

impl WindowSet {
    /// Number of windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the set has no windows.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Labels in window order.
    pub fn labels(&self) -> Vec<u8> {
        self.windows.iter().map(|w| w.label).collect()
    }

    /// Number of windows labeled as outbreaks.
    pub fn positives(&self) -> usize {
        self.windows.iter().filter(|w| w.label == 1).count()
    }

    /// Sequences in window order.
    pub fn sequences(&self) -> Vec<&Array2<f64>> {
        self.windows.iter().map(|w| &w.sequence).collect()
    }
}

/// Cuts per-entity sliding windows of a fixed length.
#[derive(Debug, Clone)]
pub struct SequenceWindower {
    length: usize,
    feature_columns: Option<Vec<String>>,
}

impl SequenceWindower {
    /// Windower inferring the feature columns from the frame.
    pub fn new(length: usize) -> Result<Self> {
        if length == 0 {
            return Err(FeatureError::InvalidConfig(
                "window length must be positive".to_string(),
            ));
        }
        Ok(Self {
            length,
            feature_columns: None,
        })
    }

    /// Use an explicit, ordered feature schema (e.g. from a checkpoint or the
    /// training pool).
    pub fn with_feature_columns(mut self, columns: Vec<String>) -> Self {
        self.feature_columns = Some(columns);
        self
    }

    /// Window length.
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Build windows from a labeled frame.
    ///
    /// An entity with fewer rows than the window length yields no windows.
    /// An entity with a missing feature or label value is skipped and logged.
    /// A requested feature column absent from the frame, or an empty result,
    /// is a [`FeatureError::DataShape`].
    pub fn windows(&self, frame: &FeatureFrame) -> Result<WindowSet> {
        let names = frame.columns();
        let feature_columns = match &self.feature_columns {
            Some(columns) => columns.clone(),
            None => frame.feature_columns(),
        };
        if feature_columns.is_empty() {
            return Err(FeatureError::DataShape(
                "frame has no numeric feature columns".to_string(),
            ));
        }

        let df = frame.data();
        let mut features = Vec::with_capacity(feature_columns.len());
        for name in &feature_columns {
            let column = df.column(name.as_str()).map_err(|_| {
                FeatureError::DataShape(format!("feature column {name} is missing"))
            })?;
            let values: Vec<Option<f64>> = column
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .collect();
            features.push(values);
        }

        let labels: Vec<Option<i32>> = df
            .column(names.label.as_str())
            .map_err(|_| {
                FeatureError::DataShape(format!("label column {} is missing", names.label))
            })?
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .collect();
        let entities: Vec<Option<&str>> = df.column(names.entity.as_str())?.str()?.into_iter().collect();
        let times = frame.time_keys()?;

        let mut windows = Vec::new();
        let mut skipped_entities = Vec::new();

        let mut start = 0;
        while start < entities.len() {
            let entity = entities[start];
            let mut end = start;
            while end < entities.len() && entities[end] == entity {
                end += 1;
            }
            let entity = entity.unwrap_or_default().to_string();

            let complete = (start..end).all(|row| {
                labels[row].is_some() && features.iter().all(|column| column[row].is_some())
            });
            if !complete {
                tracing::warn!(%entity, "skipping entity with missing feature or label values");
                skipped_entities.push(entity);
                start = end;
                continue;
            }

            let rows = end - start;
            if rows >= self.length {
                for offset in start..=end - self.length {
                    let last = offset + self.length - 1;
                    let sequence = Array2::from_shape_fn(
                        (self.length, feature_columns.len()),
                        |(t, f)| features[f][offset + t].unwrap_or_default(),
                    );
                    windows.push(Window {
                        entity: entity.clone(),
                        sequence,
                        label: u8::from(labels[last].unwrap_or_default() > 0),
                        end_time: times[last],
                    });
                }
            }
            start = end;
        }

        if windows.is_empty() {
            return Err(FeatureError::DataShape(format!(
                "no windows of length {} could be built from {} rows ({} entities skipped)",
                self.length,
                frame.height(),
                skipped_entities.len()
            )));
        }

        tracing::debug!(
            windows = windows.len(),
            skipped = skipped_entities.len(),
            "built windows"
        );

        Ok(WindowSet {
            feature_columns,
            time_kind: frame.time_kind(),
            windows,
            skipped_entities,
        })
    }
}
