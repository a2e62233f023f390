//! Prediction input files.
//!
//! A prediction file is a JSON array of windows. Each window is either a
//! matrix of raw feature values (rows oldest first, columns in the model's
//! feature order) or a list of rows keyed by feature name:
//!
//! ```json
//! [
//!   [[5.0, 5.0, 5.0], [5.0, 5.0, 5.0], [20.0, 5.0, 5.0]],
//!   [{"target_signal": 5.0, "rainfall": 2.0}, ...]
//! ]
//! ```

use ndarray::Array2;
use outbreak::{Prediction, PredictionService, ServiceError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum InputError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid prediction input: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Window {index} has rows of unequal length")]
    Ragged { index: usize },

    #[error("Window {index}: {source}")]
    Prediction {
        index: usize,
        #[source]
        source: ServiceError,
    },
}

/// One window of a prediction file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub(crate) enum WindowInput {
    Positional(Vec<Vec<f64>>),
    Named(Vec<HashMap<String, f64>>),
}

impl WindowInput {
    fn predict(
        &self,
        service: &PredictionService,
        index: usize,
    ) -> Result<Prediction, InputError> {
        let prediction = match self {
            Self::Positional(rows) => service.predict(&to_matrix(rows, index)?),
            Self::Named(rows) => service.predict_named(rows),
        };
        prediction.map_err(|source| InputError::Prediction { index, source })
    }
}

fn to_matrix(rows: &[Vec<f64>], index: usize) -> Result<Array2<f64>, InputError> {
    let width = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != width) {
        return Err(InputError::Ragged { index });
    }
    let values: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), values).map_err(|_| InputError::Ragged { index })
}

pub(crate) fn parse_windows(text: &str) -> Result<Vec<WindowInput>, InputError> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn read_windows(path: &Path) -> Result<Vec<WindowInput>, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_windows(&text)
}

/// Predict every window, in file order.
pub(crate) fn predict_all(
    service: &PredictionService,
    windows: &[WindowInput],
) -> Result<Vec<Prediction>, InputError> {
    windows
        .iter()
        .enumerate()
        .map(|(index, window)| window.predict(service, index))
        .collect()
}
