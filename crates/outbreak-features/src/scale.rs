//! Feature standardization.

use crate::error::{FeatureError, Result};
use crate::window::WindowSet;
use ndarray::{Array2, Axis};
use outbreak_data::FeatureFrame;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-column z-scoring with statistics fitted on training rows.
///
/// Uses the population standard deviation; a constant column is scaled by 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl FeatureScaler {
    /// Fit mean and standard deviation of each column over the frame's rows.
    pub fn fit(frame: &FeatureFrame, columns: &[String]) -> Result<Self> {
        let mut means = Vec::with_capacity(columns.len());
        let mut stds = Vec::with_capacity(columns.len());

        for name in columns {
            let values = frame
                .data()
                .column(name.as_str())
                .map_err(|_| FeatureError::DataShape(format!("feature column {name} is missing")))?
                .cast(&DataType::Float64)?;
            let values = values.f64()?;

            let mean = values.mean().ok_or_else(|| {
                FeatureError::DataShape(format!("feature column {name} has no values"))
            })?;
            let std = values
                .std(0)
                .filter(|std| std.is_finite() && *std > 0.0)
                .unwrap_or(1.0);

            means.push(mean);
            stds.push(std);
        }

        Ok(Self {
            columns: columns.to_vec(),
            means,
            stds,
        })
    }

    /// Scaler from known statistics, e.g. restored from elsewhere.
    pub fn from_parts(columns: Vec<String>, means: Vec<f64>, stds: Vec<f64>) -> Result<Self> {
        if means.len() != columns.len() || stds.len() != columns.len() {
            return Err(FeatureError::InvalidConfig(format!(
                "{} columns but {} means and {} stds",
                columns.len(),
                means.len(),
                stds.len()
            )));
        }
        if let Some(std) = stds.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(FeatureError::InvalidConfig(format!(
                "standard deviations must be positive, got {std}"
            )));
        }
        Ok(Self {
            columns,
            means,
            stds,
        })
    }

    /// Ordered columns the scaler was fitted on.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Fitted means.
    pub fn means(&self) -> &[f64] {
        &self.means
    }

    /// Fitted standard deviations (never zero).
    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    /// Standardize an `L x F` sequence in place.
    pub fn transform_sequence(&self, sequence: &mut Array2<f64>) -> Result<()> {
        if sequence.ncols() != self.columns.len() {
            return Err(FeatureError::DataShape(format!(
                "sequence has {} features, scaler expects {}",
                sequence.ncols(),
                self.columns.len()
            )));
        }
        for (j, mut column) in sequence.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = (self.means[j], self.stds[j]);
            column.mapv_inplace(|x| (x - mean) / std);
        }
        Ok(())
    }

    /// Standardize every window of a set in place.
    ///
    /// The set must follow the same ordered feature schema as the scaler.
    pub fn transform(&self, set: &mut WindowSet) -> Result<()> {
        if set.feature_columns != self.columns {
            return Err(FeatureError::DataShape(format!(
                "window features {:?} do not match scaler features {:?}",
                set.feature_columns, self.columns
            )));
        }
        for window in &mut set.windows {
            self.transform_sequence(&mut window.sequence)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::SequenceWindower;
    use approx::assert_relative_eq;
    use ndarray::array;
    use outbreak_data::ColumnNames;

    fn frame() -> FeatureFrame {
        let df = df!(
            "entity_id" => ["a", "a", "a", "a"],
            "time_key" => [1i64, 2, 3, 4],
            "target_signal" => [2.0, 4.0, 4.0, 6.0],
            "population" => [7.0, 7.0, 7.0, 7.0],
            "outbreak" => [0i32, 0, 0, 1],
        )
        .unwrap();
        FeatureFrame::new(df, ColumnNames::default()).unwrap()
    }

    fn columns() -> Vec<String> {
        vec!["target_signal".to_string(), "population".to_string()]
    }

    #[test]
    fn test_fit_population_statistics() {
        let scaler = FeatureScaler::fit(&frame(), &columns()).unwrap();
        assert_relative_eq!(scaler.means()[0], 4.0);
        assert_relative_eq!(scaler.stds()[0], 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(scaler.means()[1], 7.0);
        assert_relative_eq!(scaler.stds()[1], 1.0);
    }

    #[test]
    fn test_transform_sequence() {
        let scaler = FeatureScaler::fit(&frame(), &columns()).unwrap();
        let mut sequence = array![[4.0, 7.0], [6.0, 8.0]];
        scaler.transform_sequence(&mut sequence).unwrap();
        assert_relative_eq!(sequence[[0, 0]], 0.0);
        assert_relative_eq!(sequence[[1, 0]], 2.0 / 2.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(sequence[[1, 1]], 1.0);

        let mut wrong = array![[1.0, 2.0, 3.0]];
        assert!(scaler.transform_sequence(&mut wrong).is_err());
    }

    #[test]
    fn test_transform_requires_matching_schema() {
        let scaler = FeatureScaler::fit(&frame(), &columns()[..1]).unwrap();
        let mut set = SequenceWindower::new(2).unwrap().windows(&frame()).unwrap();
        assert!(matches!(
            scaler.transform(&mut set),
            Err(FeatureError::DataShape(_))
        ));

        let scaler = FeatureScaler::fit(&frame(), &columns()).unwrap();
        scaler.transform(&mut set).unwrap();
        assert_relative_eq!(set.windows[0].sequence[[0, 0]], -2.0 / 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_from_parts() {
        let scaler = FeatureScaler::from_parts(columns(), vec![1.0, 2.0], vec![0.5, 4.0]).unwrap();
        let mut sequence = array![[2.0, 10.0]];
        scaler.transform_sequence(&mut sequence).unwrap();
        assert_relative_eq!(sequence[[0, 0]], 2.0);
        assert_relative_eq!(sequence[[0, 1]], 2.0);

        assert!(FeatureScaler::from_parts(columns(), vec![1.0], vec![1.0, 1.0]).is_err());
        assert!(FeatureScaler::from_parts(columns(), vec![1.0, 2.0], vec![1.0, 0.0]).is_err());
    }
}
