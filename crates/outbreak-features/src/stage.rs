//! Frame-to-frame transformation stages.

use crate::error::{FeatureError, Result};
use outbreak_data::{ColumnNames, FeatureFrame};
use polars::prelude::LazyFrame;

/// A pure transformation of a feature frame.
///
/// Implementors describe the transformation as a lazy plan over the frame's
/// data; [`FrameStage::apply`] validates inputs, executes the plan and wraps
/// the result back into a [`FeatureFrame`].
pub trait FrameStage {
    /// Stage name used in logs and the stage registry.
    fn name(&self) -> &str;

    /// Columns the stage reads, resolved against the frame's column names.
    fn required_columns(&self, columns: &ColumnNames) -> Vec<String>;

    /// Build the lazy plan of the transformation.
    fn transform(&self, data: LazyFrame, columns: &ColumnNames) -> Result<LazyFrame>;

    /// Run the stage on a frame.
    fn apply(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        for column in self.required_columns(frame.columns()) {
            if frame.data().column(column.as_str()).is_err() {
                return Err(FeatureError::DataShape(format!(
                    "stage {} requires column {column}",
                    self.name()
                )));
            }
        }

        let data = self.transform(frame.lazy(), frame.columns())?.collect()?;
        tracing::debug!(
            stage = self.name(),
            rows_in = frame.height(),
            rows_out = data.height(),
            "applied stage"
        );
        Ok(frame.with_data(data))
    }
}
