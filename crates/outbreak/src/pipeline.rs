//! End-to-end pipeline runs.
//!
//! ```text
//! FeatureFrame -> label -> lag -> split -> windows (per pool)
//!              -> scale -> train -> best checkpoint -> evaluate
//! ```

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use outbreak_data::{
    CsvFeatureSource, FeatureFrame, FeatureSource, FrameSummary, join_sources, read_csv, write_csv,
};
use outbreak_features::{
    FeatureScaler, FrameStage, SequenceWindower, TemporalSplitter, WindowSet,
};
use outbreak_model::{
    Checkpoint, Evaluation, ImbalancedSequenceTrainer, LstmClassifier, ModelSchema,
    SequenceEvaluator, TrainOutcome,
};
use outbreak_output::{EpochMetrics, ExportFormat, Exporter, Report, ReportBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Summaries of the row pools of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSummaries {
    /// Training rows
    pub train: FrameSummary,
    /// Validation rows
    pub validation: FrameSummary,
    /// Test rows, when a test boundary is configured
    pub test: Option<FrameSummary>,
}

/// Raw windows of every pool plus the scaler fitted on training rows.
#[derive(Debug, Clone)]
pub struct Datasets {
    /// Training windows
    pub train: WindowSet,
    /// Validation windows
    pub validation: WindowSet,
    /// Test windows, when a test boundary is configured
    pub test: Option<WindowSet>,
    /// Standardization fitted on the training pool rows
    pub scaler: FeatureScaler,
    /// Row pool summaries
    pub summaries: PoolSummaries,
}

impl Datasets {
    /// Ordered feature columns shared by every pool.
    pub fn feature_columns(&self) -> &[String] {
        &self.train.feature_columns
    }

    /// Windows of the final evaluation: test when present, else validation.
    pub fn evaluation(&self) -> &WindowSet {
        self.test.as_ref().unwrap_or(&self.validation)
    }
}

/// Result of [`Pipeline::train`].
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Training history and best checkpoint
    pub training: TrainOutcome<LstmClassifier>,
    /// Evaluation of the best checkpoint on the held-out windows
    pub evaluation: Evaluation,
    /// Row pool summaries
    pub summaries: PoolSummaries,
}

impl PipelineOutcome {
    /// Report envelope of the run.
    pub fn report(&self) -> Result<Report> {
        Ok(ReportBuilder::new()
            .title("training")
            .model_version(self.training.best.model_version())
            .section("pools", &self.summaries)?
            .section("metrics", &self.evaluation.report)?
            .section("history", &self.training.history)?
            .build())
    }

    /// Write the report, metrics, training curve and ROC curve to `dir`.
    pub fn write_artifacts(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let report = dir.join("report.json");
        self.report()?.write_to_file(&report)?;

        let metrics = dir.join("metrics.csv");
        self.evaluation
            .report
            .export_to_file(&metrics, ExportFormat::Csv)?;

        let history = dir.join("history.csv");
        self.training
            .history
            .export_to_file(&history, ExportFormat::Csv)?;

        let roc = dir.join("roc.csv");
        self.evaluation.roc.export_to_file(&roc, ExportFormat::Csv)?;

        tracing::info!(dir = %dir.display(), "artifacts written");
        Ok(vec![report, metrics, history, roc])
    }
}

/// Orchestrates the stages of a run from a validated configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Pipeline over a configuration, which is validated first.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration of the run.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a CSV feature frame, keeping the entity column as text, and join
    /// the configured covariate sources over its time range.
    pub fn load_frame(&self, path: &Path) -> Result<FeatureFrame> {
        let columns = &self.config.columns;
        let df = read_csv(path, &[columns.entity.as_str()])?;
        let mut frame = FeatureFrame::new(df, columns.clone())?;
        if !self.config.sources.is_empty() {
            let sources: Vec<CsvFeatureSource> = self
                .config
                .sources
                .iter()
                .map(|source| CsvFeatureSource::new(&source.name, &source.path, columns))
                .collect();
            let sources: Vec<&dyn FeatureSource> =
                sources.iter().map(|s| s as &dyn FeatureSource).collect();
            frame = join_sources(&frame, &sources, &frame.time_range()?)?;
        }
        tracing::info!(path = %path.display(), summary = %frame.summary()?, "loaded frame");
        Ok(frame)
    }

    /// Add outbreak labels unless the frame already carries them and
    /// relabeling is off.
    pub fn label(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        if frame.has_label() && !self.config.relabel {
            tracing::info!(column = %frame.columns().label, "using existing labels");
            return Ok(frame.clone());
        }
        Ok(self.config.labeler()?.apply(frame)?)
    }

    /// Label and lag a frame. Lag columns already present are kept as is.
    pub fn prepare(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let labeled = self.label(frame)?;
        let builder = self.config.lag_builder()?;
        let lagged = builder
            .lag_columns(labeled.columns())
            .iter()
            .all(|name| labeled.data().column(name.as_str()).is_ok());
        let prepared = if lagged {
            tracing::info!("lag columns present, skipping lag stage");
            labeled
        } else {
            builder.apply(&labeled)?
        };
        tracing::info!(summary = %prepared.summary()?, "prepared frame");
        Ok(prepared)
    }

    /// Prepare a CSV file and write the result to another CSV file.
    pub fn prepare_file(&self, input: &Path, output: &Path) -> Result<FrameSummary> {
        let prepared = self.prepare(&self.load_frame(input)?)?;
        write_csv(prepared.data(), output)?;
        Ok(prepared.summary()?)
    }

    fn splitter(&self) -> Result<TemporalSplitter> {
        let splitter = TemporalSplitter::new(self.config.split_boundary()?);
        Ok(match self.config.test_boundary {
            Some(test_boundary) => splitter.with_test_boundary(test_boundary),
            None => splitter,
        })
    }

    /// Prepare, split and window a frame.
    ///
    /// The training pool defines the feature schema, which the other pools
    /// must follow.
    pub fn datasets(&self, frame: &FeatureFrame) -> Result<Datasets> {
        let prepared = self.prepare(frame)?;
        let split = self.splitter()?.split(&prepared)?;

        let windower = self.config.windower()?;
        let train = windower.windows(&split.train)?;
        let windower = windower.with_feature_columns(train.feature_columns.clone());
        let validation = windower.windows(&split.validation)?;
        let test = split
            .test
            .as_ref()
            .map(|pool| windower.windows(pool))
            .transpose()?;
        let scaler = FeatureScaler::fit(&split.train, &train.feature_columns)?;

        let pools = [("train", Some(&train)), ("validation", Some(&validation)), ("test", test.as_ref())];
        for (pool, set) in pools {
            let Some(set) = set else { continue };
            tracing::info!(
                pool,
                windows = set.len(),
                positives = set.positives(),
                skipped_entities = set.skipped_entities.len(),
                "windows built"
            );
        }

        Ok(Datasets {
            summaries: PoolSummaries {
                train: split.train.summary()?,
                validation: split.validation.summary()?,
                test: split.test.as_ref().map(FeatureFrame::summary).transpose()?,
            },
            train,
            validation,
            test,
            scaler,
        })
    }

    /// Train on a frame and evaluate the best checkpoint on its holdout.
    ///
    /// With `resume` set and a checkpoint at `checkpoint_path`, training
    /// continues from it and its schema and scaler are reused.
    pub fn train(
        &self,
        frame: &FeatureFrame,
        observer: &mut dyn FnMut(&EpochMetrics),
    ) -> Result<PipelineOutcome> {
        let datasets = self.datasets(frame)?;
        let path = &self.config.checkpoint_path;
        let trainer = ImbalancedSequenceTrainer::new(self.config.trainer_config(), path)?;

        let resume_from = if self.config.resume && path.exists() {
            Some(Checkpoint::<LstmClassifier>::load(path)?)
        } else {
            if self.config.resume {
                tracing::info!(path = %path.display(), "no checkpoint to resume, starting fresh");
            }
            None
        };

        let schema = match &resume_from {
            Some(checkpoint) => {
                let schema = &checkpoint.schema;
                if schema.feature_columns != datasets.feature_columns() {
                    return Err(PipelineError::SchemaMismatch {
                        checkpoint: schema.feature_columns.clone(),
                        frame: datasets.feature_columns().to_vec(),
                    });
                }
                if schema.window_length != self.config.window_length {
                    return Err(PipelineError::Config(format!(
                        "checkpoint uses windows of {} rows, configuration asks for {}",
                        schema.window_length, self.config.window_length
                    )));
                }
                schema.clone()
            }
            None => ModelSchema {
                columns: self.config.columns.clone(),
                feature_columns: datasets.feature_columns().to_vec(),
                window_length: self.config.window_length,
                scaler: datasets.scaler.clone(),
            },
        };

        let mut train = datasets.train.clone();
        let mut validation = datasets.validation.clone();
        schema.scaler.transform(&mut train)?;
        schema.scaler.transform(&mut validation)?;

        let training = match resume_from {
            Some(checkpoint) => trainer.resume(checkpoint, &train, &validation, observer)?,
            None => {
                let model =
                    LstmClassifier::new(schema.feature_columns.len(), self.config.model.clone())?;
                tracing::info!(parameters = model.num_parameters(), "initialized classifier");
                trainer.train(model, &train, &validation, schema, observer)?
            }
        };

        let evaluation = self.evaluator().evaluate(&training.best, datasets.evaluation())?;
        Ok(PipelineOutcome {
            training,
            evaluation,
            summaries: datasets.summaries,
        })
    }

    /// Evaluate a checkpoint on the holdout pool of a frame.
    ///
    /// The frame is prepared and split like in training; windows follow the
    /// checkpoint's feature schema and window length.
    pub fn evaluate(
        &self,
        checkpoint: &Checkpoint<LstmClassifier>,
        frame: &FeatureFrame,
    ) -> Result<Evaluation> {
        let prepared = self.prepare(frame)?;
        let split = self.splitter()?.split(&prepared)?;
        let windows = SequenceWindower::new(checkpoint.schema.window_length)?
            .with_feature_columns(checkpoint.schema.feature_columns.clone())
            .windows(split.evaluation())?;
        Ok(self.evaluator().evaluate(checkpoint, &windows)?)
    }

    fn evaluator(&self) -> SequenceEvaluator {
        SequenceEvaluator::new().with_batch_size(self.config.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbreak_data::{ColumnNames, TimeBoundary};
    use polars::prelude::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            lag_depths: vec![1],
            split_boundary: Some(TimeBoundary::Integer(2018)),
            ..PipelineConfig::default()
        }
    }

    fn spike_series() -> FeatureFrame {
        let df = df!(
            "entity_id" => ["00001"; 6],
            "time_key" => [2015i64, 2016, 2017, 2018, 2019, 2020],
            "target_signal" => [5.0, 5.0, 5.0, 5.0, 20.0, 5.0],
        )
        .unwrap();
        FeatureFrame::new(df, ColumnNames::default()).unwrap()
    }

    #[test]
    fn test_prepare_labels_then_lags() {
        let pipeline = Pipeline::new(config()).unwrap();
        let prepared = pipeline.prepare(&spike_series()).unwrap();
        assert_eq!(prepared.height(), 5);

        let labels: Vec<Option<i32>> = prepared
            .data()
            .column("outbreak")
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(1), Some(0)]);

        // A prepared frame passes through unchanged.
        let again = pipeline.prepare(&prepared).unwrap();
        assert_eq!(again.height(), 5);
    }

    #[test]
    fn test_existing_labels_are_kept() {
        let df = df!(
            "entity_id" => ["a", "a", "a"],
            "time_key" => [1i64, 2, 3],
            "target_signal" => [1.0, 1.0, 50.0],
            "outbreak" => [1i32, 0, 0],
        )
        .unwrap();
        let frame = FeatureFrame::new(df, ColumnNames::default()).unwrap();

        let kept = Pipeline::new(config()).unwrap().label(&frame).unwrap();
        let relabeled = Pipeline::new(PipelineConfig {
            relabel: true,
            ..config()
        })
        .unwrap()
        .label(&frame)
        .unwrap();

        let first = |f: &FeatureFrame| f.data().column("outbreak").unwrap().i32().unwrap().get(0);
        assert_eq!(first(&kept), Some(1));
        assert_eq!(first(&relabeled), Some(0));
    }

    #[test]
    fn test_datasets_share_training_schema() {
        let pipeline = Pipeline::new(PipelineConfig {
            window_length: 2,
            ..config()
        })
        .unwrap();
        let datasets = pipeline.datasets(&spike_series()).unwrap();

        // Rows 2016..=2018 train, 2019..=2020 holdout.
        assert_eq!(datasets.train.len(), 2);
        assert_eq!(datasets.validation.len(), 1);
        assert!(datasets.test.is_none());
        assert_eq!(datasets.evaluation().len(), 1);
        assert_eq!(datasets.validation.feature_columns, datasets.train.feature_columns);
        assert_eq!(datasets.summaries.train.rows, 3);
        assert_eq!(datasets.summaries.validation.rows, 2);
    }

    #[test]
    fn test_new_rejects_missing_boundary() {
        assert!(matches!(
            Pipeline::new(PipelineConfig::default()),
            Err(PipelineError::Config(_))
        ));
    }
}
