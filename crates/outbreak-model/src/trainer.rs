//! Class-imbalance aware training loop.
//!
//! Each epoch shuffles the training windows into mini-batches, minimizes
//! positive-weighted binary cross-entropy with Adam, then scores the
//! validation windows. The validation loss drives a reduce-on-plateau
//! learning-rate schedule and early stopping; every strict improvement is
//! persisted as a [`Checkpoint`].

use crate::checkpoint::{Checkpoint, ModelSchema};
use crate::classifier::SequenceClassifier;
use crate::error::{ModelError, Result};
use crate::loss::{WeightedBce, pos_weight, sigmoid};
use crate::metrics::auc_or_zero;
use crate::optim::{Adam, PlateauScheduler};
use chrono::Utc;
use ndarray::{Array1, Array2};
use outbreak_features::WindowSet;
use outbreak_output::{EpochMetrics, StopReason, TrainingHistory};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Initial Adam learning rate
    pub learning_rate: f64,
    /// Upper bound on the number of epochs
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Windows per mini-batch
    pub batch_size: usize,
    /// Epochs without improvement before the learning rate is reduced
    pub lr_plateau_patience: usize,
    /// Learning-rate reduction factor
    pub lr_plateau_factor: f64,
    /// Seed for shuffling and dropout
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            max_epochs: 50,
            patience: 10,
            batch_size: 64,
            lr_plateau_patience: 5,
            lr_plateau_factor: 0.5,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Check that every hyperparameter is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.max_epochs == 0 {
            return Err(ModelError::InvalidConfig("max_epochs must be positive".to_string()));
        }
        if self.patience == 0 {
            return Err(ModelError::InvalidConfig("patience must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch_size must be positive".to_string()));
        }
        PlateauScheduler::new(self.lr_plateau_factor, self.lr_plateau_patience)?;
        Ok(())
    }
}

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainOutcome<C> {
    /// Where the best checkpoint was written
    pub checkpoint_path: PathBuf,
    /// Best checkpoint, as persisted
    pub best: Checkpoint<C>,
    /// Per-epoch record of the run
    pub history: TrainingHistory,
}

/// Trains a [`SequenceClassifier`] with early stopping and checkpointing.
#[derive(Debug, Clone)]
pub struct ImbalancedSequenceTrainer {
    config: TrainerConfig,
    checkpoint_path: PathBuf,
}

/// Mutable state carried across epochs.
struct RunState<C> {
    model: C,
    optimizer: Adam,
    scheduler: PlateauScheduler,
    schema: ModelSchema,
    first_epoch: usize,
    best: Option<Checkpoint<C>>,
}

impl ImbalancedSequenceTrainer {
    /// Trainer writing its best checkpoint to `checkpoint_path`.
    pub fn new(config: TrainerConfig, checkpoint_path: impl Into<PathBuf>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            checkpoint_path: checkpoint_path.into(),
        })
    }

    /// Hyperparameters.
    pub const fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Checkpoint destination.
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Train a freshly initialized model.
    ///
    /// Windows must already be standardized with `schema.scaler`. The
    /// observer is called once per epoch.
    pub fn train<C>(
        &self,
        model: C,
        train: &WindowSet,
        validation: &WindowSet,
        schema: ModelSchema,
        observer: &mut dyn FnMut(&EpochMetrics),
    ) -> Result<TrainOutcome<C>>
    where
        C: SequenceClassifier + Clone + Serialize,
    {
        let state = RunState {
            model,
            optimizer: Adam::new(self.config.learning_rate),
            scheduler: PlateauScheduler::new(
                self.config.lr_plateau_factor,
                self.config.lr_plateau_patience,
            )?,
            schema,
            first_epoch: 1,
            best: None,
        };
        self.run(state, train, validation, observer)
    }

    /// Continue training from a checkpoint, up to `max_epochs` in total.
    pub fn resume<C>(
        &self,
        checkpoint: Checkpoint<C>,
        train: &WindowSet,
        validation: &WindowSet,
        observer: &mut dyn FnMut(&EpochMetrics),
    ) -> Result<TrainOutcome<C>>
    where
        C: SequenceClassifier + Clone + Serialize,
    {
        tracing::info!(
            epoch = checkpoint.epoch,
            validation_loss = checkpoint.validation_loss,
            "resuming from checkpoint"
        );
        let state = RunState {
            model: checkpoint.model.clone(),
            optimizer: checkpoint.optimizer.clone(),
            scheduler: checkpoint.scheduler.clone(),
            schema: checkpoint.schema.clone(),
            first_epoch: checkpoint.epoch + 1,
            best: Some(checkpoint),
        };
        self.run(state, train, validation, observer)
    }

    fn check_inputs<C: SequenceClassifier>(
        model: &C,
        schema: &ModelSchema,
        train: &WindowSet,
        validation: &WindowSet,
    ) -> Result<()> {
        for (name, set) in [("training", train), ("validation", validation)] {
            if set.is_empty() {
                return Err(ModelError::EmptyWindows(name.to_string()));
            }
            if set.feature_columns != schema.feature_columns {
                return Err(ModelError::Shape(format!(
                    "{name} windows have features {:?}, expected {:?}",
                    set.feature_columns, schema.feature_columns
                )));
            }
        }
        if model.n_features() != schema.feature_columns.len() {
            return Err(ModelError::Shape(format!(
                "model expects {} features, schema has {}",
                model.n_features(),
                schema.feature_columns.len()
            )));
        }
        Ok(())
    }

    fn run<C>(
        &self,
        mut state: RunState<C>,
        train: &WindowSet,
        validation: &WindowSet,
        observer: &mut dyn FnMut(&EpochMetrics),
    ) -> Result<TrainOutcome<C>>
    where
        C: SequenceClassifier + Clone + Serialize,
    {
        Self::check_inputs(&state.model, &state.schema, train, validation)?;

        let pos_weight = pos_weight(&train.labels());
        let bce = WeightedBce::new(pos_weight);
        tracing::info!(
            train_windows = train.len(),
            train_positives = train.positives(),
            validation_windows = validation.len(),
            pos_weight,
            "starting training"
        );

        let seed = self.config.seed.wrapping_add(state.first_epoch as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..train.len()).collect();
        let mut history = TrainingHistory::new(pos_weight);
        let mut bad_epochs = 0;
        let mut stop_reason = StopReason::MaxEpochs;

        for epoch in state.first_epoch..=self.config.max_epochs {
            let learning_rate = state.optimizer.learning_rate();
            indices.shuffle(&mut rng);

            let mut batch_losses = Vec::with_capacity(indices.len() / self.config.batch_size + 1);
            for chunk in indices.chunks(self.config.batch_size) {
                let batch: Vec<&Array2<f64>> =
                    chunk.iter().map(|&i| &train.windows[i].sequence).collect();
                let targets: Array1<f64> = chunk
                    .iter()
                    .map(|&i| f64::from(train.windows[i].label))
                    .collect();

                let (logits, cache) = state.model.forward_train(&batch, &mut rng)?;
                let loss = bce.loss(&logits, &targets);
                if !loss.is_finite() {
                    return Err(ModelError::Diverged { epoch, loss });
                }
                let grads = state.model.backward(&cache, &bce.gradient(&logits, &targets));
                state.optimizer.step(state.model.parameters_mut(), &grads)?;
                batch_losses.push(loss);
            }
            let train_loss = batch_losses.iter().sum::<f64>() / batch_losses.len() as f64;

            let (val_loss, val_auc) = self.score(&state.model, &bce, validation)?;
            if !val_loss.is_finite() {
                return Err(ModelError::Diverged {
                    epoch,
                    loss: val_loss,
                });
            }

            let next_rate = state.scheduler.step(val_loss, learning_rate);
            state.optimizer.set_learning_rate(next_rate);

            let improved = state
                .best
                .as_ref()
                .is_none_or(|best| val_loss < best.validation_loss);
            if improved {
                let checkpoint = Checkpoint {
                    epoch,
                    model: state.model.clone(),
                    optimizer: state.optimizer.clone(),
                    scheduler: state.scheduler.clone(),
                    schema: state.schema.clone(),
                    validation_loss: val_loss,
                    validation_auc: val_auc,
                    created_at: Utc::now(),
                };
                checkpoint.save(&self.checkpoint_path)?;
                state.best = Some(checkpoint);
                bad_epochs = 0;
            } else {
                bad_epochs += 1;
            }

            let metrics = EpochMetrics {
                epoch,
                train_loss,
                val_loss,
                val_auc,
                learning_rate,
                improved,
            };
            tracing::info!(
                epoch,
                train_loss,
                val_loss,
                val_auc,
                learning_rate,
                improved,
                "epoch complete"
            );
            observer(&metrics);
            history.push(metrics);

            if bad_epochs >= self.config.patience {
                stop_reason = StopReason::EarlyStopping;
                break;
            }
        }

        history.finish(stop_reason);
        let best = state.best.ok_or_else(|| {
            ModelError::InvalidConfig(format!(
                "no epoch ran: training starts at epoch {} but max_epochs is {}",
                state.first_epoch, self.config.max_epochs
            ))
        })?;
        tracing::info!(
            best_epoch = best.epoch,
            validation_loss = best.validation_loss,
            stop_reason = %stop_reason,
            path = %self.checkpoint_path.display(),
            "training finished"
        );

        Ok(TrainOutcome {
            checkpoint_path: self.checkpoint_path.clone(),
            best,
            history,
        })
    }

    /// Loss and AUC over a window set, without parameter updates.
    fn score<C: SequenceClassifier>(
        &self,
        model: &C,
        bce: &WeightedBce,
        set: &WindowSet,
    ) -> Result<(f64, f64)> {
        let sequences = set.sequences();
        let mut logits = Vec::with_capacity(set.len());
        for batch in sequences.chunks(self.config.batch_size) {
            logits.extend(model.logits(batch)?);
        }
        let labels = set.labels();
        let targets: Array1<f64> = labels.iter().map(|&y| f64::from(y)).collect();
        let logits = Array1::from(logits);

        let loss = bce.loss(&logits, &targets);
        let probabilities: Vec<f64> = logits.iter().map(|&x| sigmoid(x)).collect();
        Ok((loss, auc_or_zero(&probabilities, &labels, "validation")))
    }
}
