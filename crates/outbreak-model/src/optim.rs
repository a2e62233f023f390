//! Optimizer and learning-rate schedule.

use crate::error::{ModelError, Result};
use ndarray::{ArrayD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

/// Adam optimizer with bias-corrected moment estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: u64,
    first_moments: Vec<ArrayD<f64>>,
    second_moments: Vec<ArrayD<f64>>,
}

impl Adam {
    /// Adam with the usual betas (0.9, 0.999) and epsilon 1e-8.
    pub const fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moments: Vec::new(),
            second_moments: Vec::new(),
        }
    }

    /// Current learning rate.
    pub const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Set the learning rate used by subsequent steps.
    pub const fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Number of updates applied so far.
    pub const fn steps(&self) -> u64 {
        self.step
    }

    /// Apply one update. Parameters and gradients are matched by position.
    pub fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: &[ArrayD<f64>]) -> Result<()> {
        if params.len() != grads.len() {
            return Err(ModelError::Shape(format!(
                "{} parameters but {} gradients",
                params.len(),
                grads.len()
            )));
        }
        if self.first_moments.is_empty() {
            self.first_moments = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
            self.second_moments = grads.iter().map(|g| ArrayD::zeros(g.raw_dim())).collect();
        }
        if self.first_moments.len() != grads.len() {
            return Err(ModelError::Shape(format!(
                "optimizer tracks {} parameters, got {}",
                self.first_moments.len(),
                grads.len()
            )));
        }

        self.step += 1;
        let t = i32::try_from(self.step).unwrap_or(i32::MAX);
        let (b1, b2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let correction1 = 1.0 - b1.powi(t);
        let correction2 = 1.0 - b2.powi(t);

        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads)
            .zip(&mut self.first_moments)
            .zip(&mut self.second_moments)
        {
            if param.shape() != grad.shape() || m.shape() != grad.shape() {
                return Err(ModelError::Shape(format!(
                    "parameter shape {:?} does not match gradient shape {:?}",
                    param.shape(),
                    grad.shape()
                )));
            }
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
        Ok(())
    }
}

/// Reduce-on-plateau learning-rate schedule on a loss to minimize.
///
/// A loss counts as an improvement when it is below `best * (1 - threshold)`.
/// After more than `patience` consecutive epochs without improvement the
/// learning rate is multiplied by `factor` and the counter restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateauScheduler {
    factor: f64,
    patience: usize,
    threshold: f64,
    min_learning_rate: f64,
    best: Option<f64>,
    bad_epochs: usize,
}

impl PlateauScheduler {
    /// Scheduler with a reduction factor and patience.
    pub fn new(factor: f64, patience: usize) -> Result<Self> {
        if factor.is_nan() || factor <= 0.0 || factor >= 1.0 {
            return Err(ModelError::InvalidConfig(format!(
                "plateau factor must be in (0, 1), got {factor}"
            )));
        }
        Ok(Self {
            factor,
            patience,
            threshold: 1e-4,
            min_learning_rate: 0.0,
            best: None,
            bad_epochs: 0,
        })
    }

    /// Best loss seen so far.
    pub const fn best(&self) -> Option<f64> {
        self.best
    }

    /// Record an epoch's loss and return the learning rate for the next epoch.
    pub fn step(&mut self, loss: f64, learning_rate: f64) -> f64 {
        if self
            .best
            .is_none_or(|best| loss < best * (1.0 - self.threshold))
        {
            self.best = Some(loss);
            self.bad_epochs = 0;
            return learning_rate;
        }

        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            self.bad_epochs = 0;
            let reduced = (learning_rate * self.factor).max(self.min_learning_rate);
            tracing::info!(from = learning_rate, to = reduced, "reducing learning rate");
            return reduced;
        }
        learning_rate
    }
}
