//! Class-weighted binary cross-entropy on logits.
//!
//! For a logit `x`, label `y` and positive weight `w`:
//!
//! ```text
//! loss = w * y * softplus(-x) + (1 - y) * softplus(x)
//! dloss/dx = w * y * (sigmoid(x) - 1) + (1 - y) * sigmoid(x)
//! ```
//!
//! which is `-[w * y * ln(sigmoid(x)) + (1 - y) * ln(1 - sigmoid(x))]`
//! evaluated without overflow for large `|x|`.

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

/// Numerically stable logistic function.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^x)` without overflow.
fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Weight of the positive class, `negatives / positives`.
///
/// Falls back to 1.0 when there are no positives.
pub fn pos_weight(labels: &[u8]) -> f64 {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 {
        tracing::warn!(
            negatives,
            "no positive windows in the training set, using pos_weight 1.0"
        );
        return 1.0;
    }
    negatives as f64 / positives as f64
}

/// Binary cross-entropy with logits and a positive-class weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedBce {
    pos_weight: f64,
}

impl WeightedBce {
    /// Loss with the given positive-class weight.
    pub const fn new(pos_weight: f64) -> Self {
        Self { pos_weight }
    }

    /// Positive-class weight.
    pub const fn pos_weight(&self) -> f64 {
        self.pos_weight
    }

    /// Mean loss over a batch; 0 for an empty batch.
    pub fn loss(&self, logits: &Array1<f64>, targets: &Array1<f64>) -> f64 {
        if logits.is_empty() {
            return 0.0;
        }
        let total: f64 = logits
            .iter()
            .zip(targets)
            .map(|(&x, &y)| self.pos_weight * y * softplus(-x) + (1.0 - y) * softplus(x))
            .sum();
        total / logits.len() as f64
    }

    /// Gradient of the mean loss with respect to each logit.
    pub fn gradient(&self, logits: &Array1<f64>, targets: &Array1<f64>) -> Array1<f64> {
        let n = logits.len().max(1) as f64;
        let w = self.pos_weight;
        Zip::from(logits)
            .and(targets)
            .map_collect(|&x, &y| {
                let p = sigmoid(x);
                (w * y * (p - 1.0) + (1.0 - y) * p) / n
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_pos_weight_ratio() {
        let mut labels = vec![0u8; 90];
        labels.extend(vec![1u8; 10]);
        assert_relative_eq!(pos_weight(&labels), 9.0);
    }

    #[test]
    fn test_pos_weight_without_positives() {
        assert_relative_eq!(pos_weight(&[0, 0, 0]), 1.0);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert_relative_eq!(sigmoid(-800.0), 0.0);
        assert_relative_eq!(sigmoid(800.0), 1.0);
    }

    #[test]
    fn test_unweighted_loss_matches_log_loss() {
        let bce = WeightedBce::new(1.0);
        let logits = array![0.0, 2.0];
        let targets = array![1.0, 0.0];
        let expected = (-(0.5_f64).ln() - (1.0 - sigmoid(2.0)).ln()) / 2.0;
        assert_relative_eq!(bce.loss(&logits, &targets), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_positive_weight_scales_positive_term() {
        let logits = array![0.3];
        let targets = array![1.0];
        let base = WeightedBce::new(1.0).loss(&logits, &targets);
        assert_relative_eq!(
            WeightedBce::new(9.0).loss(&logits, &targets),
            9.0 * base,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let bce = WeightedBce::new(3.0);
        let logits = array![-1.2, 0.4, 2.5];
        let targets = array![1.0, 0.0, 1.0];
        let grad = bce.gradient(&logits, &targets);

        let h = 1e-6;
        for i in 0..logits.len() {
            let mut up = logits.clone();
            up[i] += h;
            let mut down = logits.clone();
            down[i] -= h;
            let numeric = (bce.loss(&up, &targets) - bce.loss(&down, &targets)) / (2.0 * h);
            assert_relative_eq!(grad[i], numeric, epsilon = 1e-7);
        }
    }
}
