//! Sequence classifiers.
//!
//! A classifier maps a batch of `L x F` sequences to one logit per sequence.
//! Training goes through [`SequenceClassifier::forward_train`], which keeps
//! the intermediate activations needed by [`SequenceClassifier::backward`];
//! parameters and gradients are exchanged as flat lists in a fixed order so
//! an optimizer can update them without knowing the architecture.

use crate::error::{ModelError, Result};
use crate::loss::sigmoid;
use ndarray::{Array1, Array2, ArrayD, ArrayViewMutD, Axis, s};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// A model producing one logit per input sequence.
pub trait SequenceClassifier {
    /// Activations recorded by a training forward pass.
    type Cache;

    /// Number of features per time step the model expects.
    fn n_features(&self) -> usize;

    /// Inference logits, without dropout.
    fn logits(&self, batch: &[&Array2<f64>]) -> Result<Array1<f64>>;

    /// Training forward pass, with dropout drawn from `rng`.
    fn forward_train(
        &self,
        batch: &[&Array2<f64>],
        rng: &mut StdRng,
    ) -> Result<(Array1<f64>, Self::Cache)>;

    /// Gradients of the loss with respect to every parameter, in the order
    /// of [`SequenceClassifier::parameters_mut`].
    fn backward(&self, cache: &Self::Cache, grad_logits: &Array1<f64>) -> Vec<ArrayD<f64>>;

    /// Mutable views of every parameter.
    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>>;

    /// Outbreak probabilities, `sigmoid(logit)`.
    fn predict_proba(&self, batch: &[&Array2<f64>]) -> Result<Array1<f64>> {
        Ok(self.logits(batch)?.mapv(sigmoid))
    }
}

/// LSTM classifier hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmConfig {
    /// Hidden units per LSTM layer.
    pub hidden_dim: usize,
    /// Number of stacked LSTM layers.
    pub num_layers: usize,
    /// Units in the dense head.
    pub head_dim: usize,
    /// Dropout probability on the head activations during training.
    pub dropout: f64,
    /// Seed for weight initialization.
    pub seed: u64,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 64,
            num_layers: 2,
            head_dim: 32,
            dropout: 0.3,
            seed: 42,
        }
    }
}

impl LstmConfig {
    /// Check dimensions and dropout range.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_dim == 0 || self.num_layers == 0 || self.head_dim == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "hidden_dim, num_layers and head_dim must be positive (got {}, {}, {})",
                self.hidden_dim, self.num_layers, self.head_dim
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// One LSTM layer. Gate blocks are ordered input, forget, cell, output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LstmLayer {
    w_x: Array2<f64>,
    w_h: Array2<f64>,
    bias: Array1<f64>,
}

impl LstmLayer {
    fn new(n_in: usize, hidden: usize, rng: &mut StdRng) -> Self {
        let mut bias = Array1::<f64>::zeros(4 * hidden);
        bias.slice_mut(s![hidden..2 * hidden]).fill(1.0);
        Self {
            w_x: xavier(n_in, 4 * hidden, rng),
            w_h: xavier(hidden, 4 * hidden, rng),
            bias,
        }
    }

    fn hidden(&self) -> usize {
        self.w_h.nrows()
    }
}

fn xavier(n_in: usize, n_out: usize, rng: &mut StdRng) -> Array2<f64> {
    let scale = (2.0 / (n_in + n_out) as f64).sqrt();
    Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-scale..scale))
}

/// Gate activations of one time step.
#[derive(Debug, Clone)]
struct StepCache {
    input: Array2<f64>,
    forget: Array2<f64>,
    cell: Array2<f64>,
    output: Array2<f64>,
    tanh_c: Array2<f64>,
}

/// Activations of one layer over the whole sequence.
#[derive(Debug, Clone)]
struct LayerCache {
    /// Layer inputs, one per time step.
    xs: Vec<Array2<f64>>,
    /// Hidden states, `hs[0]` is the zero initial state.
    hs: Vec<Array2<f64>>,
    /// Cell states, `cs[0]` is the zero initial state.
    cs: Vec<Array2<f64>>,
    steps: Vec<StepCache>,
}

/// Activations kept by a training forward pass of [`LstmClassifier`].
#[derive(Debug, Clone)]
pub struct LstmCache {
    layers: Vec<LayerCache>,
    head_pre: Array2<f64>,
    head_out: Array2<f64>,
    mask: Option<Array2<f64>>,
}

/// Stacked LSTM over the sequence, last hidden state fed to a dense ReLU
/// head and a single-logit output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmClassifier {
    config: LstmConfig,
    n_features: usize,
    layers: Vec<LstmLayer>,
    head_w: Array2<f64>,
    head_b: Array1<f64>,
    out_w: Array1<f64>,
    out_b: Array1<f64>,
}

impl LstmClassifier {
    /// Initialize a classifier for sequences with `n_features` columns.
    pub fn new(n_features: usize, config: LstmConfig) -> Result<Self> {
        config.validate()?;
        if n_features == 0 {
            return Err(ModelError::InvalidConfig(
                "classifier needs at least one feature".to_string(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(config.seed);
        let hidden = config.hidden_dim;
        let layers = (0..config.num_layers)
            .map(|l| {
                let n_in = if l == 0 { n_features } else { hidden };
                LstmLayer::new(n_in, hidden, &mut rng)
            })
            .collect();
        let head_w = xavier(hidden, config.head_dim, &mut rng);
        let out_w = xavier(config.head_dim, 1, &mut rng).remove_axis(Axis(1));

        Ok(Self {
            head_b: Array1::zeros(config.head_dim),
            out_b: Array1::zeros(1),
            config,
            n_features,
            layers,
            head_w,
            out_w,
        })
    }

    /// Hyperparameters the model was built with.
    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    /// Total number of trainable weights.
    pub fn num_parameters(&self) -> usize {
        let lstm: usize = self
            .layers
            .iter()
            .map(|l| l.w_x.len() + l.w_h.len() + l.bias.len())
            .sum();
        lstm + self.head_w.len() + self.head_b.len() + self.out_w.len() + self.out_b.len()
    }

    /// Split a batch into per-step `B x F` inputs.
    fn step_inputs(&self, batch: &[&Array2<f64>]) -> Result<Vec<Array2<f64>>> {
        let first = batch
            .first()
            .ok_or_else(|| ModelError::Shape("empty batch".to_string()))?;
        let length = first.nrows();
        if length == 0 {
            return Err(ModelError::Shape("sequences have no time steps".to_string()));
        }
        for sequence in batch {
            if sequence.dim() != (length, self.n_features) {
                return Err(ModelError::Shape(format!(
                    "expected {} x {} sequences, got {} x {}",
                    length,
                    self.n_features,
                    sequence.nrows(),
                    sequence.ncols()
                )));
            }
        }
        Ok((0..length)
            .map(|t| {
                Array2::from_shape_fn((batch.len(), self.n_features), |(b, f)| batch[b][[t, f]])
            })
            .collect())
    }

    fn forward(
        &self,
        batch: &[&Array2<f64>],
        mask: Option<Array2<f64>>,
    ) -> Result<(Array1<f64>, LstmCache)> {
        let mut inputs = self.step_inputs(batch)?;
        let n = batch.len();
        let mut caches = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let hidden = layer.hidden();
            let mut hs = vec![Array2::<f64>::zeros((n, hidden))];
            let mut cs = vec![Array2::<f64>::zeros((n, hidden))];
            let mut steps = Vec::with_capacity(inputs.len());

            for (t, x) in inputs.iter().enumerate() {
                let z = x.dot(&layer.w_x) + hs[t].dot(&layer.w_h) + &layer.bias;
                let input = z.slice(s![.., 0..hidden]).mapv(sigmoid);
                let forget = z.slice(s![.., hidden..2 * hidden]).mapv(sigmoid);
                let cell = z.slice(s![.., 2 * hidden..3 * hidden]).mapv(f64::tanh);
                let output = z.slice(s![.., 3 * hidden..]).mapv(sigmoid);

                let c = &forget * &cs[t] + &input * &cell;
                let tanh_c = c.mapv(f64::tanh);
                hs.push(&output * &tanh_c);
                cs.push(c);
                steps.push(StepCache {
                    input,
                    forget,
                    cell,
                    output,
                    tanh_c,
                });
            }

            let next_inputs = hs[1..].to_vec();
            caches.push(LayerCache {
                xs: std::mem::replace(&mut inputs, next_inputs),
                hs,
                cs,
                steps,
            });
        }

        let last = caches
            .last()
            .and_then(|c| c.hs.last())
            .ok_or_else(|| ModelError::Shape("model has no layers".to_string()))?;
        let head_pre = last.dot(&self.head_w) + &self.head_b;
        let mut head_out = head_pre.mapv(|a| a.max(0.0));
        if let Some(mask) = &mask {
            head_out *= mask;
        }
        let logits = head_out.dot(&self.out_w) + self.out_b[0];

        Ok((
            logits,
            LstmCache {
                layers: caches,
                head_pre,
                head_out,
                mask,
            },
        ))
    }
}

impl SequenceClassifier for LstmClassifier {
    type Cache = LstmCache;

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn logits(&self, batch: &[&Array2<f64>]) -> Result<Array1<f64>> {
        Ok(self.forward(batch, None)?.0)
    }

    fn forward_train(
        &self,
        batch: &[&Array2<f64>],
        rng: &mut StdRng,
    ) -> Result<(Array1<f64>, LstmCache)> {
        let p = self.config.dropout;
        let mask = (p > 0.0).then(|| {
            let keep = 1.0 / (1.0 - p);
            Array2::from_shape_fn((batch.len(), self.config.head_dim), |_| {
                if rng.gen_bool(p) { 0.0 } else { keep }
            })
        });
        self.forward(batch, mask)
    }

    fn backward(&self, cache: &LstmCache, grad_logits: &Array1<f64>) -> Vec<ArrayD<f64>> {
        let n = grad_logits.len();
        let g = grad_logits.view().insert_axis(Axis(1));

        // Output layer.
        let d_out_w = cache.head_out.t().dot(grad_logits);
        let d_out_b = Array1::from_elem(1, grad_logits.sum());

        // Dense head.
        let mut d_head = g.dot(&self.out_w.view().insert_axis(Axis(0)));
        if let Some(mask) = &cache.mask {
            d_head *= mask;
        }
        d_head.zip_mut_with(&cache.head_pre, |d, &a| {
            if a <= 0.0 {
                *d = 0.0;
            }
        });
        let last_hidden = cache
            .layers
            .last()
            .and_then(|c| c.hs.last())
            .cloned()
            .unwrap_or_else(|| Array2::zeros((n, self.config.hidden_dim)));
        let d_head_w = last_hidden.t().dot(&d_head);
        let d_head_b = d_head.sum_axis(Axis(0));

        // Backpropagation through time, top layer first. Only the last step
        // of the top layer receives gradient from the head.
        let steps = cache.layers.first().map_or(0, |c| c.xs.len());
        let mut d_outputs: Vec<Array2<f64>> = (0..steps)
            .map(|_| Array2::zeros((n, self.config.hidden_dim)))
            .collect();
        if let Some(last) = d_outputs.last_mut() {
            *last = d_head.dot(&self.head_w.t());
        }

        let mut layer_grads = Vec::with_capacity(self.layers.len());
        for (layer, lc) in self.layers.iter().zip(&cache.layers).rev() {
            let hidden = layer.hidden();
            let mut d_w_x = Array2::<f64>::zeros(layer.w_x.raw_dim());
            let mut d_w_h = Array2::<f64>::zeros(layer.w_h.raw_dim());
            let mut d_bias = Array1::<f64>::zeros(layer.bias.raw_dim());
            let mut dh_next = Array2::<f64>::zeros((n, hidden));
            let mut dc_next = Array2::<f64>::zeros((n, hidden));
            let mut d_inputs = vec![Array2::<f64>::zeros((n, layer.w_x.nrows())); steps];

            for t in (0..steps).rev() {
                let step = &lc.steps[t];
                let dh = &d_outputs[t] + &dh_next;

                let d_output = &dh * &step.tanh_c;
                let dc = &dc_next + &(&dh * &step.output * &step.tanh_c.mapv(|v| 1.0 - v * v));
                let d_input = &dc * &step.cell;
                let d_cell = &dc * &step.input;
                let d_forget = &dc * &lc.cs[t];
                dc_next = &dc * &step.forget;

                let mut dz = Array2::<f64>::zeros((n, 4 * hidden));
                dz.slice_mut(s![.., 0..hidden])
                    .assign(&(&d_input * &step.input.mapv(|v| v * (1.0 - v))));
                dz.slice_mut(s![.., hidden..2 * hidden])
                    .assign(&(&d_forget * &step.forget.mapv(|v| v * (1.0 - v))));
                dz.slice_mut(s![.., 2 * hidden..3 * hidden])
                    .assign(&(&d_cell * &step.cell.mapv(|v| 1.0 - v * v)));
                dz.slice_mut(s![.., 3 * hidden..])
                    .assign(&(&d_output * &step.output.mapv(|v| v * (1.0 - v))));

                d_w_x += &lc.xs[t].t().dot(&dz);
                d_w_h += &lc.hs[t].t().dot(&dz);
                d_bias += &dz.sum_axis(Axis(0));
                dh_next = dz.dot(&layer.w_h.t());
                d_inputs[t] = dz.dot(&layer.w_x.t());
            }

            layer_grads.push([d_w_x.into_dyn(), d_w_h.into_dyn(), d_bias.into_dyn()]);
            d_outputs = d_inputs;
        }

        let mut grads: Vec<ArrayD<f64>> = layer_grads.into_iter().rev().flatten().collect();
        grads.push(d_head_w.into_dyn());
        grads.push(d_head_b.into_dyn());
        grads.push(d_out_w.into_dyn());
        grads.push(d_out_b.into_dyn());
        grads
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut params = Vec::with_capacity(3 * self.layers.len() + 4);
        for layer in &mut self.layers {
            params.push(layer.w_x.view_mut().into_dyn());
            params.push(layer.w_h.view_mut().into_dyn());
            params.push(layer.bias.view_mut().into_dyn());
        }
        params.push(self.head_w.view_mut().into_dyn());
        params.push(self.head_b.view_mut().into_dyn());
        params.push(self.out_w.view_mut().into_dyn());
        params.push(self.out_b.view_mut().into_dyn());
        params
    }
}
