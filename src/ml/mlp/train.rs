use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::{Activation, DenseLayer, MlpModel};
use crate::ml::boosting::softmax;
use crate::ml::estimator::{Estimator, FitError};
use crate::ml::params::{ParamError, ParamValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Solver {
    Adam,
    /// Plain minibatch SGD with momentum 0.9.
    Sgd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpParams {
    pub hidden_layer_sizes: Vec<usize>,
    pub activation: Activation,
    pub solver: Solver,
    /// L2 penalty on the weights.
    pub alpha: f32,
    pub batch_size: usize,
    pub learning_rate_init: f32,
    pub max_iter: usize,
    pub early_stopping: bool,
    pub validation_fraction: f32,
    pub n_iter_no_change: usize,
    pub tol: f32,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden_layer_sizes: vec![100],
            activation: Activation::Relu,
            solver: Solver::Adam,
            alpha: 1e-4,
            batch_size: 200,
            learning_rate_init: 1e-3,
            max_iter: 200,
            early_stopping: false,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
            tol: 1e-4,
            seed: 42,
        }
    }
}

impl Estimator for MlpParams {
    type Fitted = MlpModel;

    const NAME: &'static str = "MultiLayerPerceptron";

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match name {
            "hidden_layer_sizes" => self.hidden_layer_sizes = value.as_layers(name)?,
            "activation" => {
                self.activation = match value.as_text(name)? {
                    "relu" => Activation::Relu,
                    "tanh" => Activation::Tanh,
                    _ => {
                        return Err(ParamError::Invalid {
                            name: name.to_string(),
                            value: value.to_string(),
                            expected: "relu or tanh",
                        });
                    }
                }
            }
            "solver" => {
                self.solver = match value.as_text(name)? {
                    "adam" => Solver::Adam,
                    "sgd" => Solver::Sgd,
                    _ => {
                        return Err(ParamError::Invalid {
                            name: name.to_string(),
                            value: value.to_string(),
                            expected: "adam or sgd",
                        });
                    }
                }
            }
            "alpha" => self.alpha = value.as_f32(name)?.max(0.0),
            "batch_size" => self.batch_size = value.as_usize(name)?.max(1),
            "learning_rate_init" => {
                let lr = value.as_f32(name)?;
                if !(lr > 0.0 && lr.is_finite()) {
                    return Err(ParamError::Invalid {
                        name: name.to_string(),
                        value: value.to_string(),
                        expected: "a positive number",
                    });
                }
                self.learning_rate_init = lr;
            }
            "max_iter" => self.max_iter = value.as_usize(name)?.max(1),
            "early_stopping" => self.early_stopping = value.as_bool(name)?,
            "validation_fraction" => self.validation_fraction = value.as_f32(name)?.clamp(0.01, 0.5),
            "n_iter_no_change" => self.n_iter_no_change = value.as_usize(name)?.max(1),
            "tol" => self.tol = value.as_f32(name)?,
            "seed" | "random_state" => self.seed = value.as_usize(name)? as u64,
            _ => {
                return Err(ParamError::Unknown {
                    stage: Self::NAME,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn fit(&self, x: ArrayView2<'_, f32>, y: &[usize], n_classes: usize) -> Result<MlpModel, FitError> {
        let n = x.nrows();
        let d = x.ncols();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let rows: Vec<Vec<f32>> = x.rows().into_iter().map(|row| row.to_vec()).collect();

        let mut indices: Vec<usize> = (0..n).collect();
        let (train_idx, val_idx) = if self.early_stopping && n >= 4 {
            indices.shuffle(&mut rng);
            let val_n = ((n as f32 * self.validation_fraction).ceil() as usize).clamp(1, n - 1);
            (indices[val_n..].to_vec(), indices[..val_n].to_vec())
        } else {
            (indices, Vec::new())
        };

        let mut model = MlpModel {
            activation: self.activation,
            layers: init_layers(d, &self.hidden_layer_sizes, n_classes, &mut rng),
            n_iter: 0,
            best_loss: f32::INFINITY,
        };
        let mut optimizer = Optimizer::new(self.solver, &model.layers);
        let mut grads: Vec<DenseLayer> = model.layers.iter().map(zeroed_like).collect();
        let mut acts: Vec<Vec<f32>> = Vec::new();
        let mut deltas: Vec<Vec<f32>> = vec![Vec::new(); model.layers.len()];

        let batch_size = self.batch_size.clamp(1, train_idx.len().max(1));
        let mut order = train_idx;
        let mut best_score = f32::NEG_INFINITY;
        let mut best_layers: Option<Vec<DenseLayer>> = None;
        let mut no_improvement = 0usize;

        for _epoch in 0..self.max_iter {
            model.n_iter += 1;
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0f32;

            for batch in order.chunks(batch_size) {
                grads.iter_mut().for_each(|g| {
                    g.weights.iter_mut().for_each(|v| *v = 0.0);
                    g.bias.iter_mut().for_each(|v| *v = 0.0);
                });
                for &idx in batch {
                    model.forward_into(&rows[idx], &mut acts);
                    let probs = softmax(&acts[model.layers.len()]);
                    epoch_loss -= probs[y[idx]].max(1e-10).ln();
                    self.backward(&model, &acts, &probs, y[idx], &mut deltas, &mut grads);
                }
                let batch_len = batch.len() as f32;
                for (layer, grad) in model.layers.iter().zip(grads.iter_mut()) {
                    for (g, w) in grad.weights.iter_mut().zip(&layer.weights) {
                        *g = (*g + self.alpha * w) / batch_len;
                    }
                    grad.bias.iter_mut().for_each(|g| *g /= batch_len);
                }
                optimizer.step(&mut model.layers, &grads, self.learning_rate_init);
            }

            let weight_norm: f32 = model
                .layers
                .iter()
                .flat_map(|l| l.weights.iter())
                .map(|w| w * w)
                .sum();
            let loss = (epoch_loss + 0.5 * self.alpha * weight_norm) / order.len().max(1) as f32;
            if !loss.is_finite() {
                return Err(FitError::Diverged(Self::NAME));
            }

            if val_idx.is_empty() {
                if loss > model.best_loss - self.tol {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                model.best_loss = model.best_loss.min(loss);
            } else {
                let score = validation_accuracy(&model, &rows, y, &val_idx, &mut acts);
                if score < best_score + self.tol {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                if score > best_score {
                    best_score = score;
                    best_layers = Some(model.layers.clone());
                }
            }
            if no_improvement > self.n_iter_no_change {
                break;
            }
        }

        if let Some(layers) = best_layers {
            model.layers = layers;
            model.best_loss = best_score;
        }
        Ok(model)
    }
}

impl MlpParams {
    /// Accumulate one sample's softmax cross-entropy gradient into `grads`.
    fn backward(
        &self,
        model: &MlpModel,
        acts: &[Vec<f32>],
        probs: &[f32],
        target: usize,
        deltas: &mut [Vec<f32>],
        grads: &mut [DenseLayer],
    ) {
        let last = model.layers.len() - 1;
        deltas[last].clear();
        deltas[last].extend(
            probs
                .iter()
                .enumerate()
                .map(|(c, &p)| if c == target { p - 1.0 } else { p }),
        );
        for l in (0..=last).rev() {
            let layer = &model.layers[l];
            let input = &acts[l];
            let grad = &mut grads[l];
            for o in 0..layer.n_out {
                let delta = deltas[l][o];
                if delta == 0.0 {
                    continue;
                }
                grad.bias[o] += delta;
                let base = o * layer.n_in;
                for (g, x) in grad.weights[base..base + layer.n_in].iter_mut().zip(input) {
                    *g += delta * x;
                }
            }
            if l > 0 {
                let (below, above) = deltas.split_at_mut(l);
                let prev = &mut below[l - 1];
                prev.clear();
                prev.resize(layer.n_in, 0.0);
                for o in 0..layer.n_out {
                    let delta = above[0][o];
                    let base = o * layer.n_in;
                    for (p, w) in prev.iter_mut().zip(&layer.weights[base..base + layer.n_in]) {
                        *p += w * delta;
                    }
                }
                for (p, &a) in prev.iter_mut().zip(input) {
                    *p *= model.activation.derivative(a);
                }
            }
        }
    }
}

/// Glorot-uniform initialization.
fn init_layers(n_in: usize, hidden: &[usize], n_out: usize, rng: &mut StdRng) -> Vec<DenseLayer> {
    let mut sizes = Vec::with_capacity(hidden.len() + 2);
    sizes.push(n_in);
    sizes.extend_from_slice(hidden);
    sizes.push(n_out);
    sizes
        .windows(2)
        .map(|pair| {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
            DenseLayer {
                n_in: fan_in,
                n_out: fan_out,
                weights: (0..fan_in * fan_out)
                    .map(|_| (rng.random::<f32>() * 2.0 - 1.0) * limit)
                    .collect(),
                bias: (0..fan_out)
                    .map(|_| (rng.random::<f32>() * 2.0 - 1.0) * limit)
                    .collect(),
            }
        })
        .collect()
}

fn zeroed_like(layer: &DenseLayer) -> DenseLayer {
    DenseLayer {
        n_in: layer.n_in,
        n_out: layer.n_out,
        weights: vec![0.0; layer.weights.len()],
        bias: vec![0.0; layer.bias.len()],
    }
}

fn validation_accuracy(
    model: &MlpModel,
    rows: &[Vec<f32>],
    y: &[usize],
    val_idx: &[usize],
    acts: &mut Vec<Vec<f32>>,
) -> f32 {
    let correct = val_idx
        .iter()
        .filter(|&&i| {
            model.forward_into(&rows[i], acts);
            crate::ml::estimator::argmax(&acts[model.layers.len()]) == y[i]
        })
        .count();
    correct as f32 / val_idx.len().max(1) as f32
}

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-8;
const MOMENTUM: f32 = 0.9;

/// First/second moment buffers, laid out like the layers they update.
struct Optimizer {
    solver: Solver,
    t: i32,
    m: Vec<DenseLayer>,
    v: Vec<DenseLayer>,
}

impl Optimizer {
    fn new(solver: Solver, layers: &[DenseLayer]) -> Self {
        Self {
            solver,
            t: 0,
            m: layers.iter().map(zeroed_like).collect(),
            v: layers.iter().map(zeroed_like).collect(),
        }
    }

    fn step(&mut self, layers: &mut [DenseLayer], grads: &[DenseLayer], lr: f32) {
        self.t += 1;
        let lr_t = match self.solver {
            Solver::Adam => {
                lr * (1.0 - BETA2.powi(self.t)).sqrt() / (1.0 - BETA1.powi(self.t))
            }
            Solver::Sgd => lr,
        };
        for (((layer, grad), m), v) in layers
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            update(self.solver, &mut layer.weights, &grad.weights, &mut m.weights, &mut v.weights, lr_t);
            update(self.solver, &mut layer.bias, &grad.bias, &mut m.bias, &mut v.bias, lr_t);
        }
    }
}

fn update(solver: Solver, params: &mut [f32], grads: &[f32], m: &mut [f32], v: &mut [f32], lr_t: f32) {
    match solver {
        Solver::Adam => {
            for i in 0..params.len() {
                let g = grads[i];
                m[i] = BETA1 * m[i] + (1.0 - BETA1) * g;
                v[i] = BETA2 * v[i] + (1.0 - BETA2) * g * g;
                params[i] -= lr_t * m[i] / (v[i].sqrt() + EPSILON);
            }
        }
        Solver::Sgd => {
            for i in 0..params.len() {
                m[i] = MOMENTUM * m[i] - lr_t * grads[i];
                params[i] += m[i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::estimator::Classifier;
    use ndarray::Array2;

    fn xor() -> (Array2<f32>, Vec<usize>) {
        let mut data = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let a = (i % 2) as f32;
            let b = ((i / 2) % 2) as f32;
            let jitter = (i % 7) as f32 * 0.01;
            data.extend_from_slice(&[a + jitter, b - jitter]);
            y.push(((i % 2) ^ ((i / 2) % 2)) as usize);
        }
        (Array2::from_shape_vec((40, 2), data).unwrap(), y)
    }

    #[test]
    fn learns_xor_with_two_hidden_layers() {
        let (x, y) = xor();
        let mut params = MlpParams::default();
        params.set_param("hidden_layer_sizes", &ParamValue::Layers(vec![16, 8])).unwrap();
        params.set_param("learning_rate_init", &ParamValue::Float(0.02)).unwrap();
        params.set_param("batch_size", &ParamValue::Int(8)).unwrap();
        params.set_param("max_iter", &ParamValue::Int(400)).unwrap();
        let model = params.fit(x.view(), &y, 2).unwrap();
        assert_eq!(model.layers.len(), 3);
        let correct = x
            .rows()
            .into_iter()
            .zip(&y)
            .filter(|(row, t)| model.predict(*row) == **t)
            .count();
        assert!(correct >= 38, "{correct}/40");
    }

    #[test]
    fn early_stopping_keeps_best_validation_weights() {
        let (x, y) = xor();
        let params = MlpParams {
            early_stopping: true,
            max_iter: 50,
            n_iter_no_change: 2,
            ..MlpParams::default()
        };
        let model = params.fit(x.view(), &y, 2).unwrap();
        assert!(model.n_iter <= 50);
        assert!((0.0..=1.0).contains(&model.best_loss));
    }

    #[test]
    fn layer_shapes_follow_hidden_sizes() {
        let mut rng = StdRng::seed_from_u64(0);
        let layers = init_layers(5, &[4, 3], 2, &mut rng);
        let shapes: Vec<(usize, usize)> = layers.iter().map(|l| (l.n_in, l.n_out)).collect();
        assert_eq!(shapes, vec![(5, 4), (4, 3), (3, 2)]);
        assert!(layers.iter().all(|l| l.weights.len() == l.n_in * l.n_out));
    }
}
