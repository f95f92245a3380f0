use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::{LinearLoss, LinearModel, Penalty};
use crate::ml::estimator::{Estimator, FitError};
use crate::ml::params::{ParamError, ParamValue};

/// Hyperparameters for the SGD linear classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub loss: LinearLoss,
    pub penalty: Penalty,
    /// Regularization strength; also drives the learning-rate schedule.
    pub alpha: f32,
    /// Share of L1 in the elastic-net penalty.
    pub l1_ratio: f32,
    pub max_iter: usize,
    pub tol: f32,
    pub early_stopping: bool,
    pub validation_fraction: f32,
    pub n_iter_no_change: usize,
    pub seed: u64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            loss: LinearLoss::Hinge,
            penalty: Penalty::L2,
            alpha: 1e-4,
            l1_ratio: 0.15,
            max_iter: 1000,
            tol: 1e-3,
            early_stopping: false,
            validation_fraction: 0.1,
            n_iter_no_change: 5,
            seed: 42,
        }
    }
}

impl Estimator for LinearParams {
    type Fitted = LinearModel;

    const NAME: &'static str = "GradientLinear";

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match name {
            "loss" => {
                self.loss = match value.as_text(name)? {
                    "hinge" => LinearLoss::Hinge,
                    "log" | "log_loss" => LinearLoss::Log,
                    _ => {
                        return Err(ParamError::Invalid {
                            name: name.to_string(),
                            value: value.to_string(),
                            expected: "hinge or log",
                        });
                    }
                }
            }
            "penalty" => {
                self.penalty = match value.as_text(name)? {
                    "l2" => Penalty::L2,
                    "l1" => Penalty::L1,
                    "elasticnet" => Penalty::ElasticNet,
                    _ => {
                        return Err(ParamError::Invalid {
                            name: name.to_string(),
                            value: value.to_string(),
                            expected: "l2, l1 or elasticnet",
                        });
                    }
                }
            }
            "alpha" => {
                let alpha = value.as_f32(name)?;
                if !(alpha > 0.0 && alpha.is_finite()) {
                    return Err(ParamError::Invalid {
                        name: name.to_string(),
                        value: value.to_string(),
                        expected: "a positive number",
                    });
                }
                self.alpha = alpha;
            }
            "l1_ratio" => self.l1_ratio = value.as_f32(name)?.clamp(0.0, 1.0),
            "max_iter" => self.max_iter = value.as_usize(name)?.max(1),
            "tol" => self.tol = value.as_f32(name)?,
            "early_stopping" => self.early_stopping = value.as_bool(name)?,
            "validation_fraction" => self.validation_fraction = value.as_f32(name)?.clamp(0.01, 0.5),
            "n_iter_no_change" => self.n_iter_no_change = value.as_usize(name)?.max(1),
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

    fn fit(
        &self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<LinearModel, FitError> {
        let n = x.nrows();
        let dim = x.ncols();
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut indices: Vec<usize> = (0..n).collect();
        let (train_idx, val_idx) = if self.early_stopping && n >= 4 {
            indices.shuffle(&mut rng);
            let val_n = ((n as f32 * self.validation_fraction).ceil() as usize).clamp(1, n - 1);
            let val = indices[..val_n].to_vec();
            let train = indices[val_n..].to_vec();
            (train, val)
        } else {
            (indices, Vec::new())
        };

        let mut weights = vec![0.0f32; n_classes * dim];
        let mut bias = vec![0.0f32; n_classes];
        let mut n_iter = vec![0usize; n_classes];
        let mut targets = vec![0.0f32; n];

        for class_idx in 0..n_classes {
            for (t, &label) in targets.iter_mut().zip(y.iter()) {
                *t = if label == class_idx { 1.0 } else { -1.0 };
            }
            let (w, b, epochs) = self.train_binary(x, &targets, &train_idx, &val_idx, &mut rng)?;
            weights[class_idx * dim..(class_idx + 1) * dim].copy_from_slice(&w);
            bias[class_idx] = b;
            n_iter[class_idx] = epochs;
        }

        Ok(LinearModel {
            loss: self.loss,
            n_features: dim,
            n_classes,
            weights,
            bias,
            n_iter,
        })
    }
}

impl LinearParams {
    fn penalty_split(&self) -> (f32, f32) {
        match self.penalty {
            Penalty::L2 => (1.0, 0.0),
            Penalty::L1 => (0.0, 1.0),
            Penalty::ElasticNet => (1.0 - self.l1_ratio, self.l1_ratio),
        }
    }

    fn loss_and_dloss(&self, p: f32, y: f32) -> (f32, f32) {
        let z = p * y;
        match self.loss {
            LinearLoss::Hinge => {
                if z < 1.0 {
                    (1.0 - z, -y)
                } else {
                    (0.0, 0.0)
                }
            }
            LinearLoss::Log => {
                let loss = if z > 18.0 {
                    (-z).exp()
                } else if z < -18.0 {
                    -z
                } else {
                    (1.0 + (-z).exp()).ln()
                };
                let dloss = if z > 18.0 {
                    -y * (-z).exp()
                } else if z < -18.0 {
                    -y
                } else {
                    -y / (1.0 + z.exp())
                };
                (loss, dloss)
            }
        }
    }

    /// Binary SGD with the `1 / (alpha * (t0 + t))` schedule.
    fn train_binary(
        &self,
        x: ArrayView2<'_, f32>,
        targets: &[f32],
        train_idx: &[usize],
        val_idx: &[usize],
        rng: &mut StdRng,
    ) -> Result<(Vec<f32>, f32, usize), FitError> {
        let dim = x.ncols();
        let alpha = self.alpha.max(1e-12);
        let (l2_part, l1_part) = self.penalty_split();
        let typw = (1.0 / alpha.sqrt()).sqrt();
        let t0 = 1.0 / (typw * alpha);

        let mut w = vec![0.0f32; dim];
        let mut b = 0.0f32;
        let mut t = 0.0f32;
        let mut order = train_idx.to_vec();
        let mut best_loss = f32::INFINITY;
        let mut best_score = f32::NEG_INFINITY;
        let mut no_improvement = 0usize;
        let mut epochs = 0usize;

        for _epoch in 0..self.max_iter {
            epochs += 1;
            order.shuffle(rng);
            let mut sum_loss = 0.0f32;
            for &i in &order {
                t += 1.0;
                let eta = 1.0 / (alpha * (t0 + t));
                let row = x.row(i);
                let p = dot(&w, row) + b;
                let (loss, dloss) = self.loss_and_dloss(p, targets[i]);
                sum_loss += loss;
                if l2_part > 0.0 {
                    let decay = (1.0 - eta * alpha * l2_part).max(0.0);
                    w.iter_mut().for_each(|wi| *wi *= decay);
                }
                if dloss != 0.0 {
                    for (wi, xi) in w.iter_mut().zip(row.iter()) {
                        *wi -= eta * dloss * xi;
                    }
                    b -= eta * dloss;
                }
                if l1_part > 0.0 {
                    let shrink = eta * alpha * l1_part;
                    for wi in w.iter_mut() {
                        *wi = wi.signum() * (wi.abs() - shrink).max(0.0);
                    }
                }
            }
            if !b.is_finite() || w.iter().any(|v| !v.is_finite()) {
                return Err(FitError::Diverged(Self::NAME));
            }

            if !val_idx.is_empty() {
                let correct = val_idx
                    .iter()
                    .filter(|&&i| (dot(&w, x.row(i)) + b >= 0.0) == (targets[i] > 0.0))
                    .count();
                let score = correct as f32 / val_idx.len() as f32;
                if score < best_score + self.tol {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                best_score = best_score.max(score);
            } else {
                if sum_loss > best_loss - self.tol * order.len() as f32 {
                    no_improvement += 1;
                } else {
                    no_improvement = 0;
                }
                best_loss = best_loss.min(sum_loss);
            }
            if no_improvement >= self.n_iter_no_change {
                break;
            }
        }
        Ok((w, b, epochs))
    }
}

fn dot(w: &[f32], row: ArrayView1<'_, f32>) -> f32 {
    w.iter().zip(row.iter()).map(|(a, b)| a * b).sum()
}
