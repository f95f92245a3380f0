use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Kernel, KernelSvmModel};
use crate::ml::estimator::{Estimator, FitError};
use crate::ml::params::{ParamError, ParamValue};

/// Kernel width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// `1 / (n_features * var(X))`.
    Scale,
    /// `1 / n_features`.
    Auto,
    Value(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Inverse regularization strength.
    pub c: f32,
    pub kernel: Kernel,
    pub gamma: Gamma,
    /// Passes over the training set; the solver takes `epochs * n_rows` steps.
    pub epochs: usize,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: Kernel::Rbf,
            gamma: Gamma::Scale,
            epochs: 10,
            seed: 42,
        }
    }
}

impl Estimator for SvmParams {
    type Fitted = KernelSvmModel;

    const NAME: &'static str = "KernelSvm";

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match name {
            "C" | "c" => {
                let c = value.as_f32(name)?;
                if !(c > 0.0 && c.is_finite()) {
                    return Err(ParamError::Invalid {
                        name: name.to_string(),
                        value: value.to_string(),
                        expected: "a positive number",
                    });
                }
                self.c = c;
            }
            "kernel" => {
                self.kernel = match value.as_text(name)? {
                    "rbf" => Kernel::Rbf,
                    "linear" => Kernel::Linear,
                    _ => {
                        return Err(ParamError::Invalid {
                            name: name.to_string(),
                            value: value.to_string(),
                            expected: "rbf or linear",
                        });
                    }
                }
            }
            "gamma" => {
                self.gamma = match value {
                    ParamValue::Text(text) if text == "scale" => Gamma::Scale,
                    ParamValue::Text(text) if text == "auto" => Gamma::Auto,
                    _ => Gamma::Value(value.as_f32(name)?),
                }
            }
            "epochs" | "max_iter" => self.epochs = value.as_usize(name)?.max(1),
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
    ) -> Result<KernelSvmModel, FitError> {
        let n = x.nrows();
        let d = x.ncols();
        let gamma = self.resolve_gamma(x);
        let lambda = 1.0 / (self.c * n as f32);
        let steps = self.epochs.max(1) * n;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let rows: Vec<Vec<f32>> = x.rows().into_iter().map(|row| row.to_vec()).collect();
        // alpha[c * n + j]: how often row j violated the margin for class c.
        let mut alpha = vec![0u32; n_classes * n];
        let mut support: Vec<usize> = Vec::new();
        let mut in_support = vec![false; n];
        let mut kernel_row: Vec<f32> = Vec::new();

        for t in 1..=steps {
            let i = rng.random_range(0..n);
            kernel_row.clear();
            kernel_row.extend(
                support
                    .iter()
                    .map(|&j| self.kernel.eval(gamma, &rows[j], x.row(i))),
            );
            let scale = 1.0 / (lambda * t as f32);
            for class_idx in 0..n_classes {
                let sign = |j: usize| if y[j] == class_idx { 1.0f32 } else { -1.0 };
                let base = class_idx * n;
                let sum: f32 = support
                    .iter()
                    .zip(&kernel_row)
                    .map(|(&j, k)| alpha[base + j] as f32 * sign(j) * k)
                    .sum();
                if sign(i) * scale * sum < 1.0 {
                    alpha[base + i] += 1;
                    if !in_support[i] {
                        in_support[i] = true;
                        support.push(i);
                    }
                }
            }
        }

        support.sort_unstable();
        let final_scale = 1.0 / (lambda * steps as f32);
        let mut support_vectors = Vec::with_capacity(support.len() * d);
        for &j in &support {
            support_vectors.extend_from_slice(&rows[j]);
        }
        let mut dual_coef = Vec::with_capacity(n_classes * support.len());
        for class_idx in 0..n_classes {
            for &j in &support {
                let sign = if y[j] == class_idx { 1.0 } else { -1.0 };
                dual_coef.push(alpha[class_idx * n + j] as f32 * sign * final_scale);
            }
        }
        if dual_coef.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Diverged(Self::NAME));
        }

        Ok(KernelSvmModel {
            kernel: self.kernel,
            gamma,
            n_features: d,
            n_classes,
            support_vectors,
            dual_coef,
        })
    }
}

impl SvmParams {
    fn resolve_gamma(&self, x: ArrayView2<'_, f32>) -> f32 {
        let d = x.ncols().max(1) as f32;
        match self.gamma {
            Gamma::Value(v) => v,
            Gamma::Auto => 1.0 / d,
            Gamma::Scale => {
                let count = x.len().max(1) as f64;
                let mean = x.iter().map(|&v| v as f64).sum::<f64>() / count;
                let var = x.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / count;
                if var > 0.0 {
                    (1.0 / (d as f64 * var)) as f32
                } else {
                    1.0
                }
            }
        }
    }
}
