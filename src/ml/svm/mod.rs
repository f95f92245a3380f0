//! Kernel support vector classifier trained with the kernelized Pegasos solver.

mod train;

pub use train::{Gamma, SvmParams};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::ml::estimator::Classifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    Rbf,
    Linear,
}

impl Kernel {
    pub fn eval(self, gamma: f32, a: &[f32], b: ArrayView1<'_, f32>) -> f32 {
        match self {
            Kernel::Linear => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
            Kernel::Rbf => {
                let dist: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * dist).exp()
            }
        }
    }
}

/// Fitted one-vs-rest kernel machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSvmModel {
    pub kernel: Kernel,
    /// Resolved kernel width.
    pub gamma: f32,
    pub n_features: usize,
    pub n_classes: usize,
    /// Row-major `[n_support][n_features]`.
    pub support_vectors: Vec<f32>,
    /// Row-major `[n_classes][n_support]`.
    pub dual_coef: Vec<f32>,
}

impl KernelSvmModel {
    pub fn n_support(&self) -> usize {
        if self.n_features == 0 {
            0
        } else {
            self.support_vectors.len() / self.n_features
        }
    }
}

impl Classifier for KernelSvmModel {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        let n_support = self.n_support();
        let kernel_row: Vec<f32> = self
            .support_vectors
            .chunks_exact(self.n_features.max(1))
            .map(|sv| self.kernel.eval(self.gamma, sv, row))
            .collect();
        (0..self.n_classes)
            .map(|c| {
                let coef = &self.dual_coef[c * n_support..(c + 1) * n_support];
                coef.iter().zip(&kernel_row).map(|(a, k)| a * k).sum()
            })
            .collect()
    }
}
