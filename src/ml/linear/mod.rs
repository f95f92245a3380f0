//! One-vs-rest linear classifier trained with stochastic gradient descent.
//!
//! `loss = hinge` gives a linear SVM, `loss = log` a logistic regression.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::ml::estimator::Classifier;

mod train;
pub use train::LinearParams;

/// Loss optimized by the SGD solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearLoss {
    Hinge,
    Log,
}

/// Regularization penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    L2,
    L1,
    #[serde(rename = "elasticnet")]
    ElasticNet,
}

/// Fitted one-vs-rest linear model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub loss: LinearLoss,
    pub n_features: usize,
    pub n_classes: usize,
    /// Row-major `[n_classes][n_features]`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
    /// Epochs run per class before stopping.
    pub n_iter: Vec<usize>,
}

impl LinearModel {
    fn margin(&self, class_idx: usize, row: ArrayView1<'_, f32>) -> f32 {
        let base = class_idx * self.n_features;
        let w = &self.weights[base..base + self.n_features];
        let mut sum = self.bias[class_idx];
        for (wi, xi) in w.iter().zip(row.iter()) {
            sum += wi * xi;
        }
        sum
    }
}

impl Classifier for LinearModel {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        (0..self.n_classes).map(|c| self.margin(c, row)).collect()
    }

    /// Normalized one-vs-rest sigmoid outputs; only defined for log loss.
    fn predict_proba(&self, row: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        if self.loss != LinearLoss::Log {
            return None;
        }
        let mut proba: Vec<f32> = self
            .decision(row)
            .into_iter()
            .map(|z| 1.0 / (1.0 + (-z).exp()))
            .collect();
        let sum: f32 = proba.iter().sum();
        if sum > 0.0 {
            for p in &mut proba {
                *p /= sum;
            }
        } else {
            let uniform = 1.0 / self.n_classes as f32;
            proba.iter_mut().for_each(|p| *p = uniform);
        }
        Some(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn log_loss_probabilities_sum_to_one() {
        let model = LinearModel {
            loss: LinearLoss::Log,
            n_features: 2,
            n_classes: 3,
            weights: vec![1.0, 0.0, 0.0, 1.0, -1.0, -1.0],
            bias: vec![0.0, 0.0, 0.5],
            n_iter: vec![1, 1, 1],
        };
        let row = array![0.3f32, -0.2];
        let proba = model.predict_proba(row.view()).unwrap();
        let sum: f32 = proba.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(model.predict(row.view()), 2);
    }

    #[test]
    fn hinge_model_has_no_probabilities() {
        let model = LinearModel {
            loss: LinearLoss::Hinge,
            n_features: 1,
            n_classes: 2,
            weights: vec![1.0, -1.0],
            bias: vec![0.0, 0.0],
            n_iter: vec![1, 1],
        };
        assert!(model.predict_proba(array![1.0f32].view()).is_none());
    }
}
