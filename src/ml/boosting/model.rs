use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::ml::estimator::Classifier;
use crate::ml::tree::DecisionTree;

/// Fitted boosted-trees model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTreesModel {
    pub n_features: usize,
    pub n_classes: usize,
    /// Learning rate applied to each tree's output.
    pub learning_rate: f32,
    /// Log class priors used as the starting logits.
    pub init_raw: Vec<f32>,
    /// Shape: `[n_rounds][n_classes]`.
    pub trees: Vec<Vec<DecisionTree>>,
}

impl BoostedTreesModel {
    /// Raw logits for a feature row.
    pub fn predict_raw(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        let mut raw = self.init_raw.clone();
        for round in &self.trees {
            for (class_idx, tree) in round.iter().enumerate() {
                raw[class_idx] += self.learning_rate * tree.evaluate(row)[0];
            }
        }
        raw
    }
}

impl Classifier for BoostedTreesModel {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        self.predict_raw(row)
    }

    fn predict_proba(&self, row: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        Some(softmax(&self.predict_raw(row)))
    }
}

/// Numerically-stable softmax over a set of logits.
pub fn softmax(raw: &[f32]) -> Vec<f32> {
    if raw.is_empty() {
        return Vec::new();
    }
    let max = raw
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, |a, b| a.max(b));
    let mut exps = Vec::with_capacity(raw.len());
    let mut sum = 0.0f32;
    for &v in raw {
        let e = (v - max).exp();
        exps.push(e);
        sum += e;
    }
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / raw.len() as f32; raw.len()];
    }
    for v in &mut exps {
        *v /= sum;
    }
    exps
}
