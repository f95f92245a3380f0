//! Extremely randomized trees.
//!
//! Each tree sees every training row; randomness comes from the candidate features and
//! from drawing split thresholds uniformly between the node's min and max.

mod train;

pub use train::{ForestParams, MaxFeatures};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::ml::estimator::Classifier;
use crate::ml::tree::DecisionTree;

/// Fitted ensemble; leaves hold class distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTreesModel {
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
}

impl ExtraTreesModel {
    fn average_leaves(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        let mut proba = vec![0.0f32; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.evaluate(row)) {
                *p += v;
            }
        }
        let n = self.trees.len().max(1) as f32;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }
}

impl Classifier for ExtraTreesModel {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        self.average_leaves(row)
    }

    fn predict_proba(&self, row: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        Some(self.average_leaves(row))
    }
}
