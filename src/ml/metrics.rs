//! Evaluation metrics for classification models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// Build a matrix from aligned truth/prediction slices.
    pub fn from_predictions(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    /// Total number of recorded predictions.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&v| v as u64).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Precision/recall/F1 statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Total number of true examples for the class.
    pub support: u32,
}

/// Compute per-class precision, recall and F1 from a confusion matrix.
///
/// Zero denominators yield `0.0` rather than `NaN`.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f64;
        let mut fp = 0f64;
        let mut fn_ = 0f64;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f64;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f64;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        stats.push(PerClassStats {
            precision,
            recall,
            f1,
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let mut correct = 0u64;
    let mut total = 0u64;
    for truth in 0..cm.n_classes {
        for predicted in 0..cm.n_classes {
            let v = cm.get(truth, predicted) as u64;
            total += v;
            if truth == predicted {
                correct += v;
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        (correct as f64) / (total as f64)
    }
}

/// Unweighted mean of the per-class statistics.
pub fn macro_average(stats: &[PerClassStats]) -> PerClassStats {
    let n = stats.len().max(1) as f64;
    PerClassStats {
        precision: stats.iter().map(|s| s.precision).sum::<f64>() / n,
        recall: stats.iter().map(|s| s.recall).sum::<f64>() / n,
        f1: stats.iter().map(|s| s.f1).sum::<f64>() / n,
        support: stats.iter().map(|s| s.support).sum(),
    }
}

/// Support-weighted mean of the per-class statistics.
pub fn weighted_average(stats: &[PerClassStats]) -> PerClassStats {
    let total: u32 = stats.iter().map(|s| s.support).sum();
    if total == 0 {
        return PerClassStats {
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            support: 0,
        };
    }
    let weight = |s: &PerClassStats| s.support as f64 / total as f64;
    PerClassStats {
        precision: stats.iter().map(|s| s.precision * weight(s)).sum(),
        recall: stats.iter().map(|s| s.recall * weight(s)).sum(),
        f1: stats.iter().map(|s| s.f1 * weight(s)).sum(),
        support: total,
    }
}

/// Support-weighted F1 over aligned label slices. Used as the search metric.
pub fn f1_weighted(n_classes: usize, truth: &[usize], predicted: &[usize]) -> f64 {
    let cm = ConfusionMatrix::from_predictions(n_classes, truth, predicted);
    weighted_average(&precision_recall_by_class(&cm)).f1
}
