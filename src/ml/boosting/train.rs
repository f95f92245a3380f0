use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use super::model::{BoostedTreesModel, softmax};
use crate::ml::estimator::{Estimator, FitError};
use crate::ml::params::{ParamError, ParamValue};
use crate::ml::tree::{Decision, DecisionTree, grow};

/// Training hyperparameters for tree boosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    /// Learning rate applied per round.
    pub learning_rate: f32,
    /// Number of bins used for split search.
    pub bins: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(6),
            learning_rate: 0.1,
            bins: 32,
            min_samples_leaf: 1,
        }
    }
}

impl Estimator for BoostParams {
    type Fitted = BoostedTreesModel;

    const NAME: &'static str = "GradientBoostedTrees";

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match name {
            "n_estimators" => self.n_estimators = value.as_usize(name)?.max(1),
            "max_depth" => self.max_depth = value.as_opt_usize(name)?,
            "learning_rate" => {
                let lr = value.as_f32(name)?;
                if !(lr > 0.0 && lr.is_finite()) {
                    return Err(ParamError::Invalid {
                        name: name.to_string(),
                        value: value.to_string(),
                        expected: "a positive number",
                    });
                }
                self.learning_rate = lr;
            }
            "bins" | "max_bin" => self.bins = value.as_usize(name)?.clamp(2, 256),
            "min_samples_leaf" => self.min_samples_leaf = value.as_usize(name)?.max(1),
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
    ) -> Result<BoostedTreesModel, FitError> {
        let n = x.nrows();
        let d = x.ncols();
        let bins = self.bins.clamp(2, 256);
        let (mins, maxs) = compute_feature_min_max(x);
        let binned = bin_features(x, &mins, &maxs, bins);
        let columns = Columns {
            x: x.view(),
            binned: &binned,
            mins: &mins,
            maxs: &maxs,
            bins,
        };

        let init_raw: Vec<f32> = class_priors(y, n_classes)
            .iter()
            .map(|&p| p.max(1e-6).ln())
            .collect();
        let mut raw: Vec<f32> = (0..n).flat_map(|_| init_raw.iter().copied()).collect();

        let mut rounds_out: Vec<Vec<DecisionTree>> = Vec::with_capacity(self.n_estimators);
        for _round in 0..self.n_estimators {
            let residuals = compute_residuals(y, &raw, n_classes);
            let mut trees_for_round = Vec::with_capacity(n_classes);
            for (class_idx, class_residuals) in residuals.iter().enumerate() {
                let tree = self.grow_tree(&columns, class_residuals);
                for (i, row) in x.rows().into_iter().enumerate() {
                    raw[i * n_classes + class_idx] += self.learning_rate * tree.evaluate(row)[0];
                }
                trees_for_round.push(tree);
            }
            if raw.iter().any(|v| !v.is_finite()) {
                return Err(FitError::Diverged(Self::NAME));
            }
            rounds_out.push(trees_for_round);
        }

        Ok(BoostedTreesModel {
            n_features: d,
            n_classes,
            learning_rate: self.learning_rate,
            init_raw,
            trees: rounds_out,
        })
    }
}

/// Read-only views over the training matrix used during split search.
struct Columns<'a> {
    x: ArrayView2<'a, f32>,
    /// Row-major `[n_rows][n_features]` bin indices.
    binned: &'a [u8],
    mins: &'a [f32],
    maxs: &'a [f32],
    bins: usize,
}

impl BoostParams {
    fn grow_tree(&self, columns: &Columns<'_>, residuals: &[f32]) -> DecisionTree {
        let min_leaf = self.min_samples_leaf.max(1);
        let n = columns.x.nrows();
        grow(
            (0..n).collect(),
            |samples, depth| {
                if self.max_depth.is_some_and(|max| depth >= max) || samples.len() < 2 * min_leaf {
                    return Decision::Leaf(vec![mean_residual(residuals, samples)]);
                }
                let parent_sse = sse(residuals, samples);
                let mut best = BestSplit::default();
                for feature_idx in 0..columns.mins.len() {
                    let split = best_split_for_feature(columns, residuals, samples, feature_idx, min_leaf);
                    if split.score < best.score {
                        best = split;
                    }
                }
                if !best.score.is_finite() || best.score >= parent_sse - 1e-12 {
                    return Decision::Leaf(vec![mean_residual(residuals, samples)]);
                }
                let feature = best.feature_index;
                let threshold = threshold_for_bin(
                    columns.mins[feature],
                    columns.maxs[feature],
                    best.split_bin,
                    columns.bins,
                );
                let (left, right): (Vec<usize>, Vec<usize>) = samples
                    .iter()
                    .partition(|&&i| columns.x[[i, feature]] <= threshold);
                Decision::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }
            },
            |samples| vec![mean_residual(residuals, samples)],
        )
    }
}

fn class_priors(y: &[usize], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        if label < n_classes {
            counts[label] += 1;
        }
    }
    let total = y.len().max(1) as f32;
    counts.into_iter().map(|c| c as f32 / total).collect()
}

/// Per-class `target - probability`, shape `[n_classes][n_rows]`.
fn compute_residuals(y: &[usize], raw: &[f32], n_classes: usize) -> Vec<Vec<f32>> {
    let n = y.len();
    let mut residuals = vec![vec![0.0f32; n]; n_classes];
    for (i, &yi) in y.iter().enumerate() {
        let probs = softmax(&raw[i * n_classes..(i + 1) * n_classes]);
        for (k, p) in probs.into_iter().enumerate() {
            let target = if yi == k { 1.0 } else { 0.0 };
            residuals[k][i] = target - p;
        }
    }
    residuals
}

fn compute_feature_min_max(x: ArrayView2<'_, f32>) -> (Vec<f32>, Vec<f32>) {
    let d = x.ncols();
    let mut mins = vec![f32::INFINITY; d];
    let mut maxs = vec![f32::NEG_INFINITY; d];
    for row in x.rows() {
        for (j, &v) in row.iter().enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    for j in 0..d {
        if !mins[j].is_finite() || !maxs[j].is_finite() {
            mins[j] = 0.0;
            maxs[j] = 0.0;
        }
        if mins[j] == maxs[j] {
            maxs[j] = mins[j] + 1.0;
        }
    }
    (mins, maxs)
}

/// Bin `b` covers `[min + b/bins * range, min + (b+1)/bins * range)`.
fn bin_features(x: ArrayView2<'_, f32>, mins: &[f32], maxs: &[f32], bins: usize) -> Vec<u8> {
    let bins_f = bins as f32;
    let mut out = Vec::with_capacity(x.len());
    for row in x.rows() {
        for (j, &v) in row.iter().enumerate() {
            let (min, max) = (mins[j], maxs[j]);
            let t = ((v - min) / (max - min)).clamp(0.0, 1.0);
            let b = if t.is_nan() {
                0
            } else {
                ((t * bins_f) as usize).min(bins - 1)
            };
            out.push(b as u8);
        }
    }
    out
}

#[derive(Debug, Clone)]
struct BestSplit {
    score: f64,
    feature_index: usize,
    split_bin: usize,
}

impl Default for BestSplit {
    fn default() -> Self {
        Self {
            score: f64::INFINITY,
            feature_index: 0,
            split_bin: 0,
        }
    }
}

fn best_split_for_feature(
    columns: &Columns<'_>,
    residuals: &[f32],
    samples: &[usize],
    feature_idx: usize,
    min_leaf: usize,
) -> BestSplit {
    let bins = columns.bins;
    let d = columns.mins.len();
    let mut counts = vec![0u32; bins];
    let mut sums = vec![0f64; bins];
    let mut sums_sq = vec![0f64; bins];
    for &i in samples {
        let b = columns.binned[i * d + feature_idx] as usize;
        let r = residuals[i] as f64;
        counts[b] += 1;
        sums[b] += r;
        sums_sq[b] += r * r;
    }
    let total_count = samples.len() as u32;
    let total_sum: f64 = sums.iter().sum();
    let total_sum_sq: f64 = sums_sq.iter().sum();

    let mut best = BestSplit {
        feature_index: feature_idx,
        ..BestSplit::default()
    };
    let mut left_count = 0u32;
    let mut left_sum = 0f64;
    let mut left_sum_sq = 0f64;
    for split_bin in 0..(bins - 1) {
        left_count += counts[split_bin];
        left_sum += sums[split_bin];
        left_sum_sq += sums_sq[split_bin];
        let right_count = total_count - left_count;
        if (left_count as usize) < min_leaf || (right_count as usize) < min_leaf {
            continue;
        }
        let right_sum = total_sum - left_sum;
        let right_sum_sq = total_sum_sq - left_sum_sq;
        let left_sse = left_sum_sq - (left_sum * left_sum) / left_count as f64;
        let right_sse = right_sum_sq - (right_sum * right_sum) / right_count as f64;
        let score = left_sse + right_sse;
        if score < best.score {
            best.score = score;
            best.split_bin = split_bin;
        }
    }
    best
}

fn threshold_for_bin(min: f32, max: f32, split_bin: usize, bins: usize) -> f32 {
    let t = ((split_bin + 1) as f32) / bins as f32;
    min + t * (max - min)
}

fn mean_residual(residuals: &[f32], samples: &[usize]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|&i| residuals[i]).sum::<f32>() / samples.len() as f32
}

fn sse(residuals: &[f32], samples: &[usize]) -> f64 {
    let n = samples.len().max(1) as f64;
    let sum: f64 = samples.iter().map(|&i| residuals[i] as f64).sum();
    let sum_sq: f64 = samples.iter().map(|&i| (residuals[i] as f64).powi(2)).sum();
    sum_sq - sum * sum / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::estimator::Classifier;
    use ndarray::{Array2, array};

    #[test]
    fn depth_limit_is_respected() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f32);
        let y: Vec<usize> = (0..40).map(|i| (i * 7 % 11) % 3).collect();
        let params = BoostParams {
            n_estimators: 5,
            max_depth: Some(2),
            ..BoostParams::default()
        };
        let model = params.fit(x.view(), &y, 3).unwrap();
        assert_eq!(model.trees.len(), 5);
        assert!(model.trees.iter().flatten().all(|tree| tree.depth() <= 2));
    }

    #[test]
    fn learns_interval_rule() {
        // class 1 only inside the middle band: a stump cannot express it.
        let x = array![[0.0f32], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = vec![0, 0, 0, 1, 1, 1, 0, 0, 0];
        let params = BoostParams {
            n_estimators: 60,
            max_depth: Some(3),
            learning_rate: 0.3,
            ..BoostParams::default()
        };
        let model = params.fit(x.view(), &y, 2).unwrap();
        for (row, &label) in x.rows().into_iter().zip(&y) {
            assert_eq!(model.predict(row), label);
        }
    }

    #[test]
    fn bins_and_thresholds_agree() {
        let x = array![[0.0f32], [0.49], [0.51], [1.0]];
        let (mins, maxs) = compute_feature_min_max(x.view());
        let binned = bin_features(x.view(), &mins, &maxs, 2);
        assert_eq!(binned, vec![0, 0, 1, 1]);
        assert!((threshold_for_bin(mins[0], maxs[0], 0, 2) - 0.5).abs() < 1e-6);
    }
}
