use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use super::ExtraTreesModel;
use crate::ml::estimator::{Estimator, FitError};
use crate::ml::params::{ParamError, ParamValue};
use crate::ml::tree::{Decision, DecisionTree, grow};

/// How many candidate features each split draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    fn count(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            max_features: MaxFeatures::Sqrt,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl Estimator for ForestParams {
    type Fitted = ExtraTreesModel;

    const NAME: &'static str = "ExtraTrees";

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match name {
            "n_estimators" => self.n_estimators = value.as_usize(name)?.max(1),
            "max_depth" => self.max_depth = value.as_opt_usize(name)?,
            "max_features" => {
                self.max_features = match value {
                    ParamValue::None => MaxFeatures::All,
                    _ => match value.as_text(name)? {
                        "sqrt" => MaxFeatures::Sqrt,
                        "log2" => MaxFeatures::Log2,
                        "all" => MaxFeatures::All,
                        _ => {
                            return Err(ParamError::Invalid {
                                name: name.to_string(),
                                value: value.to_string(),
                                expected: "sqrt, log2 or all",
                            });
                        }
                    },
                }
            }
            "min_samples_split" => self.min_samples_split = value.as_usize(name)?.max(2),
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
    ) -> Result<ExtraTreesModel, FitError> {
        let trees = (0..self.n_estimators)
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(tree_idx as u64));
                self.grow_tree(x, y, n_classes, &mut rng)
            })
            .collect();
        Ok(ExtraTreesModel {
            n_features: x.ncols(),
            n_classes,
            trees,
        })
    }
}

impl ForestParams {
    fn grow_tree(
        &self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
        rng: &mut StdRng,
    ) -> DecisionTree {
        let n_features = x.ncols();
        let max_features = self.max_features.count(n_features);
        let min_split = self.min_samples_split.max(2);
        let mut features: Vec<usize> = (0..n_features).collect();
        let distribution = |samples: &[usize]| class_distribution(y, samples, n_classes);

        grow(
            (0..x.nrows()).collect(),
            |samples, depth| {
                let counts = class_counts(y, samples, n_classes);
                let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
                if pure
                    || samples.len() < min_split
                    || self.max_depth.is_some_and(|max| depth >= max)
                {
                    return Decision::Leaf(normalize(counts));
                }

                features.shuffle(rng);
                let mut best: Option<(f64, usize, f32)> = None;
                let mut drawn = 0usize;
                for &feature in features.iter() {
                    if drawn >= max_features {
                        break;
                    }
                    let (lo, hi) = node_range(x, samples, feature);
                    if !(lo < hi) {
                        continue;
                    }
                    drawn += 1;
                    let mut threshold = lo + rng.random::<f32>() * (hi - lo);
                    if threshold >= hi {
                        threshold = lo;
                    }
                    let impurity = split_impurity(x, y, samples, feature, threshold, n_classes);
                    if best.is_none_or(|(score, _, _)| impurity < score) {
                        best = Some((impurity, feature, threshold));
                    }
                }
                match best {
                    Some((_, feature, threshold)) => {
                        let (left, right) = samples
                            .iter()
                            .partition(|&&i| x[[i, feature]] <= threshold);
                        Decision::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        }
                    }
                    None => Decision::Leaf(normalize(counts)),
                }
            },
            distribution,
        )
    }
}

fn class_counts(y: &[usize], samples: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in samples {
        counts[y[i]] += 1;
    }
    counts
}

fn normalize(counts: Vec<usize>) -> Vec<f32> {
    let total = counts.iter().sum::<usize>().max(1) as f32;
    counts.into_iter().map(|c| c as f32 / total).collect()
}

fn class_distribution(y: &[usize], samples: &[usize], n_classes: usize) -> Vec<f32> {
    normalize(class_counts(y, samples, n_classes))
}

fn node_range(x: ArrayView2<'_, f32>, samples: &[usize], feature: usize) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &i in samples {
        let v = x[[i, feature]];
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    (lo, hi)
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| (c as f64 / total).powi(2))
        .sum::<f64>()
}

/// Sample-weighted Gini impurity of the two children.
fn split_impurity(
    x: ArrayView2<'_, f32>,
    y: &[usize],
    samples: &[usize],
    feature: usize,
    threshold: f32,
    n_classes: usize,
) -> f64 {
    let mut left = vec![0usize; n_classes];
    let mut right = vec![0usize; n_classes];
    for &i in samples {
        if x[[i, feature]] <= threshold {
            left[y[i]] += 1;
        } else {
            right[y[i]] += 1;
        }
    }
    let nl: usize = left.iter().sum();
    let nr: usize = right.iter().sum();
    nl as f64 * gini(&left, nl) + nr as f64 * gini(&right, nr)
}
