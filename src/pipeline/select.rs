use std::cmp::Ordering;
use std::fmt;

use ndarray::{Array2, ArrayView2, Axis};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::ml::estimator::FitError;
use crate::ml::params::{ParamError, ParamValue};

/// How many columns the univariate selector keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionWidth {
    #[default]
    All,
    Top(usize),
}

impl SelectionWidth {
    pub fn from_param(value: &ParamValue) -> Result<Self, ParamError> {
        match value {
            ParamValue::Text(text) if text == "all" => Ok(SelectionWidth::All),
            ParamValue::Int(k) if *k > 0 => Ok(SelectionWidth::Top(*k as usize)),
            _ => Err(ParamError::Invalid {
                name: "feature_selection__k".to_string(),
                value: value.to_string(),
                expected: "a positive integer or \"all\"",
            }),
        }
    }

    /// Score columns on training rows and keep the best `k`.
    pub fn fit(
        self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<FittedSelector, FitError> {
        let available = x.ncols();
        let scores = f_classif(x, y, n_classes);
        let selected = match self {
            SelectionWidth::All => (0..available).collect(),
            SelectionWidth::Top(k) if k > available => {
                return Err(FitError::InsufficientFeatures {
                    requested: k,
                    available,
                });
            }
            SelectionWidth::Top(k) => {
                let mut ranked: Vec<usize> = (0..available).collect();
                ranked.sort_by(|&a, &b| rank_order(scores[a], scores[b]).then(a.cmp(&b)));
                let mut keep = ranked[..k].to_vec();
                keep.sort_unstable();
                keep
            }
        };
        Ok(FittedSelector {
            n_features_in: available,
            scores,
            selected,
        })
    }
}

/// Descending by score; NaN sorts after every number, `+inf` before.
fn rank_order(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => OrderedFloat(b).cmp(&OrderedFloat(a)),
    }
}

impl fmt::Display for SelectionWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionWidth::All => f.write_str("all"),
            SelectionWidth::Top(k) => write!(f, "{k}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSelector {
    pub n_features_in: usize,
    /// ANOVA F score per input column. Not persisted: NaN has no JSON form.
    #[serde(skip, default)]
    pub scores: Vec<f32>,
    /// Kept column indices, ascending.
    pub selected: Vec<usize>,
}

impl FittedSelector {
    pub fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, FitError> {
        if x.ncols() != self.n_features_in {
            return Err(FitError::ShapeMismatch {
                expected: self.n_features_in,
                found: x.ncols(),
            });
        }
        if self.selected.len() == self.n_features_in {
            return Ok(x.to_owned());
        }
        Ok(x.select(Axis(1), &self.selected))
    }
}

/// One-way ANOVA F statistic of each column against the class labels.
///
/// Constant columns score NaN; columns perfectly separated by class score `+inf`.
pub fn f_classif(x: ArrayView2<'_, f32>, y: &[usize], n_classes: usize) -> Vec<f32> {
    let n = x.nrows();
    let mut class_sizes = vec![0usize; n_classes];
    for &label in y {
        if label < n_classes {
            class_sizes[label] += 1;
        }
    }
    let groups = class_sizes.iter().filter(|&&c| c > 0).count();
    if groups < 2 || n <= groups {
        return vec![f32::NAN; x.ncols()];
    }
    let df_between = (groups - 1) as f64;
    let df_within = (n - groups) as f64;

    x.axis_iter(Axis(1))
        .map(|column| {
            let mut sums = vec![0f64; n_classes];
            let mut total = 0f64;
            for (&v, &label) in column.iter().zip(y) {
                sums[label] += v as f64;
                total += v as f64;
            }
            let grand_mean = total / n as f64;
            let means: Vec<f64> = sums
                .iter()
                .zip(&class_sizes)
                .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
                .collect();
            let ss_between: f64 = means
                .iter()
                .zip(&class_sizes)
                .map(|(m, &c)| c as f64 * (m - grand_mean).powi(2))
                .sum();
            let ss_within: f64 = column
                .iter()
                .zip(y)
                .map(|(&v, &label)| (v as f64 - means[label]).powi(2))
                .sum();
            let ms_between = ss_between / df_between;
            let ms_within = ss_within / df_within;
            if ms_within == 0.0 {
                return if ms_between > 0.0 { f32::INFINITY } else { f32::NAN };
            }
            (ms_between / ms_within) as f32
        })
        .collect()
}
