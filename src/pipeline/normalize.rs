use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::ml::estimator::FitError;
use crate::ml::params::ParamError;

/// Per-column rescaling applied before feature selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    #[default]
    #[serde(rename = "none")]
    None,
    /// Zero mean, unit variance.
    #[serde(rename = "standard")]
    Standard,
    /// Rescale to `[0, 1]` using the training min and max.
    #[serde(rename = "minmax")]
    MinMax,
}

impl Normalization {
    pub fn tag(self) -> &'static str {
        match self {
            Normalization::None => "none",
            Normalization::Standard => "standard",
            Normalization::MinMax => "minmax",
        }
    }

    /// Learn column offsets and scales from training rows.
    pub fn fit(self, x: ArrayView2<'_, f32>) -> FittedNormalizer {
        let d = x.ncols();
        let (offset, scale) = match self {
            Normalization::None => (vec![0.0; d], vec![1.0; d]),
            Normalization::Standard => {
                let n = x.nrows().max(1) as f64;
                let mut offset = Vec::with_capacity(d);
                let mut scale = Vec::with_capacity(d);
                for column in x.axis_iter(Axis(1)) {
                    let mean = column.iter().map(|&v| v as f64).sum::<f64>() / n;
                    let var = column.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
                    offset.push(mean as f32);
                    scale.push(nonzero_scale(var.sqrt() as f32));
                }
                (offset, scale)
            }
            Normalization::MinMax => {
                let mut offset = Vec::with_capacity(d);
                let mut scale = Vec::with_capacity(d);
                for column in x.axis_iter(Axis(1)) {
                    let min = column.iter().copied().fold(f32::INFINITY, f32::min);
                    let max = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    if min.is_finite() && max.is_finite() {
                        offset.push(min);
                        scale.push(nonzero_scale(max - min));
                    } else {
                        offset.push(0.0);
                        scale.push(1.0);
                    }
                }
                (offset, scale)
            }
        };
        FittedNormalizer {
            kind: self,
            offset,
            scale,
        }
    }
}

fn nonzero_scale(scale: f32) -> f32 {
    if scale > 0.0 && scale.is_finite() {
        scale
    } else {
        1.0
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Normalization {
    type Err = ParamError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" | "None" => Ok(Normalization::None),
            "standard" | "std" => Ok(Normalization::Standard),
            "minmax" => Ok(Normalization::MinMax),
            _ => Err(ParamError::Invalid {
                name: "normalization".to_string(),
                value: value.to_string(),
                expected: "none, standard or minmax",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedNormalizer {
    pub kind: Normalization,
    pub offset: Vec<f32>,
    pub scale: Vec<f32>,
}

impl FittedNormalizer {
    pub fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, FitError> {
        if x.ncols() != self.offset.len() {
            return Err(FitError::ShapeMismatch {
                expected: self.offset.len(),
                found: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        if self.kind == Normalization::None {
            return Ok(out);
        }
        for mut row in out.rows_mut() {
            for ((v, offset), scale) in row.iter_mut().zip(&self.offset).zip(&self.scale) {
                *v = (*v - offset) / scale;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standard_centers_and_scales() {
        let x = array![[1.0f32, 5.0], [3.0, 5.0]];
        let out = Normalization::Standard.fit(x.view()).transform(x.view()).unwrap();
        assert_eq!(out, array![[-1.0f32, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn minmax_uses_training_range() {
        let train = array![[0.0f32], [4.0]];
        let fitted = Normalization::MinMax.fit(train.view());
        let out = fitted.transform(array![[2.0f32], [8.0]].view()).unwrap();
        assert_eq!(out, array![[0.5f32], [2.0]]);
    }

    #[test]
    fn column_count_must_match() {
        let fitted = Normalization::None.fit(array![[1.0f32, 2.0]].view());
        assert!(matches!(
            fitted.transform(array![[1.0f32]].view()),
            Err(FitError::ShapeMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn parses_grid_names() {
        assert_eq!("minmax".parse::<Normalization>().unwrap(), Normalization::MinMax);
        assert_eq!("None".parse::<Normalization>().unwrap(), Normalization::None);
        assert!("robust".parse::<Normalization>().is_err());
    }
}
