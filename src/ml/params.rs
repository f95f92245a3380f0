//! Hyperparameter values shared by grids, pipelines and estimators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One concrete configuration: parameter name to value, in sorted name order.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// A single hyperparameter value as it appears on a grid axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Absent / unbounded (e.g. `max_depth = None`).
    None,
    Int(i64),
    Float(f64),
    Text(String),
    /// Layer widths for multi-layer estimators.
    Layers(Vec<usize>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::None => write!(f, "None"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "{v}"),
            ParamValue::Layers(v) => {
                let parts: Vec<String> = v.iter().map(|w| w.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<Vec<usize>> for ParamValue {
    fn from(value: Vec<usize>) -> Self {
        ParamValue::Layers(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ParamValue::None)
    }
}

/// Errors raised while applying a hyperparameter to a stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("{stage} has no parameter `{name}`")]
    Unknown { stage: &'static str, name: String },
    #[error("invalid value `{value}` for `{name}`: expected {expected}")]
    Invalid {
        name: String,
        value: String,
        expected: &'static str,
    },
    #[error("grid axis `{0}` has no values")]
    EmptyAxis(String),
}

impl ParamValue {
    fn invalid(&self, name: &str, expected: &'static str) -> ParamError {
        ParamError::Invalid {
            name: name.to_string(),
            value: self.to_string(),
            expected,
        }
    }

    pub fn as_usize(&self, name: &str) -> Result<usize, ParamError> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            _ => Err(self.invalid(name, "a non-negative integer")),
        }
    }

    /// `None` maps to `Option::None`, integers to `Some`.
    pub fn as_opt_usize(&self, name: &str) -> Result<Option<usize>, ParamError> {
        match self {
            ParamValue::None => Ok(None),
            _ => self.as_usize(name).map(Some),
        }
    }

    pub fn as_f32(&self, name: &str) -> Result<f32, ParamError> {
        match self {
            ParamValue::Float(v) => Ok(*v as f32),
            ParamValue::Int(v) => Ok(*v as f32),
            _ => Err(self.invalid(name, "a number")),
        }
    }

    pub fn as_text(&self, name: &str) -> Result<&str, ParamError> {
        match self {
            ParamValue::Text(v) => Ok(v.as_str()),
            _ => Err(self.invalid(name, "a string")),
        }
    }

    pub fn as_bool(&self, name: &str) -> Result<bool, ParamError> {
        match self {
            ParamValue::Int(0) => Ok(false),
            ParamValue::Int(1) => Ok(true),
            ParamValue::Text(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            ParamValue::Text(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(self.invalid(name, "a boolean")),
        }
    }

    pub fn as_layers(&self, name: &str) -> Result<Vec<usize>, ParamError> {
        match self {
            ParamValue::Layers(v) if !v.is_empty() && v.iter().all(|w| *w > 0) => Ok(v.clone()),
            ParamValue::Int(v) if *v > 0 => Ok(vec![*v as usize]),
            _ => Err(self.invalid(name, "a list of positive layer widths")),
        }
    }
}
