use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ml::estimator::EstimatorKind;
use crate::ml::params::{ParamError, ParamSet, ParamValue};
use crate::pipeline::ESTIMATOR_PARAM;

/// One grid: every named axis and the values it may take.
///
/// Axes are kept sorted by name; expansion varies the last name fastest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridEntry {
    pub params: BTreeMap<String, Vec<ParamValue>>,
}

impl GridEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style axis insertion.
    pub fn axis<V: Into<ParamValue>>(mut self, name: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.params
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Estimator family named by the first value of the `estimator` axis.
    pub fn estimator_kind(&self) -> Result<EstimatorKind, ParamError> {
        let value = self
            .params
            .get(ESTIMATOR_PARAM)
            .and_then(|values| values.first())
            .ok_or_else(|| ParamError::EmptyAxis(ESTIMATOR_PARAM.to_string()))?;
        value.as_text(ESTIMATOR_PARAM)?.parse()
    }

    /// Artifact name of the entry's estimator family.
    pub fn estimator_name(&self) -> Result<&'static str, ParamError> {
        Ok(self.estimator_kind()?.name())
    }

    /// Number of configurations the entry expands to.
    pub fn len(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when every axis holds exactly one value.
    pub fn is_fixed(&self) -> bool {
        self.params.values().all(|values| values.len() == 1)
    }

    /// Cartesian product of all axes.
    pub fn expand(&self) -> Result<Vec<ParamSet>, ParamError> {
        if let Some((name, _)) = self.params.iter().find(|(_, values)| values.is_empty()) {
            return Err(ParamError::EmptyAxis(name.clone()));
        }
        let axes: Vec<(&String, &Vec<ParamValue>)> = self.params.iter().collect();
        let total = self.len();
        let mut out = Vec::with_capacity(total);
        let mut odometer = vec![0usize; axes.len()];
        for _ in 0..total {
            out.push(
                axes.iter()
                    .zip(&odometer)
                    .map(|((name, values), &idx)| ((*name).clone(), values[idx].clone()))
                    .collect(),
            );
            for pos in (0..axes.len()).rev() {
                odometer[pos] += 1;
                if odometer[pos] < axes[pos].1.len() {
                    break;
                }
                odometer[pos] = 0;
            }
        }
        Ok(out)
    }
}

impl fmt::Display for GridEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axes: Vec<String> = self
            .params
            .iter()
            .map(|(name, values)| {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                format!("'{name}': [{}]", values.join(", "))
            })
            .collect();
        write!(f, "{{{}}}", axes.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_varies_last_axis_fastest() {
        let entry = GridEntry::new()
            .axis("estimator", ["extra_trees"])
            .axis("feature_selection__k", [ParamValue::Int(1), ParamValue::from("all")])
            .axis("normalization", ["standard", "minmax"]);
        let sets = entry.expand().unwrap();
        assert_eq!(sets.len(), 4);
        assert_eq!(entry.len(), 4);
        let keys: Vec<(String, String)> = sets
            .iter()
            .map(|set| {
                (
                    set["feature_selection__k"].to_string(),
                    set["normalization"].to_string(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("1".into(), "standard".into()),
                ("1".into(), "minmax".into()),
                ("all".into(), "standard".into()),
                ("all".into(), "minmax".into()),
            ]
        );
        assert_eq!(entry.estimator_name().unwrap(), "ExtraTrees");
        assert!(!entry.is_fixed());
    }

    #[test]
    fn empty_axis_is_rejected() {
        let entry = GridEntry::new()
            .axis("estimator", ["extra_trees"])
            .axis("estimator__n_estimators", Vec::<i64>::new());
        assert!(matches!(entry.expand(), Err(ParamError::EmptyAxis(name)) if name == "estimator__n_estimators"));
    }

    #[test]
    fn missing_estimator_axis_has_no_name() {
        let entry = GridEntry::new().axis("normalization", ["standard"]);
        assert!(entry.estimator_name().is_err());
    }
}
