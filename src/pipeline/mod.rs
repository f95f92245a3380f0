//! Three-stage model-selection pipeline: normalization, univariate top-k selection and
//! the dynamic estimator.
//!
//! Grid parameter names follow the stage prefixes used in search results:
//! `normalization`, `feature_selection__k`, `estimator` and `estimator__<param>`.

mod normalize;
mod select;

pub use normalize::{FittedNormalizer, Normalization};
pub use select::{FittedSelector, SelectionWidth, f_classif};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::ml::estimator::{
    DynamicEstimator, EstimatorKind, EstimatorSpec, FitError, check_training_input,
};
use crate::ml::params::{ParamError, ParamSet, ParamValue};

pub const NORMALIZATION_PARAM: &str = "normalization";
pub const SELECTION_PARAM: &str = "feature_selection__k";
pub const ESTIMATOR_PARAM: &str = "estimator";
const ESTIMATOR_PREFIX: &str = "estimator__";

/// Unfitted pipeline: one concrete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub normalization: Normalization,
    pub selection: SelectionWidth,
    pub estimator: EstimatorSpec,
    /// Seed handed to estimator families when the `estimator` parameter swaps them.
    pub seed: u64,
}

impl PipelineConfig {
    /// Defaults: no normalization, keep all features.
    pub fn new(kind: EstimatorKind, seed: u64) -> Self {
        Self {
            normalization: Normalization::None,
            selection: SelectionWidth::All,
            estimator: kind.build(seed),
            seed,
        }
    }

    /// Build a configuration from a parameter set. `estimator` is applied before any
    /// `estimator__*` parameter regardless of iteration order.
    pub fn from_params(kind: EstimatorKind, seed: u64, params: &ParamSet) -> Result<Self, ParamError> {
        let mut config = Self::new(kind, seed);
        if let Some(value) = params.get(ESTIMATOR_PARAM) {
            config.set_param(ESTIMATOR_PARAM, value)?;
        }
        for (name, value) in params {
            if name != ESTIMATOR_PARAM {
                config.set_param(name, value)?;
            }
        }
        Ok(config)
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match name {
            NORMALIZATION_PARAM => {
                self.normalization = match value {
                    ParamValue::None => Normalization::None,
                    _ => value.as_text(name)?.parse()?,
                };
            }
            SELECTION_PARAM => self.selection = SelectionWidth::from_param(value)?,
            ESTIMATOR_PARAM => {
                let kind: EstimatorKind = value.as_text(name)?.parse()?;
                if kind != self.estimator.kind() {
                    self.estimator = kind.build(self.seed);
                }
            }
            _ => match name.strip_prefix(ESTIMATOR_PREFIX) {
                Some(inner) => self.estimator.set_param(inner, value)?,
                None => {
                    return Err(ParamError::Unknown {
                        stage: "Pipeline",
                        name: name.to_string(),
                    });
                }
            },
        }
        Ok(())
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<FittedPipeline, FitError> {
        check_training_input(x, y, n_classes)?;
        let normalizer = self.normalization.fit(x);
        let normalized = normalizer.transform(x)?;
        let selector = self.selection.fit(normalized.view(), y, n_classes)?;
        let selected = selector.transform(normalized.view())?;
        let mut estimator = DynamicEstimator::new(self.estimator.clone());
        estimator.fit(selected.view(), y, n_classes)?;
        Ok(FittedPipeline {
            config: self.clone(),
            normalizer,
            selector,
            estimator,
        })
    }

    /// Human-readable description of every stage.
    pub fn describe(&self) -> String {
        format!(
            "Pipeline(normalization={}, feature_selection=SelectKBest(k={}), estimator={})",
            self.normalization,
            self.selection,
            self.estimator.describe()
        )
    }
}

/// Pipeline with every stage fitted on the same training rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub config: PipelineConfig,
    pub normalizer: FittedNormalizer,
    pub selector: FittedSelector,
    pub estimator: DynamicEstimator,
}

impl FittedPipeline {
    /// Apply normalization and selection; the result feeds the estimator.
    pub fn transform(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, FitError> {
        let normalized = self.normalizer.transform(x)?;
        self.selector.transform(normalized.view())
    }

    pub fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>, FitError> {
        self.estimator.predict(self.transform(x)?.view())
    }

    pub fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, FitError> {
        self.estimator.predict_proba(self.transform(x)?.view())
    }

    /// Mean accuracy.
    pub fn score(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<f64, FitError> {
        self.estimator.score(self.transform(x)?.view(), y)
    }

    pub fn n_features_in(&self) -> usize {
        self.selector.n_features_in
    }

    pub fn describe(&self) -> String {
        self.config.describe()
    }
}
