//! Dynamic estimator stage.
//!
//! Every supported classifier family is a variant of [`EstimatorSpec`], carrying its own
//! hyperparameter struct. The variant tag is an ordinary hyperparameter, so a grid can
//! search over "which algorithm" next to each algorithm's own knobs.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::boosting::{BoostParams, BoostedTreesModel};
use super::forest::{ExtraTreesModel, ForestParams};
use super::linear::{LinearModel, LinearParams};
use super::metrics::{ConfusionMatrix, accuracy};
use super::mlp::{MlpModel, MlpParams};
use super::params::{ParamError, ParamValue};
use super::svm::{KernelSvmModel, SvmParams};

/// Errors raised while fitting or applying an estimator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("estimator has not been fitted")]
    NotFitted,
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("insufficient features for this configuration: k={requested} but only {available} available")]
    InsufficientFeatures { requested: usize, available: usize },
    #[error("expected {expected} features per row, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("{0} does not provide class probabilities")]
    NoProbabilities(&'static str),
    #[error("{0} diverged during training (non-finite weights)")]
    Diverged(&'static str),
}

/// Fitted model surface shared by every estimator family.
pub trait Classifier {
    fn n_classes(&self) -> usize;

    fn n_features(&self) -> usize;

    /// Raw per-class scores; the largest wins.
    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32>;

    /// Class probabilities when the family defines them.
    fn predict_proba(&self, _row: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        None
    }

    fn predict(&self, row: ArrayView1<'_, f32>) -> usize {
        argmax(&self.decision(row))
    }
}

/// Hyperparameter side of an estimator family: settable knobs and a `fit` constructor.
pub trait Estimator {
    type Fitted: Classifier;

    const NAME: &'static str;

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError>;

    fn fit(
        &self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<Self::Fitted, FitError>;
}

/// Closed set of estimator families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    GradientLinear,
    KernelSvm,
    GradientBoostedTrees,
    ExtraTrees,
    MultiLayerPerceptron,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 5] = [
        EstimatorKind::GradientLinear,
        EstimatorKind::KernelSvm,
        EstimatorKind::GradientBoostedTrees,
        EstimatorKind::ExtraTrees,
        EstimatorKind::MultiLayerPerceptron,
    ];

    /// Name used for artifacts (`{name}.csv`, `report_{name}.csv`, ...).
    pub fn name(self) -> &'static str {
        match self {
            EstimatorKind::GradientLinear => LinearParams::NAME,
            EstimatorKind::KernelSvm => SvmParams::NAME,
            EstimatorKind::GradientBoostedTrees => BoostParams::NAME,
            EstimatorKind::ExtraTrees => ForestParams::NAME,
            EstimatorKind::MultiLayerPerceptron => MlpParams::NAME,
        }
    }

    /// Grid/config tag (`gradient_linear`, ...).
    pub fn tag(self) -> &'static str {
        match self {
            EstimatorKind::GradientLinear => "gradient_linear",
            EstimatorKind::KernelSvm => "kernel_svm",
            EstimatorKind::GradientBoostedTrees => "gradient_boosted_trees",
            EstimatorKind::ExtraTrees => "extra_trees",
            EstimatorKind::MultiLayerPerceptron => "multi_layer_perceptron",
        }
    }

    /// Construct the family's default hyperparameters.
    pub fn build(self, seed: u64) -> EstimatorSpec {
        match self {
            EstimatorKind::GradientLinear => EstimatorSpec::GradientLinear(LinearParams {
                seed,
                ..LinearParams::default()
            }),
            EstimatorKind::KernelSvm => EstimatorSpec::KernelSvm(SvmParams {
                seed,
                ..SvmParams::default()
            }),
            EstimatorKind::GradientBoostedTrees => {
                EstimatorSpec::GradientBoostedTrees(BoostParams::default())
            }
            EstimatorKind::ExtraTrees => EstimatorSpec::ExtraTrees(ForestParams {
                seed,
                ..ForestParams::default()
            }),
            EstimatorKind::MultiLayerPerceptron => {
                EstimatorSpec::MultiLayerPerceptron(MlpParams {
                    seed,
                    ..MlpParams::default()
                })
            }
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EstimatorKind {
    type Err = ParamError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EstimatorKind::ALL
            .into_iter()
            .find(|kind| kind.tag() == value || kind.name() == value)
            .ok_or_else(|| ParamError::Invalid {
                name: "estimator".to_string(),
                value: value.to_string(),
                expected: "a known estimator family",
            })
    }
}

/// Estimator family tag plus that family's hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum EstimatorSpec {
    GradientLinear(LinearParams),
    KernelSvm(SvmParams),
    GradientBoostedTrees(BoostParams),
    ExtraTrees(ForestParams),
    MultiLayerPerceptron(MlpParams),
}

impl EstimatorSpec {
    pub fn kind(&self) -> EstimatorKind {
        match self {
            EstimatorSpec::GradientLinear(_) => EstimatorKind::GradientLinear,
            EstimatorSpec::KernelSvm(_) => EstimatorKind::KernelSvm,
            EstimatorSpec::GradientBoostedTrees(_) => EstimatorKind::GradientBoostedTrees,
            EstimatorSpec::ExtraTrees(_) => EstimatorKind::ExtraTrees,
            EstimatorSpec::MultiLayerPerceptron(_) => EstimatorKind::MultiLayerPerceptron,
        }
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        match self {
            EstimatorSpec::GradientLinear(p) => p.set_param(name, value),
            EstimatorSpec::KernelSvm(p) => p.set_param(name, value),
            EstimatorSpec::GradientBoostedTrees(p) => p.set_param(name, value),
            EstimatorSpec::ExtraTrees(p) => p.set_param(name, value),
            EstimatorSpec::MultiLayerPerceptron(p) => p.set_param(name, value),
        }
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<FittedEstimator, FitError> {
        check_training_input(x, y, n_classes)?;
        Ok(match self {
            EstimatorSpec::GradientLinear(p) => FittedEstimator::GradientLinear(p.fit(x, y, n_classes)?),
            EstimatorSpec::KernelSvm(p) => FittedEstimator::KernelSvm(p.fit(x, y, n_classes)?),
            EstimatorSpec::GradientBoostedTrees(p) => {
                FittedEstimator::GradientBoostedTrees(p.fit(x, y, n_classes)?)
            }
            EstimatorSpec::ExtraTrees(p) => FittedEstimator::ExtraTrees(p.fit(x, y, n_classes)?),
            EstimatorSpec::MultiLayerPerceptron(p) => {
                FittedEstimator::MultiLayerPerceptron(p.fit(x, y, n_classes)?)
            }
        })
    }

    /// One-line description, e.g. `ExtraTrees {"n_estimators":32,...}`.
    pub fn describe(&self) -> String {
        let params = match self {
            EstimatorSpec::GradientLinear(p) => serde_json::to_string(p),
            EstimatorSpec::KernelSvm(p) => serde_json::to_string(p),
            EstimatorSpec::GradientBoostedTrees(p) => serde_json::to_string(p),
            EstimatorSpec::ExtraTrees(p) => serde_json::to_string(p),
            EstimatorSpec::MultiLayerPerceptron(p) => serde_json::to_string(p),
        }
        .unwrap_or_default();
        format!("{} {params}", self.kind().name())
    }
}

/// A trained model of any family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum FittedEstimator {
    GradientLinear(LinearModel),
    KernelSvm(KernelSvmModel),
    GradientBoostedTrees(BoostedTreesModel),
    ExtraTrees(ExtraTreesModel),
    MultiLayerPerceptron(MlpModel),
}

impl FittedEstimator {
    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            FittedEstimator::GradientLinear(m) => m,
            FittedEstimator::KernelSvm(m) => m,
            FittedEstimator::GradientBoostedTrees(m) => m,
            FittedEstimator::ExtraTrees(m) => m,
            FittedEstimator::MultiLayerPerceptron(m) => m,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FittedEstimator::GradientLinear(_) => EstimatorKind::GradientLinear.name(),
            FittedEstimator::KernelSvm(_) => EstimatorKind::KernelSvm.name(),
            FittedEstimator::GradientBoostedTrees(_) => EstimatorKind::GradientBoostedTrees.name(),
            FittedEstimator::ExtraTrees(_) => EstimatorKind::ExtraTrees.name(),
            FittedEstimator::MultiLayerPerceptron(_) => EstimatorKind::MultiLayerPerceptron.name(),
        }
    }
}

impl Classifier for FittedEstimator {
    fn n_classes(&self) -> usize {
        self.as_classifier().n_classes()
    }

    fn n_features(&self) -> usize {
        self.as_classifier().n_features()
    }

    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        self.as_classifier().decision(row)
    }

    fn predict_proba(&self, row: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        self.as_classifier().predict_proba(row)
    }

    fn predict(&self, row: ArrayView1<'_, f32>) -> usize {
        self.as_classifier().predict(row)
    }
}

/// Pipeline stage holding exactly one current estimator.
///
/// Swapping the spec discards any fitted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicEstimator {
    spec: EstimatorSpec,
    #[serde(default)]
    fitted: Option<FittedEstimator>,
}

impl DynamicEstimator {
    pub fn new(spec: EstimatorSpec) -> Self {
        Self { spec, fitted: None }
    }

    pub fn spec(&self) -> &EstimatorSpec {
        &self.spec
    }

    pub fn fitted(&self) -> Option<&FittedEstimator> {
        self.fitted.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Replace the held estimator.
    pub fn set_estimator(&mut self, spec: EstimatorSpec) {
        self.spec = spec;
        self.fitted = None;
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<(), ParamError> {
        self.spec.set_param(name, value)?;
        self.fitted = None;
        Ok(())
    }

    pub fn fit(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<(), FitError> {
        self.fitted = None;
        self.fitted = Some(self.spec.fit(x, y, n_classes)?);
        Ok(())
    }

    fn model(&self, x: ArrayView2<'_, f32>) -> Result<&FittedEstimator, FitError> {
        let model = self.fitted.as_ref().ok_or(FitError::NotFitted)?;
        if x.ncols() != model.n_features() {
            return Err(FitError::ShapeMismatch {
                expected: model.n_features(),
                found: x.ncols(),
            });
        }
        Ok(model)
    }

    pub fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<usize>, FitError> {
        let model = self.model(x)?;
        Ok(x.rows().into_iter().map(|row| model.predict(row)).collect())
    }

    /// Row-major `(n_rows, n_classes)` probabilities.
    pub fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>, FitError> {
        let model = self.model(x)?;
        let n_classes = model.n_classes();
        let mut out = Array2::<f32>::zeros((x.nrows(), n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let proba = model
                .predict_proba(row)
                .ok_or(FitError::NoProbabilities(model.name()))?;
            for (c, p) in proba.into_iter().enumerate().take(n_classes) {
                out[[i, c]] = p;
            }
        }
        Ok(out)
    }

    /// Mean accuracy on the given rows.
    pub fn score(&self, x: ArrayView2<'_, f32>, y: &[usize]) -> Result<f64, FitError> {
        let predicted = self.predict(x)?;
        let n_classes = self.fitted.as_ref().map(|m| m.n_classes()).unwrap_or(0);
        let cm = ConfusionMatrix::from_predictions(n_classes, y, &predicted);
        Ok(accuracy(&cm))
    }
}

/// Shared guards applied before any family trains.
pub fn check_training_input(
    x: ArrayView2<'_, f32>,
    y: &[usize],
    n_classes: usize,
) -> Result<(), FitError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(FitError::InsufficientData(format!(
            "empty training matrix ({} x {})",
            x.nrows(),
            x.ncols()
        )));
    }
    if x.nrows() != y.len() {
        return Err(FitError::ShapeMismatch {
            expected: x.nrows(),
            found: y.len(),
        });
    }
    if n_classes < 2 {
        return Err(FitError::InsufficientData(
            "need at least 2 classes".to_string(),
        ));
    }
    let mut seen = vec![false; n_classes];
    for &label in y {
        if label >= n_classes {
            return Err(FitError::InsufficientData(format!(
                "label {label} out of range for {n_classes} classes"
            )));
        }
        seen[label] = true;
    }
    if seen.iter().filter(|s| **s).count() < 2 {
        return Err(FitError::InsufficientData(
            "training labels contain a single class".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = idx;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy() -> (Array2<f32>, Vec<usize>) {
        let x = array![
            [0.0f32, 0.1],
            [0.2, 0.0],
            [0.1, 0.2],
            [3.0, 3.1],
            [3.2, 2.9],
            [2.9, 3.0],
        ];
        (x, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn predict_before_fit_fails() {
        let stage = DynamicEstimator::new(EstimatorKind::ExtraTrees.build(1));
        let (x, _) = toy();
        assert_eq!(stage.predict(x.view()), Err(FitError::NotFitted));
        assert_eq!(stage.predict_proba(x.view()).unwrap_err(), FitError::NotFitted);
    }

    #[test]
    fn every_family_fits_separable_data() {
        let (x, y) = toy();
        for kind in EstimatorKind::ALL {
            let mut spec = kind.build(7);
            if kind == EstimatorKind::MultiLayerPerceptron {
                spec.set_param("learning_rate_init", &ParamValue::Float(0.01)).unwrap();
            }
            let mut stage = DynamicEstimator::new(spec);
            stage.fit(x.view(), &y, 2).unwrap();
            let score = stage.score(x.view(), &y).unwrap();
            assert!(score >= 0.99, "{kind} scored {score}");
        }
    }

    #[test]
    fn swapping_estimator_resets_fit() {
        let (x, y) = toy();
        let mut stage = DynamicEstimator::new(EstimatorKind::GradientLinear.build(3));
        stage.fit(x.view(), &y, 2).unwrap();
        assert!(stage.is_fitted());
        stage.set_estimator(EstimatorKind::KernelSvm.build(3));
        assert!(!stage.is_fitted());
        assert_eq!(stage.spec().kind(), EstimatorKind::KernelSvm);
    }

    #[test]
    fn hinge_loss_has_no_probabilities() {
        let (x, y) = toy();
        let mut spec = EstimatorKind::GradientLinear.build(3);
        spec.set_param("loss", &ParamValue::from("hinge")).unwrap();
        let mut stage = DynamicEstimator::new(spec);
        stage.fit(x.view(), &y, 2).unwrap();
        assert!(matches!(
            stage.predict_proba(x.view()),
            Err(FitError::NoProbabilities(_))
        ));
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut spec = EstimatorKind::ExtraTrees.build(0);
        let err = spec.set_param("kernel", &ParamValue::from("rbf")).unwrap_err();
        assert!(matches!(err, ParamError::Unknown { .. }));
    }

    #[test]
    fn single_class_training_is_rejected() {
        let (x, _) = toy();
        let err = EstimatorKind::ExtraTrees
            .build(0)
            .fit(x.view(), &[0; 6], 2)
            .unwrap_err();
        assert!(matches!(err, FitError::InsufficientData(_)));
    }

    #[test]
    fn kind_parses_from_tag_and_name() {
        assert_eq!("extra_trees".parse::<EstimatorKind>().unwrap(), EstimatorKind::ExtraTrees);
        assert_eq!("KernelSvm".parse::<EstimatorKind>().unwrap(), EstimatorKind::KernelSvm);
        assert!("lstm".parse::<EstimatorKind>().is_err());
    }
}
