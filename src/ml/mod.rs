//! Classifier families, the dynamic estimator stage and evaluation metrics.
//!
//! Every family is implemented in-crate on `ndarray` views so fitted models serialize
//! to plain JSON alongside the rest of a run's artifacts.

pub mod boosting;
pub mod estimator;
pub mod forest;
pub mod linear;
pub mod metrics;
pub mod mlp;
pub mod params;
pub mod svm;
pub mod tree;

pub use estimator::{
    Classifier, DynamicEstimator, Estimator, EstimatorKind, EstimatorSpec, FitError,
    FittedEstimator,
};
pub use params::{ParamError, ParamSet, ParamValue};
