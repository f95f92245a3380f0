//! Library exports for the run binaries, benchmarks and tests.
/// Run configuration.
pub mod config;
/// Tracing setup.
pub mod logging;
/// Per-run output directories.
pub mod run_dirs;
/// Group tables, assembly, label encoding and splits.
pub mod dataset;
/// Text-derived features.
pub mod text;
/// Estimator families and metrics.
pub mod ml;
/// Normalization, selection and estimator stages.
pub mod pipeline;
/// Cross-validated grid search.
pub mod search;
/// Classification reports.
pub mod report;
/// Persisted models.
pub mod model_bundle;
/// Applying persisted models to new data.
pub mod inference;
/// Search and final-fit runs.
pub mod run;
