//! Cross-validated grid search over pipeline configurations.

mod cv;
mod grid;
mod grids;
mod results;

pub use cv::{GridSearch, SearchOutcome};
pub use grid::GridEntry;
pub use grids::{final_grids, search_grids};
pub use results::{CandidateResult, CvResults};

use thiserror::Error;

use crate::dataset::SplitError;
use crate::ml::estimator::FitError;
use crate::ml::params::ParamError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid grid: {0}")]
    Param(#[from] ParamError),
    #[error("cross-validation split failed: {0}")]
    Split(#[from] SplitError),
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("no configuration scored on every fold ({candidates} tried)")]
    AllFailed { candidates: usize },
    #[error("refitting the best configuration failed: {0}")]
    Refit(#[from] FitError),
}
