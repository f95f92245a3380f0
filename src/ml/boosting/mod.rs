//! Gradient-boosted regression trees for multi-class classification.
//!
//! One tree per class per round is fit to the softmax residuals. Split search runs on
//! binned features, so cost per node is linear in the number of rows.

mod model;
mod train;

pub use model::{BoostedTreesModel, softmax};
pub use train::BoostParams;
