//! Fully connected feed-forward classifier with softmax output.

mod model;
mod train;

pub use model::{Activation, DenseLayer, MlpModel};
pub use train::{MlpParams, Solver};
