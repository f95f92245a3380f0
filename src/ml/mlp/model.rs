use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::ml::boosting::softmax;
use crate::ml::estimator::Classifier;

/// Hidden-layer nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Tanh,
}

impl Activation {
    pub(crate) fn apply(self, v: f32) -> f32 {
        match self {
            Activation::Relu => v.max(0.0),
            Activation::Tanh => v.tanh(),
        }
    }

    /// Derivative expressed in terms of the activation output.
    pub(crate) fn derivative(self, activated: f32) -> f32 {
        match self {
            Activation::Relu => {
                if activated > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - activated * activated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub n_in: usize,
    pub n_out: usize,
    /// Row-major `[n_out][n_in]`.
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    pub(crate) fn forward(&self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        for o in 0..self.n_out {
            let base = o * self.n_in;
            let mut sum = self.bias[o];
            for (w, x) in self.weights[base..base + self.n_in].iter().zip(input) {
                sum += w * x;
            }
            out.push(sum);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpModel {
    pub activation: Activation,
    /// Hidden layers followed by the output layer.
    pub layers: Vec<DenseLayer>,
    /// Epochs run before stopping.
    pub n_iter: usize,
    /// Final training loss (or best validation accuracy with early stopping).
    pub best_loss: f32,
}

impl MlpModel {
    /// Fill `acts[0]` with the input and `acts[l + 1]` with layer `l`'s output.
    /// The last entry holds raw logits.
    pub(crate) fn forward_into(&self, input: &[f32], acts: &mut Vec<Vec<f32>>) {
        acts.resize(self.layers.len() + 1, Vec::new());
        acts[0].clear();
        acts[0].extend_from_slice(input);
        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            let (head, tail) = acts.split_at_mut(l + 1);
            layer.forward(&head[l], &mut tail[0]);
            if l != last {
                for v in tail[0].iter_mut() {
                    *v = self.activation.apply(*v);
                }
            }
        }
    }

    fn logits(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        let input: Vec<f32> = row.iter().copied().collect();
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        self.forward_into(&input, &mut acts);
        acts.pop().unwrap_or_default()
    }
}

impl Classifier for MlpModel {
    fn n_classes(&self) -> usize {
        self.layers.last().map(|l| l.n_out).unwrap_or(0)
    }

    fn n_features(&self) -> usize {
        self.layers.first().map(|l| l.n_in).unwrap_or(0)
    }

    fn decision(&self, row: ArrayView1<'_, f32>) -> Vec<f32> {
        self.logits(row)
    }

    fn predict_proba(&self, row: ArrayView1<'_, f32>) -> Option<Vec<f32>> {
        Some(softmax(&self.logits(row)))
    }
}
