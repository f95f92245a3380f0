//! Binary decision trees shared by the boosted and randomized tree ensembles.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// A node in a flattened tree. The root is always at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left.
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    /// Walk the tree for a row and return the reached leaf's values.
    pub fn evaluate(&self, row: ArrayView1<'_, f32>) -> &[f32] {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[idx] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }
}

/// Outcome of inspecting one node's samples during growth.
pub(crate) enum Decision {
    Leaf(Vec<f32>),
    Split {
        feature: usize,
        threshold: f32,
        left: Vec<usize>,
        right: Vec<usize>,
    },
}

/// Grow a tree depth-first from `samples`, asking `decide` what to do at each node.
///
/// `decide` receives the node's sample indices and depth (root = 0). Splits with an
/// empty side are turned into leaves by the caller's `leaf` fallback.
pub(crate) fn grow<D, L>(samples: Vec<usize>, mut decide: D, mut leaf: L) -> DecisionTree
where
    D: FnMut(&[usize], usize) -> Decision,
    L: FnMut(&[usize]) -> Vec<f32>,
{
    let mut nodes = vec![Node::Leaf { value: Vec::new() }];
    let mut stack = vec![(0usize, samples, 0usize)];
    while let Some((idx, node_samples, depth)) = stack.pop() {
        match decide(&node_samples, depth) {
            Decision::Split {
                feature,
                threshold,
                left,
                right,
            } if !left.is_empty() && !right.is_empty() => {
                let left_idx = nodes.len();
                nodes.push(Node::Leaf { value: Vec::new() });
                let right_idx = nodes.len();
                nodes.push(Node::Leaf { value: Vec::new() });
                nodes[idx] = Node::Split {
                    feature,
                    threshold,
                    left: left_idx,
                    right: right_idx,
                };
                stack.push((right_idx, right, depth + 1));
                stack.push((left_idx, left, depth + 1));
            }
            Decision::Split { .. } => {
                nodes[idx] = Node::Leaf {
                    value: leaf(&node_samples),
                };
            }
            Decision::Leaf(value) => nodes[idx] = Node::Leaf { value },
        }
    }
    DecisionTree { nodes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn evaluate_follows_threshold() {
        let tree = DecisionTree {
            nodes: vec![
                Node::Split {
                    feature: 1,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: vec![-1.0] },
                Node::Leaf { value: vec![2.0] },
            ],
        };
        assert_eq!(tree.evaluate(array![9.0f32, 0.5].view()), &[-1.0]);
        assert_eq!(tree.evaluate(array![9.0f32, 0.6].view()), &[2.0]);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn grow_splits_until_pure() {
        let values = [0.0f32, 1.0, 2.0, 3.0];
        let tree = grow(
            vec![0, 1, 2, 3],
            |samples, _depth| {
                if samples.len() <= 1 {
                    return Decision::Leaf(vec![values[samples[0]]]);
                }
                let mid = samples.len() / 2;
                Decision::Split {
                    feature: 0,
                    threshold: values[samples[mid - 1]],
                    left: samples[..mid].to_vec(),
                    right: samples[mid..].to_vec(),
                }
            },
            |_| vec![0.0],
        );
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.evaluate(array![2.0f32].view()), &[2.0]);
    }
}
