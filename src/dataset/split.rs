use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("cross-validation needs at least 2 folds, got {0}")]
    TooFewSplits(usize),
    #[error("cannot make {n_splits} folds from {n_samples} samples")]
    TooManySplits { n_splits: usize, n_samples: usize },
    #[error("every class has fewer than {n_splits} members (largest class: {largest})")]
    ClassesTooSmall { n_splits: usize, largest: usize },
    #[error("test fraction {test_fraction} leaves an empty split for {n_samples} samples")]
    EmptySplit { n_samples: usize, test_fraction: f64 },
}

/// Row indices of a train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_samples` with `seed`; the first `ceil(n * test_fraction)` go to test.
pub fn train_test_split(
    n_samples: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(SplitError::EmptySplit {
            n_samples,
            test_fraction,
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut permutation: Vec<usize> = (0..n_samples).collect();
    permutation.shuffle(&mut rng);
    let train = permutation.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: permutation,
    })
}

/// Stratified k-fold without shuffling.
///
/// Classes are ordered by first appearance. Per-fold class counts come from dealing the
/// class-sorted labels round-robin across folds; each class then fills the folds in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Result<Self, SplitError> {
        if n_splits < 2 {
            return Err(SplitError::TooFewSplits(n_splits));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// One `TrainTestSplit` per fold, indices ascending.
    pub fn split(&self, y: &[usize]) -> Result<Vec<TrainTestSplit>, SplitError> {
        let k = self.n_splits;
        let n = y.len();
        if k > n {
            return Err(SplitError::TooManySplits {
                n_splits: k,
                n_samples: n,
            });
        }

        let mut order_of_label: Vec<(usize, usize)> = Vec::new();
        let mut encoded = Vec::with_capacity(n);
        for &label in y {
            let class = match order_of_label.iter().find(|(l, _)| *l == label) {
                Some(&(_, class)) => class,
                None => {
                    let class = order_of_label.len();
                    order_of_label.push((label, class));
                    class
                }
            };
            encoded.push(class);
        }
        let n_classes = order_of_label.len();
        let mut counts = vec![0usize; n_classes];
        for &class in &encoded {
            counts[class] += 1;
        }
        let largest = counts.iter().copied().max().unwrap_or(0);
        let smallest = counts.iter().copied().min().unwrap_or(0);
        if largest < k {
            return Err(SplitError::ClassesTooSmall {
                n_splits: k,
                largest,
            });
        }
        if smallest < k {
            warn!(
                smallest,
                n_splits = k,
                "least populated class has fewer members than folds"
            );
        }

        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        // allocation[fold][class]
        let mut allocation = vec![vec![0usize; n_classes]; k];
        for (pos, &class) in sorted.iter().enumerate() {
            allocation[pos % k][class] += 1;
        }

        let mut test_fold = vec![0usize; n];
        for class in 0..n_classes {
            let mut folds = (0..k).flat_map(|fold| std::iter::repeat_n(fold, allocation[fold][class]));
            for (idx, &c) in encoded.iter().enumerate() {
                if c == class {
                    test_fold[idx] = folds.next().unwrap_or(k - 1);
                }
            }
        }

        Ok((0..k)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&idx| test_fold[idx] == fold);
                TrainTestSplit { train, test }
            })
            .collect())
    }
}
