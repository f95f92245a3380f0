use std::time::Instant;

use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::dataset::{StratifiedKFold, TrainTestSplit};
use crate::ml::estimator::FitError;
use crate::ml::metrics::f1_weighted;
use crate::ml::params::ParamSet;
use crate::pipeline::{FittedPipeline, PipelineConfig};

use super::SearchError;
use super::grid::GridEntry;
use super::results::{CandidateResult, CvResults};

/// Exhaustive cross-validated search over one grid entry.
#[derive(Debug, Clone)]
pub struct GridSearch {
    entry: GridEntry,
    cv: usize,
    /// Worker threads; 0 uses every core.
    n_jobs: usize,
    seed: u64,
}

/// Everything a finished search produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_index: usize,
    pub best_params: ParamSet,
    pub best_score: f64,
    /// Best configuration refit on all training rows.
    pub best_pipeline: FittedPipeline,
    pub results: CvResults,
}

struct FoldOutcome {
    score: f64,
    fit_time: f64,
    score_time: f64,
    error: Option<String>,
}

impl GridSearch {
    pub fn new(entry: GridEntry, cv: usize, n_jobs: usize, seed: u64) -> Self {
        Self {
            entry,
            cv,
            n_jobs,
            seed,
        }
    }

    pub fn entry(&self) -> &GridEntry {
        &self.entry
    }

    pub fn fit(
        &self,
        x: ArrayView2<'_, f32>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let kind = self.entry.estimator_kind()?;
        let param_sets = self.entry.expand()?;
        let configs = param_sets
            .iter()
            .map(|params| PipelineConfig::from_params(kind, self.seed, params))
            .collect::<Result<Vec<_>, _>>()?;
        let folds = StratifiedKFold::new(self.cv)?.split(y)?;
        info!(
            estimator = kind.name(),
            candidates = configs.len(),
            folds = folds.len(),
            "starting grid search"
        );

        let jobs: Vec<(usize, usize)> = (0..configs.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs)
            .build()?;
        let outcomes: Vec<FoldOutcome> = pool.install(|| {
            jobs.par_iter()
                .map(|&(c, f)| evaluate_fold(&configs[c], &folds[f], x, y, n_classes))
                .collect()
        });

        let mut candidates = Vec::with_capacity(configs.len());
        let mut outcomes = outcomes.into_iter();
        for params in param_sets {
            let mut candidate = CandidateResult {
                params,
                split_scores: Vec::with_capacity(folds.len()),
                fit_times: Vec::with_capacity(folds.len()),
                score_times: Vec::with_capacity(folds.len()),
                error: None,
            };
            for outcome in outcomes.by_ref().take(folds.len()) {
                candidate.split_scores.push(outcome.score);
                candidate.fit_times.push(outcome.fit_time);
                candidate.score_times.push(outcome.score_time);
                if candidate.error.is_none() {
                    candidate.error = outcome.error;
                }
            }
            if let Some(error) = &candidate.error {
                warn!(params = ?candidate.params, %error, "configuration failed on at least one fold");
            }
            candidates.push(candidate);
        }
        let results = CvResults::new(folds.len(), candidates);

        let best_index = results.best_index().ok_or(SearchError::AllFailed {
            candidates: results.len(),
        })?;
        let best = &results.candidates[best_index];
        let best_score = best.mean_test_score();
        let best_params = best.params.clone();
        info!(score = best_score, params = ?best_params, "best configuration");

        let best_pipeline = configs[best_index].fit(x, y, n_classes)?;
        Ok(SearchOutcome {
            best_index,
            best_params,
            best_score,
            best_pipeline,
            results,
        })
    }
}

fn evaluate_fold(
    config: &PipelineConfig,
    fold: &TrainTestSplit,
    x: ArrayView2<'_, f32>,
    y: &[usize],
    n_classes: usize,
) -> FoldOutcome {
    let x_train = x.select(Axis(0), &fold.train);
    let y_train: Vec<usize> = fold.train.iter().map(|&i| y[i]).collect();
    let x_test = x.select(Axis(0), &fold.test);
    let y_test: Vec<usize> = fold.test.iter().map(|&i| y[i]).collect();

    let started = Instant::now();
    let fitted = config.fit(x_train.view(), &y_train, n_classes);
    let fit_time = started.elapsed().as_secs_f64();
    let started = Instant::now();
    let scored: Result<f64, FitError> = fitted.and_then(|pipeline| {
        let predicted = pipeline.predict(x_test.view())?;
        Ok(f1_weighted(n_classes, &y_test, &predicted))
    });
    let score_time = started.elapsed().as_secs_f64();
    match scored {
        Ok(score) => {
            debug!(score, fit_time, "fold scored");
            FoldOutcome {
                score,
                fit_time,
                score_time,
                error: None,
            }
        }
        Err(err) => FoldOutcome {
            score: f64::NAN,
            fit_time,
            score_time,
            error: Some(err.to_string()),
        },
    }
}
