//! One experiment run: assemble, split, augment, then search or final fit, and
//! persist every artifact into the run directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, RunConfig};
use crate::dataset::{
    AssembledDataset, DatasetError, LabelEncoder, SplitError, assemble, load_groups,
    train_test_split,
};
use crate::ml::estimator::FitError;
use crate::ml::metrics::f1_weighted;
use crate::ml::params::{ParamError, ParamSet};
use crate::model_bundle::{BundleError, ModelBundle};
use crate::pipeline::PipelineConfig;
use crate::report::{ClassificationReport, ReportError};
use crate::run_dirs::{self, RunDirError};
use crate::search::{GridEntry, GridSearch, SearchError, final_grids, search_grids};
use crate::text::{TextError, TextFeatures, TfidfVectorizer, augment};

pub const CONFIG_LOG_FILE: &str = "config.txt";
const SEPARATOR: &str = "=======================================================";

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    RunDir(#[from] RunDirError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("train/test split failed: {0}")]
    Split(#[from] SplitError),
    #[error("text features failed: {0}")]
    Text(#[from] TextError),
    #[error("invalid grid: {0}")]
    Param(#[from] ParamError),
    #[error("fit failed: {0}")]
    Fit(#[from] FitError),
    #[error("grid search failed: {0}")]
    Search(#[from] SearchError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("grid index {index} is out of range: {len} grids are defined")]
    GridIndexOutOfRange { index: usize, len: usize },
    #[error("final grid {index} expands to {configurations} configurations; exactly one is required")]
    FinalGridNotFixed { index: usize, configurations: usize },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Search,
    Final,
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub mode: RunMode,
    /// Estimator artifact name.
    pub name: String,
    pub groups: Vec<String>,
    pub params: ParamSet,
    /// Best mean cross-validated score in search mode, test accuracy in final mode.
    pub score: f64,
    /// Weighted F1 of the persisted model on the held-out split.
    pub test_f1: f64,
    pub artifacts: Vec<PathBuf>,
}

/// Create the timestamped run directory for `config`.
pub fn prepare(config: &RunConfig) -> Result<PathBuf, RunError> {
    Ok(run_dirs::prepare_run_dir(&config.output_dir, &config.run_name())?)
}

/// Run with the built-in grid list of the configured mode.
pub fn execute(config: &RunConfig, run_dir: &Path) -> Result<RunSummary, RunError> {
    let grids = if config.run_final_model {
        final_grids()
    } else {
        search_grids()
    };
    execute_with_grids(config, run_dir, &grids)
}

pub fn execute_with_grids(
    config: &RunConfig,
    run_dir: &Path,
    grids: &[GridEntry],
) -> Result<RunSummary, RunError> {
    config.validate()?;
    let entry = grids
        .get(config.grid_index)
        .ok_or(RunError::GridIndexOutOfRange {
            index: config.grid_index,
            len: grids.len(),
        })?;
    let kind = entry.estimator_kind()?;
    let param_sets = entry.expand()?;
    if config.run_final_model && param_sets.len() != 1 {
        return Err(RunError::FinalGridNotFixed {
            index: config.grid_index,
            configurations: param_sets.len(),
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let tables = load_groups(
        &config.input_dir,
        &config.groups,
        config.phase.as_str(),
        config.subsample.as_ref(),
        &mut rng,
    )?;
    let dataset = assemble(tables, &config.groups, &config.assembly_options(), &mut rng)?;
    append_text(
        &run_dir.join(CONFIG_LOG_FILE),
        &format!("{:?}\n{}\n", dataset.groups, grid_list(grids)),
    )?;

    let prepared = prepare_matrices(config, &dataset)?;
    let name = kind.name();
    let mut artifacts = Vec::new();
    let n_classes = prepared.classes.n_classes();

    let (params, pipeline, score, cv_score) = if config.run_final_model {
        let params = param_sets.into_iter().next().unwrap_or_default();
        let pipeline = PipelineConfig::from_params(kind, config.seed, &params)?
            .fit(prepared.x_train.view(), &prepared.y_train, n_classes)?;
        let predicted = pipeline.predict(prepared.x_test.view())?;
        let report = ClassificationReport::from_predictions(
            prepared.classes.classes(),
            &prepared.y_test,
            &predicted,
        );
        info!("classification report for {name}\n{}", report.render_text());

        let csv_path = run_dir.join(format!("report_{name}.csv"));
        report.write_csv(&csv_path)?;
        let tex_path = run_dir.join(format!("report_latex_{name}.tex"));
        report.write_latex(&tex_path)?;
        let params_path = run_dir.join(format!("{name}_params.txt"));
        append_text(&params_path, &format!("{}\n", params_json(&params)))?;
        artifacts.extend([csv_path, tex_path, params_path]);
        (params, pipeline, report.accuracy(), None)
    } else {
        let outcome = GridSearch::new(entry.clone(), config.cv, config.n_jobs, config.seed).fit(
            prepared.x_train.view(),
            &prepared.y_train,
            n_classes,
        )?;
        let csv_path = run_dir.join(format!("{name}.csv"));
        outcome
            .results
            .write_csv(&csv_path)
            .map_err(|source| RunError::Csv {
                path: csv_path.clone(),
                source,
            })?;
        let txt_path = run_dir.join(format!("{name}.txt"));
        append_text(
            &txt_path,
            &format!(
                "\n{SEPARATOR}\n{}\n{}\n{}\n{SEPARATOR}\n",
                outcome.best_pipeline.describe(),
                params_json(&outcome.best_params),
                round4(outcome.best_score)
            ),
        )?;
        artifacts.extend([csv_path, txt_path]);
        (
            outcome.best_params,
            outcome.best_pipeline,
            outcome.best_score,
            Some(outcome.best_score),
        )
    };

    let predicted = pipeline.predict(prepared.x_test.view())?;
    let test_f1 = f1_weighted(n_classes, &prepared.y_test, &predicted);
    info!(model = name, score, test_f1, "run finished");

    let mut bundle = ModelBundle::new(
        name,
        prepared.classes,
        dataset.feature_names.clone(),
        prepared.text,
        pipeline,
        params.clone(),
    );
    if let Some(cv_score) = cv_score {
        bundle = bundle.with_cv_score(cv_score);
    }
    let bundle_path = run_dir.join(format!("{name}.json"));
    bundle.save(&bundle_path)?;
    artifacts.push(bundle_path);

    Ok(RunSummary {
        run_dir: run_dir.to_path_buf(),
        mode: if config.run_final_model {
            RunMode::Final
        } else {
            RunMode::Search
        },
        name: name.to_string(),
        groups: dataset.groups.clone(),
        params,
        score,
        test_f1,
        artifacts,
    })
}

/// Training and held-out matrices built from one split.
struct PreparedData {
    classes: LabelEncoder,
    text: TfidfVectorizer,
    x_train: Array2<f32>,
    y_train: Vec<usize>,
    x_test: Array2<f32>,
    y_test: Vec<usize>,
}

/// Split rows, fit the text transform on training documents only, then append
/// text columns to the structured features of both splits.
fn prepare_matrices(config: &RunConfig, dataset: &AssembledDataset) -> Result<PreparedData, RunError> {
    let classes = LabelEncoder::fit(&dataset.labels);
    let y = classes.encode(&dataset.labels)?;
    let split = train_test_split(dataset.n_rows(), config.test_fraction, config.seed)?;

    let mut text = TfidfVectorizer::new(config.tfidf.clone());
    let train_docs = dataset.documents_for(&split.train);
    let text_train = text.fit_transform(&train_docs)?;
    let text_test = text.transform(&dataset.documents_for(&split.test))?;

    let x_train = augment(dataset.features_for(&split.train).view(), text_train.view())?;
    let x_test = augment(dataset.features_for(&split.test).view(), text_test.view())?;
    info!(
        train = split.train.len(),
        test = split.test.len(),
        structured = dataset.feature_names.len(),
        text = text.vocabulary_len(),
        classes = classes.n_classes(),
        "prepared feature matrices"
    );
    Ok(PreparedData {
        y_train: split.train.iter().map(|&i| y[i]).collect(),
        y_test: split.test.iter().map(|&i| y[i]).collect(),
        classes,
        text,
        x_train,
        x_test,
    })
}

fn grid_list(grids: &[GridEntry]) -> String {
    let entries: Vec<String> = grids.iter().map(ToString::to_string).collect();
    format!("[{}]", entries.join(", "))
}

fn params_json(params: &ParamSet) -> String {
    serde_json::to_string(params).unwrap_or_default()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn append_text(path: &Path, text: &str) -> Result<(), RunError> {
    let io_err = |source| RunError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    file.write_all(text.as_bytes()).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_round_to_four_digits() {
        assert_eq!(round4(0.834_567), 0.8346);
        assert_eq!(round4(0.85), 0.85);
    }

    #[test]
    fn appends_rather_than_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        append_text(&path, "one\n").unwrap();
        append_text(&path, "two\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn grid_list_is_bracketed() {
        let grids = vec![GridEntry::new().axis("estimator", ["extra_trees"])];
        assert_eq!(grid_list(&grids), "[{'estimator': [extra_trees]}]");
    }
}
