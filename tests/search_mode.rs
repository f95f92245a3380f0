mod support;

use std::path::Path;

use support::configs::run_config;
use support::tables::write_groups;

use cohortfit::config::{ConfigError, RunConfig};
use cohortfit::model_bundle::ModelBundle;
use cohortfit::ml::params::ParamValue;
use cohortfit::pipeline::{NORMALIZATION_PARAM, SELECTION_PARAM};
use cohortfit::run::{CONFIG_LOG_FILE, RunError, RunMode, execute_with_grids, prepare};
use cohortfit::search::GridEntry;
use tempfile::TempDir;

fn small_extra_trees(widths: Vec<ParamValue>) -> GridEntry {
    GridEntry::new()
        .axis("estimator", ["extra_trees"])
        .axis("estimator__n_estimators", [4i64])
        .axis(NORMALIZATION_PARAM, ["standard", "minmax"])
        .axis(SELECTION_PARAM, widths)
}

fn workspace() -> (TempDir, RunConfig) {
    let temp = tempfile::tempdir().expect("create tempdir");
    let input = temp.path().join("input");
    std::fs::create_dir_all(&input).expect("create input dir");
    write_groups(&input, "pre", &[("alpha", 30), ("beta", 30)]);
    let config = run_config(&input, &temp.path().join("out"), &["alpha", "beta"]);
    (temp, config)
}

struct ResultsTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ResultsTable {
    fn read(path: &Path) -> Self {
        let mut reader = csv::Reader::from_path(path).expect("open results");
        let header = reader
            .headers()
            .expect("read header")
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .map(|record| record.expect("read row").iter().map(str::to_string).collect())
            .collect();
        Self { header, rows }
    }

    fn column(&self, name: &str) -> Vec<String> {
        let idx = self
            .header
            .iter()
            .position(|h| h == name)
            .unwrap_or_else(|| panic!("missing column {name}"));
        self.rows.iter().map(|row| row[idx].clone()).collect()
    }

    fn param_columns(&self) -> Vec<Vec<String>> {
        self.header
            .iter()
            .filter(|h| h.starts_with("param"))
            .map(|h| self.column(h))
            .collect()
    }
}

#[test]
fn search_writes_results_summary_and_model() {
    let (_temp, config) = workspace();
    let run_dir = prepare(&config).unwrap();
    let grid = small_extra_trees(vec![ParamValue::Int(1), ParamValue::from("all")]);

    let summary = execute_with_grids(&config, &run_dir, &[grid]).unwrap();
    assert_eq!(summary.mode, RunMode::Search);
    assert_eq!(summary.name, "ExtraTrees");

    let table = ResultsTable::read(&run_dir.join("ExtraTrees.csv"));
    assert_eq!(table.rows.len(), 4);
    for column in [
        "mean_fit_time",
        "param_feature_selection__k",
        "param_normalization",
        "params",
        "split0_test_score",
        "split2_test_score",
        "mean_test_score",
        "rank_test_score",
    ] {
        assert!(table.header.iter().any(|h| h == column), "missing {column}");
    }
    assert!(!table.header.iter().any(|h| h == "split3_test_score"));
    assert!(table.column("rank_test_score").iter().any(|r| r == "1"));

    let notes = std::fs::read_to_string(run_dir.join("ExtraTrees.txt")).unwrap();
    assert_eq!(notes.lines().filter(|line| line.starts_with("=====")).count(), 2);
    assert!(notes.contains("extra_trees"));

    let bundle = ModelBundle::load(&run_dir.join("ExtraTrees.json")).unwrap();
    assert_eq!(bundle.cv_score, Some(summary.score));
    assert_eq!(bundle.params, summary.params);

    let config_log = std::fs::read_to_string(run_dir.join(CONFIG_LOG_FILE)).unwrap();
    assert!(config_log.contains("'estimator': [extra_trees]"));
}

#[test]
fn configuration_columns_do_not_depend_on_the_seed() {
    let (_temp, mut config) = workspace();
    let grid = small_extra_trees(vec![ParamValue::Int(1), ParamValue::from("all")]);

    let mut tables = Vec::new();
    for seed in [7u64, 8] {
        config.seed = seed;
        let run_dir = prepare(&config).unwrap();
        execute_with_grids(&config, &run_dir, std::slice::from_ref(&grid)).unwrap();
        tables.push(ResultsTable::read(&run_dir.join("ExtraTrees.csv")));
    }

    assert_eq!(tables[0].header, tables[1].header);
    assert_eq!(tables[0].param_columns(), tables[1].param_columns());
}

#[test]
fn selection_wider_than_the_input_scores_nan_without_aborting() {
    let (_temp, config) = workspace();
    let run_dir = prepare(&config).unwrap();
    let grid = small_extra_trees(vec![ParamValue::Int(1), ParamValue::Int(500)])
        .axis(NORMALIZATION_PARAM, ["standard"]);

    let summary = execute_with_grids(&config, &run_dir, &[grid]).unwrap();
    assert_eq!(summary.params.get(SELECTION_PARAM), Some(&ParamValue::Int(1)));

    let table = ResultsTable::read(&run_dir.join("ExtraTrees.csv"));
    let widths = table.column("param_feature_selection__k");
    let means = table.column("mean_test_score");
    let ranks = table.column("rank_test_score");
    let errors = table.column("error");
    let wide = widths.iter().position(|w| w == "500").expect("row for k=500");
    let narrow = widths.iter().position(|w| w == "1").expect("row for k=1");
    assert_eq!(means[wide], "NaN");
    assert_eq!(ranks[wide], "2");
    assert!(!errors[wide].is_empty());
    assert_eq!(ranks[narrow], "1");
    assert!(errors[narrow].is_empty());
}

#[test]
fn out_of_range_grid_index_fails_before_loading_data() {
    let (_temp, mut config) = workspace();
    config.grid_index = 5;
    let run_dir = prepare(&config).unwrap();
    let grid = small_extra_trees(vec![ParamValue::from("all")]);

    let err = execute_with_grids(&config, &run_dir, &[grid]).unwrap_err();
    assert!(matches!(err, RunError::GridIndexOutOfRange { index: 5, len: 1 }));
    assert!(!run_dir.join(CONFIG_LOG_FILE).exists());
}

#[test]
fn sequence_model_families_are_rejected() {
    let (_temp, mut config) = workspace();
    config.model = "bi-lstm".to_string();
    let run_dir = prepare(&config).unwrap();
    let grid = small_extra_trees(vec![ParamValue::from("all")]);

    let err = execute_with_grids(&config, &run_dir, &[grid]).unwrap_err();
    assert!(matches!(
        err,
        RunError::Config(ConfigError::UnsupportedModel(model)) if model == "bi-lstm"
    ));
}
