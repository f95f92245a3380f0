mod support;

use support::configs::run_config;
use support::tables::write_groups;

use cohortfit::config::Phase;
use cohortfit::dataset::{AssemblyOptions, assemble, load_groups, train_test_split};
use cohortfit::inference::evaluate_bundle;
use cohortfit::ml::params::ParamValue;
use cohortfit::model_bundle::ModelBundle;
use cohortfit::pipeline::{NORMALIZATION_PARAM, SELECTION_PARAM};
use cohortfit::report::{ACCURACY_ROW, MACRO_ROW, ReportRow, WEIGHTED_ROW};
use cohortfit::run::{CONFIG_LOG_FILE, RunError, RunMode, execute, execute_with_grids, prepare};
use cohortfit::search::GridEntry;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn fixed_extra_trees() -> GridEntry {
    GridEntry::new()
        .axis("estimator", ["extra_trees"])
        .axis(NORMALIZATION_PARAM, ["standard"])
        .axis("estimator__n_estimators", [8i64])
        .axis("estimator__max_depth", [ParamValue::None])
        .axis(SELECTION_PARAM, ["all"])
}

/// A seed whose held-out rows cover both halves of a 20-row, two-group dataset.
fn seed_with_both_classes_in_test() -> u64 {
    (0..1_000u64)
        .find(|&seed| {
            let split = train_test_split(20, 0.2, seed).expect("split");
            split.test.iter().any(|&i| i < 10) && split.test.iter().any(|&i| i >= 10)
        })
        .expect("some seed mixes both groups")
}

fn read_report(path: &std::path::Path) -> Vec<ReportRow> {
    let mut reader = csv::Reader::from_path(path).expect("open report");
    reader
        .deserialize()
        .collect::<Result<Vec<ReportRow>, _>>()
        .expect("parse report")
}

#[test]
fn final_fit_writes_report_with_class_and_aggregate_rows() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let input = temp.path().join("input");
    std::fs::create_dir_all(&input).expect("create input dir");
    write_groups(&input, "pre", &[("alpha", 10), ("beta", 10)]);

    let mut config = run_config(&input, &temp.path().join("out"), &["alpha", "beta"]);
    config.run_final_model = true;
    config.seed = seed_with_both_classes_in_test();
    let run_dir = prepare(&config).unwrap();
    assert!(
        run_dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("run_final_model_v1_model0_"))
    );

    let summary = execute_with_grids(&config, &run_dir, &[fixed_extra_trees()]).unwrap();
    assert_eq!(summary.mode, RunMode::Final);
    assert_eq!(summary.name, "ExtraTrees");
    assert!((0.0..=1.0).contains(&summary.score));

    let rows = read_report(&run_dir.join("report_ExtraTrees.csv"));
    let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["alpha", "beta", ACCURACY_ROW, MACRO_ROW, WEIGHTED_ROW]);
    let class_support: u64 = rows[..2].iter().map(|r| r.support).sum();
    assert_eq!(class_support, 4);
    assert_eq!(rows[2].support, 4);
    assert_eq!(rows[3].support, 4);
    assert_eq!(rows[4].support, 4);

    let latex = std::fs::read_to_string(run_dir.join("report_latex_ExtraTrees.tex")).unwrap();
    assert!(latex.contains("\\begin{tabular}"));
    assert!(latex.contains("weighted avg"));

    let params = std::fs::read_to_string(run_dir.join("ExtraTrees_params.txt")).unwrap();
    assert!(params.contains("\"estimator\""));
    assert!(params.contains("extra_trees"));

    let config_log = std::fs::read_to_string(run_dir.join(CONFIG_LOG_FILE)).unwrap();
    assert!(config_log.starts_with("[\"alpha\", \"beta\"]\n"));

    let bundle = ModelBundle::load(&run_dir.join("ExtraTrees.json")).unwrap();
    assert_eq!(bundle.classes.classes(), ["alpha", "beta"]);
    assert_eq!(bundle.cv_score, None);
    assert!(summary.artifacts.iter().all(|path| path.is_file()));
}

#[test]
fn final_mode_rejects_grids_with_several_configurations() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let input = temp.path().join("input");
    std::fs::create_dir_all(&input).expect("create input dir");
    write_groups(&input, "pre", &[("alpha", 10), ("beta", 10)]);

    let mut config = run_config(&input, &temp.path().join("out"), &["alpha", "beta"]);
    config.run_final_model = true;
    let run_dir = prepare(&config).unwrap();
    let grid = fixed_extra_trees().axis("estimator__n_estimators", [4i64, 8]);

    let err = execute_with_grids(&config, &run_dir, &[grid]).unwrap_err();
    assert!(matches!(
        err,
        RunError::FinalGridNotFixed {
            index: 0,
            configurations: 2
        }
    ));
}

#[test]
fn built_in_final_grid_trains_and_scores_another_phase() {
    let temp = tempfile::tempdir().expect("create tempdir");
    let input = temp.path().join("input");
    std::fs::create_dir_all(&input).expect("create input dir");
    write_groups(&input, "pre", &[("alpha", 30), ("beta", 30)]);
    write_groups(&input, "post", &[("alpha", 12), ("beta", 12)]);

    let mut config = run_config(&input, &temp.path().join("out"), &["alpha", "beta"]);
    config.run_final_model = true;
    config.grid_index = 2;
    let run_dir = prepare(&config).unwrap();
    let summary = execute(&config, &run_dir).unwrap();
    assert_eq!(summary.name, "ExtraTrees");
    assert!(summary.score > 0.9, "accuracy {}", summary.score);

    let bundle = ModelBundle::load(&run_dir.join("ExtraTrees.json")).unwrap();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let tables = load_groups(
        &input,
        &config.groups,
        Phase::Post.as_str(),
        None,
        &mut rng,
    )
    .unwrap();
    let dataset = assemble(tables, &config.groups, &AssemblyOptions::default(), &mut rng).unwrap();
    let evaluation = evaluate_bundle(&bundle, &dataset).unwrap();

    assert!(evaluation.probabilistic);
    assert_eq!(evaluation.report.row(ACCURACY_ROW).map(|r| r.support), Some(24));
    let posts: usize = evaluation.daily.iter().map(|d| d.posts).sum();
    assert_eq!(posts, 24);
    assert_eq!(evaluation.daily.first().map(|d| d.group.as_str()), Some("alpha"));
}
