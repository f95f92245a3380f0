mod support;

use support::tables::{write_group_table, write_groups};

use cohortfit::dataset::{
    AssemblyOptions, DatasetError, LabelEncoder, Subsample, assemble, load_groups,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn names(groups: &[&str]) -> Vec<String> {
    groups.iter().map(|g| g.to_string()).collect()
}

#[test]
fn groups_at_or_below_threshold_are_dropped_whole() {
    let temp = tempfile::tempdir().expect("create tempdir");
    write_groups(temp.path(), "pre", &[("alpha", 100), ("beta", 100), ("gamma", 5)]);
    let groups = names(&["alpha", "beta", "gamma"]);
    let mut rng = StdRng::seed_from_u64(1);

    let tables = load_groups(temp.path(), &groups, "pre", None, &mut rng).unwrap();
    let options = AssemblyOptions {
        include_over_n: 10,
        ..AssemblyOptions::default()
    };
    let dataset = assemble(tables, &groups, &options, &mut rng).unwrap();

    assert_eq!(dataset.n_rows(), 200);
    assert_eq!(dataset.groups, names(&["alpha", "beta"]));
    assert!(dataset.labels.iter().all(|label| label != "gamma"));
    assert_eq!(
        dataset.group_counts,
        vec![
            ("alpha".to_string(), 100),
            ("beta".to_string(), 100),
            ("gamma".to_string(), 5)
        ]
    );
    assert_eq!(dataset.features.nrows(), dataset.documents.len());
    assert_eq!(dataset.feature_names, names(&["signal", "has_link"]));
}

#[test]
fn row_count_matches_subsampled_group_sizes() {
    let temp = tempfile::tempdir().expect("create tempdir");
    write_groups(temp.path(), "pre", &[("alpha", 60), ("beta", 40), ("gamma", 12)]);
    let groups = names(&["alpha", "beta", "gamma"]);
    let subsample = Subsample {
        fraction: 0.5,
        over_n: 20,
    };
    let mut rng = StdRng::seed_from_u64(3);

    let tables = load_groups(temp.path(), &groups, "pre", Some(&subsample), &mut rng).unwrap();
    let sizes: Vec<usize> = tables.iter().map(|t| t.rows.len()).collect();
    assert_eq!(sizes, vec![30, 20, 12]);

    let dataset = assemble(tables, &groups, &AssemblyOptions::default(), &mut rng).unwrap();
    assert_eq!(dataset.n_rows(), 62);
}

#[test]
fn rows_are_grouped_and_labels_round_trip() {
    let temp = tempfile::tempdir().expect("create tempdir");
    write_groups(temp.path(), "pre", &[("alpha", 12), ("beta", 8)]);
    let groups = names(&["beta", "alpha"]);
    let mut rng = StdRng::seed_from_u64(5);

    let tables = load_groups(temp.path(), &groups, "pre", None, &mut rng).unwrap();
    let dataset = assemble(tables, &groups, &AssemblyOptions::default(), &mut rng).unwrap();

    assert!(dataset.labels[..8].iter().all(|l| l == "beta"));
    assert!(dataset.labels[8..].iter().all(|l| l == "alpha"));
    let beta_dates = &dataset.dates[..8];
    assert!(beta_dates.windows(2).all(|w| w[0] <= w[1]));
    assert!(dataset.documents.iter().all(|d| !d.contains("  ") && !d.contains('\u{201c}')));

    let encoder = LabelEncoder::fit(&dataset.labels);
    let encoded = encoder.encode(&dataset.labels).unwrap();
    let decoded: Vec<&str> = encoded.iter().filter_map(|&c| encoder.decode(c)).collect();
    assert_eq!(decoded, dataset.labels);
}

#[test]
fn date_window_and_exact_sampling_apply_together() {
    let temp = tempfile::tempdir().expect("create tempdir");
    write_groups(temp.path(), "pre", &[("alpha", 40), ("beta", 40)]);
    let groups = names(&["alpha", "beta"]);
    let mut rng = StdRng::seed_from_u64(9);

    let tables = load_groups(temp.path(), &groups, "pre", None, &mut rng).unwrap();
    let options = AssemblyOptions {
        first_day: Some("2020/01/03".to_string()),
        last_day: Some("2020/01/07".to_string()),
        per_group_sample: Some(10),
        include_over_n: 0,
    };
    let dataset = assemble(tables, &groups, &options, &mut rng).unwrap();

    assert_eq!(dataset.n_rows(), 20);
    assert!(
        dataset
            .dates
            .iter()
            .all(|d| d.as_str() >= "2020/01/03" && d.as_str() <= "2020/01/07")
    );
}

#[test]
fn missing_group_table_names_the_group() {
    let temp = tempfile::tempdir().expect("create tempdir");
    write_group_table(temp.path(), "alpha", "pre", 5, 0.0);
    let groups = names(&["alpha", "beta"]);
    let mut rng = StdRng::seed_from_u64(1);

    let err = load_groups(temp.path(), &groups, "pre", None, &mut rng).unwrap_err();
    assert!(matches!(err, DatasetError::MissingGroupFile { group, .. } if group == "beta"));
}

#[test]
fn requesting_more_rows_than_a_group_has_fails() {
    let temp = tempfile::tempdir().expect("create tempdir");
    write_groups(temp.path(), "pre", &[("alpha", 6), ("beta", 20)]);
    let groups = names(&["alpha", "beta"]);
    let mut rng = StdRng::seed_from_u64(1);

    let tables = load_groups(temp.path(), &groups, "pre", None, &mut rng).unwrap();
    let options = AssemblyOptions {
        per_group_sample: Some(10),
        ..AssemblyOptions::default()
    };
    let err = assemble(tables, &groups, &options, &mut rng).unwrap_err();
    assert!(matches!(
        err,
        DatasetError::InsufficientRows { group, requested: 10, available: 6 } if group == "alpha"
    ));
}
