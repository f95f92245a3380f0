use std::path::Path;

use cohortfit::config::{Phase, PIPELINE_MODEL, RunConfig};
use cohortfit::text::TfidfConfig;

/// A small, fast configuration over `groups` in the `pre` phase.
pub fn run_config(input_dir: &Path, output_dir: &Path, groups: &[&str]) -> RunConfig {
    RunConfig {
        input_dir: input_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        groups: groups.iter().map(|g| g.to_string()).collect(),
        phase: Phase::Pre,
        model: PIPELINE_MODEL.to_string(),
        run_version_number: 1,
        cv: 3,
        n_jobs: 2,
        seed: 7,
        test_fraction: 0.2,
        subsample: None,
        per_group_sample: None,
        include_over_n: 0,
        first_day: None,
        last_day: None,
        grid_index: 0,
        run_final_model: false,
        tfidf: TfidfConfig {
            max_features: Some(16),
            ..TfidfConfig::default()
        },
    }
}
