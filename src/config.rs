//! Run configuration loaded from a TOML file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{AssemblyOptions, Subsample};
use crate::text::TfidfConfig;

/// Model families that need sequence models; not supported by this pipeline.
pub const SEQUENCE_MODELS: [&str; 4] = ["lstm", "gru", "bi-lstm", "bi-gru"];
/// The only supported `model` value: the normalization/selection/estimator pipeline.
pub const PIPELINE_MODEL: &str = "pipeline";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("unsupported model family `{0}`")]
    UnsupportedModel(String),
}

/// Feature-table phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Pre => "pre",
            Phase::Post => "post",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pre" => Ok(Phase::Pre),
            "post" => Ok(Phase::Post),
            other => Err(ConfigError::Invalid(format!(
                "phase must be `pre` or `post`, got `{other}`"
            ))),
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding `{group}_{phase}_features.csv` tables.
    pub input_dir: PathBuf,
    /// Parent of the per-run output directory.
    pub output_dir: PathBuf,
    pub groups: Vec<String>,
    #[serde(default = "default_phase")]
    pub phase: Phase,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_run_version_number")]
    pub run_version_number: u32,
    /// Cross-validation folds.
    #[serde(default = "default_cv")]
    pub cv: usize,
    /// Search worker threads; 0 uses every core.
    #[serde(default)]
    pub n_jobs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Fractional subsampling of large groups while loading.
    #[serde(default)]
    pub subsample: Option<Subsample>,
    /// Draw exactly this many rows per included group.
    #[serde(default)]
    pub per_group_sample: Option<usize>,
    /// Keep only groups with more than this many rows; 0 keeps every group.
    #[serde(default)]
    pub include_over_n: usize,
    #[serde(default)]
    pub first_day: Option<String>,
    #[serde(default)]
    pub last_day: Option<String>,
    /// Index into the grid list of the selected mode.
    #[serde(default)]
    pub grid_index: usize,
    #[serde(default)]
    pub run_final_model: bool,
    #[serde(default)]
    pub tfidf: TfidfConfig,
}

fn default_phase() -> Phase {
    Phase::Pre
}

fn default_model() -> String {
    PIPELINE_MODEL.to_string()
}

fn default_run_version_number() -> u32 {
    1
}

fn default_cv() -> usize {
    5
}

fn default_seed() -> u64 {
    1234
}

fn default_test_fraction() -> f64 {
    0.2
}

impl RunConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = self.model.to_ascii_lowercase();
        if SEQUENCE_MODELS.contains(&model.as_str()) {
            return Err(ConfigError::UnsupportedModel(self.model.clone()));
        }
        if model != PIPELINE_MODEL {
            return Err(ConfigError::Invalid(format!(
                "model must be `{PIPELINE_MODEL}`, got `{}`",
                self.model
            )));
        }
        if self.groups.is_empty() {
            return Err(ConfigError::Invalid("groups must not be empty".to_string()));
        }
        if let Some(dup) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(i, g)| self.groups[..i].contains(g).then_some(g))
        {
            return Err(ConfigError::Invalid(format!("group `{dup}` listed twice")));
        }
        if self.cv < 2 {
            return Err(ConfigError::Invalid(format!(
                "cv must be at least 2, got {}",
                self.cv
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if let Some(subsample) = &self.subsample
            && !(subsample.fraction > 0.0 && subsample.fraction <= 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "subsample.fraction must be in (0, 1], got {}",
                subsample.fraction
            )));
        }
        if self.per_group_sample == Some(0) {
            return Err(ConfigError::Invalid(
                "per_group_sample must be positive".to_string(),
            ));
        }
        if let (Some(first), Some(last)) = (&self.first_day, &self.last_day)
            && first > last
        {
            return Err(ConfigError::Invalid(format!(
                "first_day {first} is after last_day {last}"
            )));
        }
        let tfidf = &self.tfidf;
        if tfidf.ngram_min == 0 || tfidf.ngram_min > tfidf.ngram_max {
            return Err(ConfigError::Invalid(format!(
                "tfidf ngram range {}..={} is empty",
                tfidf.ngram_min, tfidf.ngram_max
            )));
        }
        if !(tfidf.max_df > 0.0 && tfidf.max_df <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "tfidf.max_df must be in (0, 1], got {}",
                tfidf.max_df
            )));
        }
        Ok(())
    }

    /// Name of the per-run output directory, without the timestamp suffix.
    pub fn run_name(&self) -> String {
        let mode = if self.run_final_model {
            "run_final_model"
        } else {
            "run_gridsearch"
        };
        format!(
            "{mode}_v{}_model{}",
            self.run_version_number, self.grid_index
        )
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            first_day: self.first_day.clone(),
            last_day: self.last_day.clone(),
            include_over_n: self.include_over_n,
            per_group_sample: self.per_group_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
input_dir = "data/features"
output_dir = "runs"
groups = ["adhd", "anxiety"]
"#;

    fn parse(text: &str) -> RunConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let config = parse(MINIMAL);
        assert_eq!(config.phase, Phase::Pre);
        assert_eq!(config.cv, 5);
        assert_eq!(config.seed, 1234);
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.tfidf, TfidfConfig::default());
        assert!(!config.run_final_model);
        assert_eq!(config.run_name(), "run_gridsearch_v1_model0");
        config.validate().unwrap();
    }

    #[test]
    fn sequence_models_are_rejected() {
        let config = parse(&format!("{MINIMAL}model = \"bi-lstm\"\n"));
        assert!(matches!(config.validate(), Err(ConfigError::UnsupportedModel(m)) if m == "bi-lstm"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = parse(MINIMAL);
        config.cv = 1;
        assert!(config.validate().is_err());
        let mut config = parse(MINIMAL);
        config.groups.clear();
        assert!(config.validate().is_err());
        let mut config = parse(MINIMAL);
        config.groups.push("adhd".into());
        assert!(config.validate().is_err());
        let mut config = parse(MINIMAL);
        config.test_fraction = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "groups = 3").unwrap();
        match RunConfig::load(&path) {
            Err(ConfigError::ParseToml { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn nested_tables_parse() {
        let config = parse(&format!(
            "{MINIMAL}run_final_model = true\ngrid_index = 2\n[subsample]\nfraction = 0.5\nover_n = 100\n[tfidf]\nmax_features = 64\n"
        ));
        assert_eq!(config.subsample.map(|s| s.over_n), Some(100));
        assert_eq!(config.tfidf.max_features, Some(64));
        assert_eq!(config.tfidf.min_df, 2);
        assert_eq!(config.run_name(), "run_final_model_v1_model2");
        assert_eq!("post".parse::<Phase>().unwrap(), Phase::Post);
    }
}
