//! Persisted model: fitted pipeline plus everything needed to rebuild its input.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{AssembledDataset, LabelEncoder};
use crate::ml::params::ParamSet;
use crate::pipeline::FittedPipeline;
use crate::text::{TextError, TextFeatures, TfidfVectorizer, augment};

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read model {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write model {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid model json {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unsupported model format version {found} (expected {})", BUNDLE_FORMAT_VERSION)]
    FormatVersion { found: u32 },
    #[error("model expects {expected} input columns but its feature layout yields {found}")]
    InputWidth { expected: usize, found: usize },
    #[error("dataset has no structured feature column `{0}`")]
    MissingFeature(String),
    #[error(transparent)]
    Text(#[from] TextError),
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A trained pipeline with its label classes, structured column layout and the
/// text transform fitted on the same training rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    /// Estimator artifact name, e.g. `ExtraTrees`.
    pub name: String,
    pub classes: LabelEncoder,
    pub structured_features: Vec<String>,
    pub text: TfidfVectorizer,
    pub pipeline: FittedPipeline,
    pub params: ParamSet,
    /// Mean cross-validated score when the bundle came out of a search.
    #[serde(default)]
    pub cv_score: Option<f64>,
}

impl ModelBundle {
    pub fn new(
        name: &str,
        classes: LabelEncoder,
        structured_features: Vec<String>,
        text: TfidfVectorizer,
        pipeline: FittedPipeline,
        params: ParamSet,
    ) -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION,
            name: name.to_string(),
            classes,
            structured_features,
            text,
            pipeline,
            params,
            cv_score: None,
        }
    }

    pub fn with_cv_score(mut self, score: f64) -> Self {
        self.cv_score = Some(score);
        self
    }

    pub fn save(&self, path: &Path) -> Result<(), BundleError> {
        let data = serde_json::to_vec_pretty(self).map_err(|source| BundleError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, data).map_err(|source| BundleError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let data = std::fs::read(path).map_err(|source| BundleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let bundle: Self = serde_json::from_slice(&data).map_err(|source| BundleError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        bundle.validate()?;
        Ok(bundle)
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(BundleError::FormatVersion {
                found: self.format_version,
            });
        }
        let found = self.structured_features.len() + self.text.vocabulary_len();
        let expected = self.pipeline.n_features_in();
        if found != expected {
            return Err(BundleError::InputWidth { expected, found });
        }
        Ok(())
    }

    /// Pipeline input for every row of `dataset`: structured columns in training
    /// order, then the stored text transform.
    pub fn feature_matrix(&self, dataset: &AssembledDataset) -> Result<Array2<f32>, BundleError> {
        let columns = self
            .structured_features
            .iter()
            .map(|name| {
                dataset
                    .feature_names
                    .iter()
                    .position(|candidate| candidate == name)
                    .ok_or_else(|| BundleError::MissingFeature(name.clone()))
            })
            .collect::<Result<Vec<usize>, _>>()?;
        let structured = dataset.features.select(Axis(1), &columns);
        let text = self.text.transform(&dataset.documents)?;
        Ok(augment(structured.view(), text.view())?)
    }
}
