//! Text-derived features appended to the structured feature matrix.
//!
//! A transform is fitted on training documents only; held-out documents go through
//! `transform` with the training vocabulary and weights.

mod tfidf;

pub use tfidf::{TfidfConfig, TfidfVectorizer, tokenize};

use ndarray::{Array2, ArrayView2, Axis, ShapeError, concatenate};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TextError {
    #[error("text transform used before fit")]
    NotFitted,
    #[error("no terms remain after document-frequency pruning")]
    EmptyVocabulary,
    #[error("max_df keeps at most {max_docs} documents, fewer than min_df = {min_df}")]
    DocumentFrequencyConflict { min_df: usize, max_docs: usize },
}

/// Learned mapping from documents to a fixed number of numeric columns.
pub trait TextFeatures {
    fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<(), TextError>;

    /// `(documents.len(), feature_names().len())` matrix.
    fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f32>, TextError>;

    fn feature_names(&self) -> Vec<String>;

    fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<Array2<f32>, TextError> {
        self.fit(documents)?;
        self.transform(documents)
    }
}

/// `[structured | text]`, row-aligned.
pub fn augment(
    structured: ArrayView2<'_, f32>,
    text: ArrayView2<'_, f32>,
) -> Result<Array2<f32>, ShapeError> {
    concatenate(Axis(1), &[structured.view(), text.view()])
}
