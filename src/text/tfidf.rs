use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use ndarray::Array2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{TextError, TextFeatures};

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?u)\b\w\w+\b").expect("token regex must compile"));

/// TF-IDF settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfConfig {
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    /// Keep only the most frequent terms across the corpus.
    #[serde(default = "default_max_features")]
    pub max_features: Option<usize>,
    /// Minimum number of documents a term must appear in.
    #[serde(default = "default_min_df")]
    pub min_df: usize,
    /// Maximum share of documents a term may appear in.
    #[serde(default = "default_max_df")]
    pub max_df: f64,
}

fn default_ngram_min() -> usize {
    1
}

fn default_ngram_max() -> usize {
    2
}

fn default_max_features() -> Option<usize> {
    Some(256)
}

fn default_min_df() -> usize {
    2
}

fn default_max_df() -> f64 {
    0.8
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            max_features: default_max_features(),
            min_df: default_min_df(),
            max_df: default_max_df(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedVocabulary {
    /// Term to column, columns in alphabetical term order.
    terms: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

/// Word n-gram TF-IDF with smoothed idf and L2-normalized rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
    fitted: Option<FittedVocabulary>,
}

/// Lowercase, split on the token pattern and emit every n-gram in `min..=max`.
pub fn tokenize(document: &str, ngram_min: usize, ngram_max: usize) -> Vec<String> {
    let lowered = document.to_lowercase();
    let words: Vec<&str> = TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .collect();
    let mut out = Vec::new();
    for n in ngram_min.max(1)..=ngram_max.max(ngram_min) {
        if n > words.len() {
            break;
        }
        out.extend(words.windows(n).map(|w| w.join(" ")));
    }
    out
}

impl TfidfVectorizer {
    pub fn new(config: TfidfConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn vocabulary_len(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.terms.len())
    }

    fn tokens(&self, document: &str) -> Vec<String> {
        tokenize(document, self.config.ngram_min, self.config.ngram_max)
    }
}

impl TextFeatures for TfidfVectorizer {
    fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<(), TextError> {
        let n_docs = documents.len();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        for document in documents {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for token in self.tokens(document.as_ref()) {
                *seen.entry(token).or_default() += 1;
            }
            for (token, count) in seen {
                *term_freq.entry(token.clone()).or_default() += count;
                *doc_freq.entry(token).or_default() += 1;
            }
        }
        if doc_freq.is_empty() {
            return Err(TextError::EmptyVocabulary);
        }

        let max_docs = (self.config.max_df * n_docs as f64).floor() as usize;
        if max_docs < self.config.min_df {
            return Err(TextError::DocumentFrequencyConflict {
                min_df: self.config.min_df,
                max_docs,
            });
        }
        let mut kept: Vec<(String, usize)> = doc_freq
            .iter()
            .filter(|(_, df)| **df >= self.config.min_df && **df <= max_docs)
            .map(|(term, _)| (term.clone(), term_freq.get(term).copied().unwrap_or(0)))
            .collect();
        if kept.is_empty() {
            return Err(TextError::EmptyVocabulary);
        }
        if let Some(limit) = self.config.max_features {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            kept.truncate(limit);
        }
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        let n = n_docs as f32;
        let idf = kept
            .iter()
            .map(|(term, _)| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let terms = kept
            .into_iter()
            .enumerate()
            .map(|(idx, (term, _))| (term, idx))
            .collect();
        let fitted = FittedVocabulary { terms, idf };
        debug!(terms = fitted.terms.len(), documents = n_docs, "fitted tf-idf vocabulary");
        self.fitted = Some(fitted);
        Ok(())
    }

    fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f32>, TextError> {
        let fitted = self.fitted.as_ref().ok_or(TextError::NotFitted)?;
        let width = fitted.terms.len();
        let mut out = Array2::<f32>::zeros((documents.len(), width));
        for (row_idx, document) in documents.iter().enumerate() {
            let mut row = out.row_mut(row_idx);
            for token in self.tokens(document.as_ref()) {
                if let Some(&col) = fitted.terms.get(&token) {
                    row[col] += 1.0;
                }
            }
            for (v, idf) in row.iter_mut().zip(&fitted.idf) {
                *v *= idf;
            }
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.iter_mut().for_each(|v| *v /= norm);
            }
        }
        Ok(out)
    }

    fn feature_names(&self) -> Vec<String> {
        self.fitted
            .as_ref()
            .map(|f| f.terms.keys().map(|term| format!("tfidf_{term}")).collect())
            .unwrap_or_default()
    }
}
