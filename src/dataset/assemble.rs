//! Merge group tables into one labeled dataset.

use std::collections::HashMap;

use ndarray::{Array2, Axis};
use rand::Rng;
use rand::seq::index::sample;
use tracing::info;

use super::DatasetError;
use super::loader::{GroupRow, GroupTable};

/// Filters applied while merging group tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblyOptions {
    /// Inclusive lower date bound.
    pub first_day: Option<String>,
    /// Inclusive upper date bound.
    pub last_day: Option<String>,
    /// When non-zero, groups with at most this many rows in range are dropped.
    pub include_over_n: usize,
    /// Draw exactly this many rows from every included group.
    pub per_group_sample: Option<usize>,
}

/// Unified dataset: aligned features, documents and labels.
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    pub feature_names: Vec<String>,
    /// `(n_rows, n_features)` structured features.
    pub features: Array2<f32>,
    pub documents: Vec<String>,
    pub labels: Vec<String>,
    pub dates: Vec<String>,
    /// Included groups, in request order.
    pub groups: Vec<String>,
    /// Rows per requested group inside the date range, before exclusion.
    pub group_counts: Vec<(String, usize)>,
}

impl AssembledDataset {
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn features_for(&self, indices: &[usize]) -> Array2<f32> {
        self.features.select(Axis(0), indices)
    }

    pub fn documents_for(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().map(|&i| self.documents[i].as_str()).collect()
    }

    pub fn labels_for(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().map(|&i| self.labels[i].as_str()).collect()
    }
}

/// Collects row batches into one flat buffer, shaped once at the end.
#[derive(Debug)]
pub struct RowBatchBuilder {
    n_features: usize,
    values: Vec<f32>,
    documents: Vec<String>,
    labels: Vec<String>,
    dates: Vec<String>,
}

impl RowBatchBuilder {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            values: Vec::new(),
            documents: Vec::new(),
            labels: Vec::new(),
            dates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn push(&mut self, row: GroupRow) {
        debug_assert_eq!(row.features.len(), self.n_features);
        self.values.extend_from_slice(&row.features);
        self.documents.push(clean_document(&row.document));
        self.labels.push(row.label);
        self.dates.push(row.date);
    }

    pub fn finish(
        self,
        feature_names: Vec<String>,
        groups: Vec<String>,
        group_counts: Vec<(String, usize)>,
    ) -> Result<AssembledDataset, DatasetError> {
        let features = Array2::from_shape_vec((self.labels.len(), self.n_features), self.values)?;
        Ok(AssembledDataset {
            feature_names,
            features,
            documents: self.documents,
            labels: self.labels,
            dates: self.dates,
            groups,
            group_counts,
        })
    }
}

/// Collapse paragraph breaks and double spaces; drop curly double quotes.
pub fn clean_document(document: &str) -> String {
    document
        .replace("\n\n", " ")
        .replace("  ", " ")
        .replace(['\u{201c}', '\u{201d}'], "")
}

/// Merge `tables` into one dataset, keeping only rows whose label is in `groups`.
///
/// Rows come out grouped by label in `groups` order; within a group they are sorted by
/// date (stable).
pub fn assemble<R: Rng + ?Sized>(
    tables: Vec<GroupTable>,
    groups: &[String],
    options: &AssemblyOptions,
    rng: &mut R,
) -> Result<AssembledDataset, DatasetError> {
    let Some(first) = tables.first() else {
        return Err(DatasetError::InsufficientData(
            "no group tables to assemble".to_string(),
        ));
    };
    let feature_names = first.feature_names.clone();
    let first_group = first.group.clone();

    let mut rows: Vec<GroupRow> = Vec::new();
    for table in tables {
        let remap = column_remap(&feature_names, &table.feature_names).ok_or_else(|| {
            DatasetError::ColumnMismatch {
                group: table.group.clone(),
                expected_group: first_group.clone(),
            }
        })?;
        rows.extend(table.rows.into_iter().map(|mut row| {
            if let Some(remap) = &remap {
                row.features = remap.iter().map(|&j| row.features[j]).collect();
            }
            row
        }));
    }

    rows.retain(|row| {
        options
            .first_day
            .as_deref()
            .is_none_or(|first| row.date.as_str() >= first)
            && options
                .last_day
                .as_deref()
                .is_none_or(|last| row.date.as_str() <= last)
    });
    rows.sort_by(|a, b| a.date.cmp(&b.date));

    let mut by_group: HashMap<&str, Vec<GroupRow>> =
        groups.iter().map(|g| (g.as_str(), Vec::new())).collect();
    for row in rows {
        if let Some(bucket) = by_group.get_mut(row.label.as_str()) {
            bucket.push(row);
        }
    }

    let group_counts: Vec<(String, usize)> = groups
        .iter()
        .map(|g| (g.clone(), by_group.get(g.as_str()).map_or(0, Vec::len)))
        .collect();
    for (group, count) in &group_counts {
        info!(group = %group, posts = count, "posts in date range");
    }

    let included: Vec<String> = if options.include_over_n > 0 {
        group_counts
            .iter()
            .filter(|(group, count)| {
                let keep = *count > options.include_over_n;
                if !keep {
                    info!(
                        group = %group,
                        posts = count,
                        threshold = options.include_over_n,
                        "excluding group at or below threshold"
                    );
                }
                keep
            })
            .map(|(group, _)| group.clone())
            .collect()
    } else {
        groups.to_vec()
    };

    let mut builder = RowBatchBuilder::new(feature_names.len());
    for group in &included {
        let bucket = by_group.remove(group.as_str()).unwrap_or_default();
        let batch = match options.per_group_sample {
            Some(n) => sample_exact(bucket, n, group, rng)?,
            None => bucket,
        };
        for row in batch {
            builder.push(row);
        }
    }
    if builder.is_empty() {
        return Err(DatasetError::InsufficientData(
            "no rows left after filtering".to_string(),
        ));
    }
    info!(rows = builder.len(), groups = included.len(), "assembled dataset");
    builder.finish(feature_names, included, group_counts)
}

/// `None` when the column sets are identical in order, `Some(map)` when `found` must be
/// reordered, and an error when the sets differ.
fn column_remap(expected: &[String], found: &[String]) -> Option<Option<Vec<usize>>> {
    if expected == found {
        return Some(None);
    }
    if expected.len() != found.len() {
        return None;
    }
    expected
        .iter()
        .map(|name| found.iter().position(|f| f == name))
        .collect::<Option<Vec<usize>>>()
        .map(Some)
}

fn sample_exact<R: Rng + ?Sized>(
    rows: Vec<GroupRow>,
    n: usize,
    group: &str,
    rng: &mut R,
) -> Result<Vec<GroupRow>, DatasetError> {
    if rows.len() < n {
        return Err(DatasetError::InsufficientRows {
            group: group.to_string(),
            requested: n,
            available: rows.len(),
        });
    }
    let mut picked = sample(rng, rows.len(), n).into_vec();
    picked.sort_unstable();
    let mut slots: Vec<Option<GroupRow>> = rows.into_iter().map(Some).collect();
    Ok(picked
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}
