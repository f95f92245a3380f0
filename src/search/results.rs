use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ml::params::ParamSet;

/// Cross-validation record for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub params: ParamSet,
    /// Weighted F1 per fold; `NaN` when the fold failed.
    pub split_scores: Vec<f64>,
    /// Seconds per fold.
    pub fit_times: Vec<f64>,
    pub score_times: Vec<f64>,
    /// First failure message, if any fold failed.
    pub error: Option<String>,
}

impl CandidateResult {
    /// Mean over folds; any failed fold makes the mean `NaN`.
    pub fn mean_test_score(&self) -> f64 {
        mean(&self.split_scores)
    }

    pub fn std_test_score(&self) -> f64 {
        std(&self.split_scores)
    }
}

/// Full results table of one grid search, in configuration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResults {
    pub n_splits: usize,
    pub candidates: Vec<CandidateResult>,
}

impl CvResults {
    pub fn new(n_splits: usize, candidates: Vec<CandidateResult>) -> Self {
        Self {
            n_splits,
            candidates,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn mean_test_scores(&self) -> Vec<f64> {
        self.candidates.iter().map(CandidateResult::mean_test_score).collect()
    }

    /// Rank 1 is best; ties share the lowest rank. `NaN` means rank after every
    /// finite one.
    pub fn ranks(&self) -> Vec<usize> {
        let means = self.mean_test_scores();
        let finite: Vec<f64> = means.iter().copied().filter(|m| m.is_finite()).collect();
        means
            .iter()
            .map(|&m| {
                if m.is_finite() {
                    1 + finite.iter().filter(|&&other| other > m).count()
                } else {
                    finite.len() + 1
                }
            })
            .collect()
    }

    /// Index of the best finite mean, first-seen on ties.
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, mean) in self.mean_test_scores().into_iter().enumerate() {
            if !mean.is_finite() {
                continue;
            }
            if best.is_none_or(|(_, score)| mean > score) {
                best = Some((idx, mean));
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn param_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .candidates
            .iter()
            .flat_map(|c| c.params.keys())
            .collect();
        names.into_iter().cloned().collect()
    }

    /// Header of the persisted table.
    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = [
            "mean_fit_time",
            "std_fit_time",
            "mean_score_time",
            "std_score_time",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        header.extend(self.param_names().iter().map(|name| format!("param_{name}")));
        header.push("params".to_string());
        header.extend((0..self.n_splits).map(|i| format!("split{i}_test_score")));
        header.extend(
            ["mean_test_score", "std_test_score", "rank_test_score", "error"]
                .iter()
                .map(|s| s.to_string()),
        );
        header
    }

    /// One row per configuration, in the column order of [`CvResults::header`].
    pub fn rows(&self) -> Vec<Vec<String>> {
        let names = self.param_names();
        let ranks = self.ranks();
        self.candidates
            .iter()
            .zip(ranks)
            .map(|(candidate, rank)| {
                let mut row = vec![
                    mean(&candidate.fit_times).to_string(),
                    std(&candidate.fit_times).to_string(),
                    mean(&candidate.score_times).to_string(),
                    std(&candidate.score_times).to_string(),
                ];
                row.extend(names.iter().map(|name| {
                    candidate
                        .params
                        .get(name)
                        .map(ToString::to_string)
                        .unwrap_or_default()
                }));
                row.push(serde_json::to_string(&candidate.params).unwrap_or_default());
                row.extend(candidate.split_scores.iter().map(f64::to_string));
                row.push(candidate.mean_test_score().to_string());
                row.push(candidate.std_test_score().to_string());
                row.push(rank.to_string());
                row.push(candidate.error.clone().unwrap_or_default());
                row
            })
            .collect()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.header())?;
        for row in self.rows() {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std(values: &[f64]) -> f64 {
    let m = mean(values);
    if !m.is_finite() {
        return f64::NAN;
    }
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::params::ParamValue;

    fn candidate(k: i64, scores: &[f64]) -> CandidateResult {
        CandidateResult {
            params: [("feature_selection__k".to_string(), ParamValue::Int(k))]
                .into_iter()
                .collect(),
            split_scores: scores.to_vec(),
            fit_times: vec![0.5; scores.len()],
            score_times: vec![0.1; scores.len()],
            error: scores
                .iter()
                .any(|s| s.is_nan())
                .then(|| "fold failed".to_string()),
        }
    }

    #[test]
    fn ranks_share_ties_and_put_failures_last() {
        let results = CvResults::new(
            2,
            vec![
                candidate(1, &[0.5, 0.7]),
                candidate(2, &[0.9, f64::NAN]),
                candidate(3, &[0.6, 0.6]),
                candidate(4, &[0.8, 0.8]),
            ],
        );
        assert_eq!(results.ranks(), vec![2, 4, 2, 1]);
        assert_eq!(results.best_index(), Some(3));
    }

    #[test]
    fn best_index_prefers_first_on_ties() {
        let results = CvResults::new(1, vec![candidate(1, &[0.7]), candidate(2, &[0.7])]);
        assert_eq!(results.best_index(), Some(0));
        let failed = CvResults::new(1, vec![candidate(1, &[f64::NAN])]);
        assert_eq!(failed.best_index(), None);
    }

    #[test]
    fn csv_has_one_column_per_fold_and_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let results = CvResults::new(3, vec![candidate(8, &[0.5, 0.6, 0.7])]);
        results.write_csv(&path).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "param_feature_selection__k"));
        assert!(headers.iter().any(|h| h == "split2_test_score"));
        let row = reader.records().next().unwrap().unwrap();
        let rank = headers.iter().position(|h| h == "rank_test_score").unwrap();
        assert_eq!(&row[rank], "1");
        let mean = headers.iter().position(|h| h == "mean_test_score").unwrap();
        let value: f64 = row[mean].parse().unwrap();
        assert!((value - 0.6).abs() < 1e-9);
    }
}
