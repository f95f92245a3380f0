//! Apply a persisted model to a freshly assembled phase.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::dataset::{AssembledDataset, DatasetError};
use crate::ml::estimator::FitError;
use crate::model_bundle::{BundleError, ModelBundle};
use crate::report::ClassificationReport;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("prediction failed: {0}")]
    Fit(#[from] FitError),
    #[error("failed to write {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

/// Mean score of one group's posts on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyScore {
    pub group: String,
    pub date: String,
    pub posts: usize,
    /// Mean probability of the row's own group, or the hit rate when the model
    /// has no probabilities.
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub report: ClassificationReport,
    pub daily: Vec<DailyScore>,
    /// Whether `daily` holds probabilities rather than hit rates.
    pub probabilistic: bool,
}

pub fn evaluate_bundle(
    bundle: &ModelBundle,
    dataset: &AssembledDataset,
) -> Result<Evaluation, InferenceError> {
    let truth = bundle.classes.encode(&dataset.labels)?;
    let x = bundle.feature_matrix(dataset)?;
    let predicted = bundle.pipeline.predict(x.view())?;
    let report = ClassificationReport::from_predictions(bundle.classes.classes(), &truth, &predicted);

    let (row_scores, probabilistic): (Vec<f64>, bool) = match bundle.pipeline.predict_proba(x.view()) {
        Ok(proba) => (
            truth
                .iter()
                .enumerate()
                .map(|(row, &class)| proba[[row, class]] as f64)
                .collect(),
            true,
        ),
        Err(FitError::NoProbabilities(_)) => (
            truth
                .iter()
                .zip(&predicted)
                .map(|(t, p)| if t == p { 1.0 } else { 0.0 })
                .collect(),
            false,
        ),
        Err(err) => return Err(err.into()),
    };

    let group_order: BTreeMap<&str, usize> = dataset
        .groups
        .iter()
        .enumerate()
        .map(|(idx, group)| (group.as_str(), idx))
        .collect();
    let mut buckets: BTreeMap<(usize, &str), (f64, usize)> = BTreeMap::new();
    for (row, score) in row_scores.iter().enumerate() {
        let label = dataset.labels[row].as_str();
        let order = group_order.get(label).copied().unwrap_or(usize::MAX);
        let entry = buckets
            .entry((order, dataset.dates[row].as_str()))
            .or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }
    let daily = buckets
        .into_iter()
        .map(|((order, date), (sum, posts))| DailyScore {
            group: dataset
                .groups
                .get(order)
                .cloned()
                .unwrap_or_default(),
            date: date.to_string(),
            posts,
            score: sum / posts as f64,
        })
        .collect();

    info!(
        rows = dataset.n_rows(),
        accuracy = report.accuracy(),
        probabilistic,
        "evaluated model"
    );
    Ok(Evaluation {
        report,
        daily,
        probabilistic,
    })
}

pub fn write_daily_csv(rows: &[DailyScore], path: &Path) -> Result<(), InferenceError> {
    let csv_err = |source| InferenceError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|source| csv_err(csv::Error::from(source)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabelEncoder;
    use crate::ml::estimator::EstimatorKind;
    use crate::ml::params::{ParamSet, ParamValue};
    use crate::pipeline::PipelineConfig;
    use crate::text::{TextFeatures, TfidfConfig, TfidfVectorizer, augment};
    use ndarray::array;

    fn dataset() -> AssembledDataset {
        AssembledDataset {
            feature_names: vec!["signal".into()],
            features: array![[0.0f32], [0.1], [5.0], [5.1], [0.2]],
            documents: vec![
                "calm calm".into(),
                "calm day".into(),
                "loud loud".into(),
                "loud day".into(),
                "calm night".into(),
            ],
            labels: vec!["a".into(), "a".into(), "b".into(), "b".into(), "a".into()],
            dates: vec![
                "2020/01/01".into(),
                "2020/01/01".into(),
                "2020/01/01".into(),
                "2020/01/02".into(),
                "2020/01/02".into(),
            ],
            groups: vec!["a".into(), "b".into()],
            group_counts: vec![("a".into(), 3), ("b".into(), 2)],
        }
    }

    fn bundle(data: &AssembledDataset, kind: EstimatorKind) -> ModelBundle {
        let mut text = TfidfVectorizer::new(TfidfConfig {
            ngram_max: 1,
            min_df: 2,
            max_df: 0.6,
            ..TfidfConfig::default()
        });
        text.fit(&data.documents).unwrap();
        let classes = LabelEncoder::fit(&data.labels);
        let y = classes.encode(&data.labels).unwrap();
        let x = augment(data.features.view(), text.transform(&data.documents).unwrap().view()).unwrap();
        let mut params = ParamSet::new();
        params.insert("estimator__n_estimators".into(), ParamValue::Int(8));
        let config = match kind {
            EstimatorKind::ExtraTrees => PipelineConfig::from_params(kind, 5, &params).unwrap(),
            _ => PipelineConfig::new(kind, 5),
        };
        let pipeline = config.fit(x.view(), &y, 2).unwrap();
        ModelBundle::new(kind.name(), classes, vec!["signal".into()], text, pipeline, params)
    }

    #[test]
    fn daily_scores_group_by_label_and_date() {
        let data = dataset();
        let evaluation = evaluate_bundle(&bundle(&data, EstimatorKind::ExtraTrees), &data).unwrap();
        assert!(evaluation.probabilistic);
        let keys: Vec<(&str, &str, usize)> = evaluation
            .daily
            .iter()
            .map(|d| (d.group.as_str(), d.date.as_str(), d.posts))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a", "2020/01/01", 2),
                ("a", "2020/01/02", 1),
                ("b", "2020/01/01", 1),
                ("b", "2020/01/02", 1),
            ]
        );
        assert!(evaluation.daily.iter().all(|d| (0.0..=1.0).contains(&d.score)));
        assert_eq!(evaluation.report.class_rows().len(), 2);
    }

    #[test]
    fn models_without_probabilities_report_hit_rate() {
        let data = dataset();
        let evaluation = evaluate_bundle(&bundle(&data, EstimatorKind::KernelSvm), &data).unwrap();
        assert!(!evaluation.probabilistic);
        assert!(evaluation.daily.iter().all(|d| d.score == 0.0 || d.score == 1.0 || d.posts > 1));
    }

    #[test]
    fn unseen_group_is_rejected() {
        let data = dataset();
        let bundle = bundle(&data, EstimatorKind::ExtraTrees);
        let mut other = data.clone();
        other.labels[0] = "c".into();
        assert!(matches!(
            evaluate_bundle(&bundle, &other),
            Err(InferenceError::Dataset(DatasetError::UnknownLabel(label))) if label == "c"
        ));
    }

    #[test]
    fn daily_csv_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily.csv");
        let rows = vec![DailyScore {
            group: "a".into(),
            date: "2020/01/01".into(),
            posts: 2,
            score: 0.5,
        }];
        write_daily_csv(&rows, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "group,date,posts,score\na,2020/01/01,2,0.5\n");
    }
}
