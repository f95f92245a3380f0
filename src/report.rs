//! Per-class classification report, persisted as CSV and as a LaTeX table.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::metrics::{
    ConfusionMatrix, PerClassStats, accuracy, macro_average, precision_recall_by_class,
    weighted_average,
};

pub const ACCURACY_ROW: &str = "accuracy";
pub const MACRO_ROW: &str = "macro avg";
pub const WEIGHTED_ROW: &str = "weighted avg";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1: f64,
    pub support: u64,
}

impl ReportRow {
    fn from_stats(label: &str, stats: &PerClassStats) -> Self {
        Self {
            label: label.to_string(),
            precision: stats.precision,
            recall: stats.recall,
            f1: stats.f1,
            support: stats.support as u64,
        }
    }
}

/// Class rows (labels seen in truth or predictions, class order), then the
/// accuracy, macro average and weighted average rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub rows: Vec<ReportRow>,
}

impl ClassificationReport {
    pub fn from_predictions(classes: &[String], truth: &[usize], predicted: &[usize]) -> Self {
        let cm = ConfusionMatrix::from_predictions(classes.len(), truth, predicted);
        let per_class = precision_recall_by_class(&cm);
        let present: Vec<usize> = (0..classes.len())
            .filter(|c| truth.contains(c) || predicted.contains(c))
            .collect();
        let stats: Vec<PerClassStats> = present.iter().map(|&c| per_class[c]).collect();

        let mut rows: Vec<ReportRow> = present
            .iter()
            .zip(&stats)
            .map(|(&c, s)| ReportRow::from_stats(&classes[c], s))
            .collect();
        let acc = accuracy(&cm);
        rows.push(ReportRow {
            label: ACCURACY_ROW.to_string(),
            precision: acc,
            recall: acc,
            f1: acc,
            support: cm.total(),
        });
        rows.push(ReportRow::from_stats(MACRO_ROW, &macro_average(&stats)));
        rows.push(ReportRow::from_stats(WEIGHTED_ROW, &weighted_average(&stats)));
        Self { rows }
    }

    /// Rows before the summary rows.
    pub fn class_rows(&self) -> &[ReportRow] {
        &self.rows[..self.rows.len().saturating_sub(3)]
    }

    pub fn row(&self, label: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|row| row.label == label)
    }

    pub fn accuracy(&self) -> f64 {
        self.row(ACCURACY_ROW).map_or(0.0, |row| row.f1)
    }

    /// Fixed-width console table.
    pub fn render_text(&self) -> String {
        let width = self
            .rows
            .iter()
            .map(|row| row.label.len())
            .max()
            .unwrap_or(0)
            .max(12);
        let mut out = format!(
            "{:>width$} {:>9} {:>9} {:>9} {:>9}\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                row.label, row.precision, row.recall, row.f1, row.support
            );
        }
        out
    }

    pub fn to_latex(&self) -> String {
        let mut out = String::from("\\begin{tabular}{lrrrr}\n\\toprule\n");
        out.push_str(" & precision & recall & f1-score & support \\\\\n\\midrule\n");
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{} & {:.6} & {:.6} & {:.6} & {} \\\\",
                escape_latex(&row.label),
                row.precision,
                row.recall,
                row.f1,
                row.support
            );
        }
        out.push_str("\\bottomrule\n\\end{tabular}\n");
        out
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), ReportError> {
        let csv_err = |source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
        for row in &self.rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_latex(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_latex()).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '&' | '%' | '$' | '#' | '{' | '}') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> Vec<String> {
        vec!["adhd".into(), "anxiety".into(), "mental_health".into()]
    }

    #[test]
    fn summary_rows_follow_class_rows() {
        let report = ClassificationReport::from_predictions(&classes(), &[0, 0, 1, 1], &[0, 1, 1, 1]);
        let labels: Vec<&str> = report.rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["adhd", "anxiety", "accuracy", "macro avg", "weighted avg"]);
        assert_eq!(report.class_rows().len(), 2);
        assert!((report.accuracy() - 0.75).abs() < 1e-12);
        let supports: u64 = report.class_rows().iter().map(|r| r.support).sum();
        assert_eq!(supports, 4);
        let macro_row = report.row(MACRO_ROW).unwrap();
        let expected = (2.0 / 3.0 + 0.8) / 2.0;
        assert!((macro_row.f1 - expected).abs() < 1e-9);
    }

    #[test]
    fn csv_uses_report_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let report = ClassificationReport::from_predictions(&classes(), &[0, 2], &[0, 2]);
        report.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("label,precision,recall,f1-score,support\n"));
        assert!(text.contains("mental_health,1.0,1.0,1.0,1\n"));
    }

    #[test]
    fn latex_escapes_labels() {
        let report = ClassificationReport::from_predictions(&classes(), &[2], &[2]);
        let latex = report.to_latex();
        assert!(latex.contains("mental\\_health & 1.000000"));
        assert!(latex.trim_end().ends_with("\\end{tabular}"));
    }
}
