//! Loader for per-group `{group}_{phase}_features.csv` tables.

use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::DatasetError;

/// Column holding the group label of each row.
pub const LABEL_COLUMN: &str = "subreddit";
pub const AUTHOR_COLUMN: &str = "author";
pub const DATE_COLUMN: &str = "date";
/// Column holding the raw document text.
pub const DOCUMENT_COLUMN: &str = "post";

/// Threshold subsampling applied while loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subsample {
    /// Share of rows kept from a large group, in `(0, 1]`.
    pub fraction: f64,
    /// Groups with more rows than this are subsampled; smaller groups are kept whole.
    pub over_n: usize,
}

/// One row of a group table.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub label: String,
    pub author: String,
    /// ISO date (`YYYY/MM/DD` or `YYYY-MM-DD`); compared lexicographically.
    pub date: String,
    pub document: String,
    pub features: Vec<f32>,
}

/// Parsed feature table for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTable {
    pub group: String,
    /// Structured feature column names, in file order.
    pub feature_names: Vec<String>,
    pub rows: Vec<GroupRow>,
}

/// `{input_dir}/{group}_{phase}_features.csv`
pub fn group_file_path(input_dir: &Path, group: &str, phase: &str) -> PathBuf {
    input_dir.join(format!("{group}_{phase}_features.csv"))
}

/// Load every listed group in order, optionally subsampling large ones.
pub fn load_groups<R: Rng + ?Sized>(
    input_dir: &Path,
    groups: &[String],
    phase: &str,
    subsample: Option<&Subsample>,
    rng: &mut R,
) -> Result<Vec<GroupTable>, DatasetError> {
    let mut tables = Vec::with_capacity(groups.len());
    for group in groups {
        let path = group_file_path(input_dir, group, phase);
        if !path.is_file() {
            return Err(DatasetError::MissingGroupFile {
                group: group.clone(),
                path,
            });
        }
        let mut table = read_group_table(&path, group)?;
        info!(group = %group, rows = table.rows.len(), "loaded group table");
        if let Some(subsample) = subsample {
            subsample_rows(&mut table, subsample, rng);
            info!(group = %group, rows = table.rows.len(), "after subsampling");
        }
        tables.push(table);
    }
    Ok(tables)
}

fn subsample_rows<R: Rng + ?Sized>(table: &mut GroupTable, subsample: &Subsample, rng: &mut R) {
    let len = table.rows.len();
    if len <= subsample.over_n {
        return;
    }
    let keep = ((len as f64 * subsample.fraction).floor() as usize).min(len);
    let mut picked = sample(rng, len, keep).into_vec();
    picked.sort_unstable();
    let mut rows = std::mem::take(&mut table.rows);
    let mut kept = Vec::with_capacity(keep);
    let mut next = picked.into_iter().peekable();
    for (idx, row) in rows.drain(..).enumerate() {
        if next.peek() == Some(&idx) {
            kept.push(row);
            next.next();
        }
    }
    table.rows = kept;
}

/// Read one group's CSV. Every column other than the four metadata columns is a
/// numeric feature; an unnamed leading index column is ignored.
pub fn read_group_table(path: &Path, group: &str) -> Result<GroupTable, DatasetError> {
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();

    let find = |column: &'static str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DatasetError::MissingColumn {
                path: path.to_path_buf(),
                column,
            })
    };
    let label_idx = find(LABEL_COLUMN)?;
    let author_idx = find(AUTHOR_COLUMN)?;
    let date_idx = find(DATE_COLUMN)?;
    let document_idx = find(DOCUMENT_COLUMN)?;

    let mut feature_idx = Vec::new();
    let mut feature_names = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        let metadata = [label_idx, author_idx, date_idx, document_idx].contains(&idx);
        if metadata || name.is_empty() || name.starts_with("Unnamed:") {
            continue;
        }
        feature_idx.push(idx);
        feature_names.push(name.to_string());
    }

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();
        let mut features = Vec::with_capacity(feature_idx.len());
        for &idx in &feature_idx {
            let raw = record.get(idx).unwrap_or_default();
            let value = parse_feature(raw).ok_or_else(|| DatasetError::InvalidValue {
                path: path.to_path_buf(),
                row: row_idx + 1,
                column: headers.get(idx).unwrap_or_default().to_string(),
                value: raw.to_string(),
            })?;
            features.push(value);
        }
        rows.push(GroupRow {
            label: field(label_idx),
            author: field(author_idx),
            date: field(date_idx),
            document: field(document_idx),
            features,
        });
    }

    Ok(GroupTable {
        group: group.to_string(),
        feature_names,
        rows,
    })
}

/// Finite numbers, plus `True`/`False` flags as 1/0.
fn parse_feature(raw: &str) -> Option<f32> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        return Some(1.0);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Some(0.0);
    }
    raw.parse::<f32>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    const TABLE: &str = "subreddit,author,date,post,n_words,has_link\n\
        adhd,a1,2019/01/02,\"first post\",12,True\n\
        adhd,a2,2019/01/01,second,3.5,False\n";

    #[test]
    fn reads_metadata_and_numeric_columns() {
        let dir = tempdir().unwrap();
        let path = group_file_path(dir.path(), "adhd", "pre");
        std::fs::write(&path, TABLE).unwrap();
        let table = read_group_table(&path, "adhd").unwrap();
        assert_eq!(table.feature_names, vec!["n_words", "has_link"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].document, "first post");
        assert_eq!(table.rows[0].features, vec![12.0, 1.0]);
        assert_eq!(table.rows[1].features, vec![3.5, 0.0]);
        assert_eq!(table.rows[1].date, "2019/01/01");
    }

    #[test]
    fn missing_group_file_is_fatal() {
        let dir = tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = load_groups(dir.path(), &["ghost".to_string()], "pre", None, &mut rng).unwrap_err();
        assert!(matches!(err, DatasetError::MissingGroupFile { ref group, .. } if group == "ghost"));
    }

    #[test]
    fn bad_numeric_value_names_row_and_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_pre_features.csv");
        std::fs::write(&path, "subreddit,author,date,post,score\nx,a,2019/01/01,p,abc\n").unwrap();
        let err = read_group_table(&path, "x").unwrap_err();
        match err {
            DatasetError::InvalidValue { row, column, value, .. } => {
                assert_eq!((row, column.as_str(), value.as_str()), (1, "score", "abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_label_column_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x_pre_features.csv");
        std::fs::write(&path, "author,date,post,score\na,2019/01/01,p,1\n").unwrap();
        assert!(matches!(
            read_group_table(&path, "x"),
            Err(DatasetError::MissingColumn { column: LABEL_COLUMN, .. })
        ));
    }

    #[test]
    fn subsampling_only_touches_groups_over_threshold() {
        let row = GroupRow {
            label: "g".into(),
            author: "a".into(),
            date: "2019/01/01".into(),
            document: "d".into(),
            features: vec![],
        };
        let mut big = GroupTable {
            group: "g".into(),
            feature_names: vec![],
            rows: vec![row.clone(); 100],
        };
        let mut small = GroupTable {
            rows: vec![row; 10],
            ..big.clone()
        };
        let rule = Subsample {
            fraction: 0.25,
            over_n: 50,
        };
        let mut rng = StdRng::seed_from_u64(7);
        subsample_rows(&mut big, &rule, &mut rng);
        subsample_rows(&mut small, &rule, &mut rng);
        assert_eq!(big.rows.len(), 25);
        assert_eq!(small.rows.len(), 10);
    }
}
