//! Dataset assembly: per-group feature tables, label encoding and splitting.

mod assemble;
mod labels;
mod loader;
mod split;

pub use assemble::{AssembledDataset, AssemblyOptions, RowBatchBuilder, assemble, clean_document};
pub use labels::LabelEncoder;
pub use loader::{
    AUTHOR_COLUMN, DATE_COLUMN, DOCUMENT_COLUMN, GroupRow, GroupTable, LABEL_COLUMN, Subsample,
    group_file_path, load_groups, read_group_table,
};
pub use split::{SplitError, StratifiedKFold, TrainTestSplit, train_test_split};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("missing feature table for group `{group}` ({path})")]
    MissingGroupFile { group: String, path: PathBuf },
    #[error("{path}: missing required column `{column}`")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{path}: row {row}, column `{column}`: invalid value `{value}`")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    #[error("group `{group}` has feature columns that differ from group `{expected_group}`")]
    ColumnMismatch {
        group: String,
        expected_group: String,
    },
    #[error("group `{group}` has {available} rows but {requested} were requested")]
    InsufficientRows {
        group: String,
        requested: usize,
        available: usize,
    },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("label `{0}` was not seen when the encoder was fitted")]
    UnknownLabel(String),
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
