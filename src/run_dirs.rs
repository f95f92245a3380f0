//! Per-run output directories, named by mode, run version, grid index and launch time.

use std::path::{Path, PathBuf};

use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

/// Errors that can occur while preparing a run directory.
#[derive(Debug, Error)]
pub enum RunDirError {
    /// Failed to create the run directory.
    #[error("Failed to create run directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to format the launch timestamp.
    #[error("Failed to format run timestamp: {0}")]
    FormatTime(#[from] time::error::Format),
}

/// `YYYY-MM-DD_HH-MM-SS`
pub fn timestamp(now: OffsetDateTime) -> Result<String, time::error::Format> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    now.format(NAME_FORMAT)
}

pub fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Create `{output_dir}/{run_name}_{timestamp}`. A second launch within the same
/// second gets a numeric suffix instead of sharing the directory.
pub fn prepare_run_dir(output_dir: &Path, run_name: &str) -> Result<PathBuf, RunDirError> {
    prepare_run_dir_at(output_dir, run_name, now_local_or_utc())
}

fn prepare_run_dir_at(
    output_dir: &Path,
    run_name: &str,
    now: OffsetDateTime,
) -> Result<PathBuf, RunDirError> {
    let create_err = |path: &Path, source| RunDirError::CreateDir {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(output_dir).map_err(|source| create_err(output_dir, source))?;
    let base = format!("{run_name}_{}", timestamp(now)?);
    let mut path = output_dir.join(&base);
    let mut attempt = 1usize;
    loop {
        match std::fs::create_dir(&path) {
            Ok(()) => return Ok(path),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                path = output_dir.join(format!("{base}_{attempt}"));
                attempt += 1;
            }
            Err(source) => return Err(create_err(&path, source)),
        }
    }
}
