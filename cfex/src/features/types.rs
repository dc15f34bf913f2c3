//! Feature-related error definitions

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while measuring cell features
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("No cell images found in {0}")]
    NoImages(PathBuf),

    #[error("Cannot express {0:?} as a file URL")]
    InvalidPath(PathBuf),

    #[error("Feature backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("Feature backend exited with {status:?}: {message}")]
    Backend { status: Option<i32>, message: String },

    #[error("Batch {batch} produced no {table} table, see {contents:?}")]
    MissingExport {
        table: String,
        batch: usize,
        contents: PathBuf,
    },

    #[error("Column {column} missing from {path:?}")]
    MissingColumn { column: String, path: PathBuf },

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
