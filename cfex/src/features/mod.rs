//! Feature measurement
//!
//! Runs an external measurement pipeline over exported cell images and
//! reduces its per-object tables to one feature table.

mod cellprofiler;
mod service;
mod table;
mod types;

pub use cellprofiler::{CellProfiler, FileBatch};
pub use service::FeatureExtractor;
pub use table::{ObjectTable, is_axis_column, is_metadata_column, merge_object_tables};
pub use types::FeatureError;
