//! Cell annotation extraction
//!
//! Reads cell and nucleus polygons, classifications and optional measurements
//! from annotation exports.

mod qupath;
mod types;

pub use qupath::{QuPathParser, format_feature_name};
pub use types::{AnnotationError, CellGeometry, measurement_names};
