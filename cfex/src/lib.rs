//! cfex Library
//!
//! Cell image, mask and feature extraction from whole-slide images. This
//! module exports the pipeline stages for use by the command line tool,
//! integration tests and external tooling.

pub mod annotation;
pub mod backend;
pub mod config;
pub mod detect;
pub mod export;
pub mod features;
pub mod geometry;
pub mod mask;
pub mod pipeline;
pub mod slide;

// Re-export commonly used types
pub use annotation::CellGeometry;
pub use config::Config;
pub use detect::{CellDetector, Segmenter};
pub use geometry::{BoundingBox, Point};
pub use mask::{MaskEngine, MaskKind, ObjectMasks};
pub use pipeline::{Pipeline, Reporter, RunInput, RunSummary, Stages};
pub use slide::RegionReader;
