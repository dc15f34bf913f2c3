//! Detection adapter
//!
//! Runs the nucleus instance-segmentation backend over cell crops and
//! classifies each result as centered or off-center.

mod detector;
mod overlay;
mod service;
mod stardist;
mod types;

pub use detector::{CellDetector, is_centered};
pub use overlay::render_label_overlay;
pub use service::Segmenter;
pub use stardist::StarDistSegmenter;
pub use types::{BatchMode, DetectError, DetectionStatus, Detections};
