//! Detection-related types and error definitions

use std::collections::BTreeMap;
use std::time::Duration;

use image::RgbImage;
use thiserror::Error;

use crate::mask::LabelImage;

/// Errors that can occur while segmenting cell crops
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Segmentation backend failed: {0}")]
    Backend(String),

    #[error("Segmentation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Label image is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cell {index}: {source}")]
    Cell {
        index: usize,
        #[source]
        source: Box<DetectError>,
    },
}

impl DetectError {
    /// Attach the index of the cell being segmented
    pub fn for_cell(self, index: usize) -> Self {
        match self {
            DetectError::Cell { .. } => self,
            other => DetectError::Cell {
                index,
                source: Box::new(other),
            },
        }
    }
}

/// How a batch reacts to a per-cell backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Stop at the first failing cell
    FailFast,
    /// Record the failure and continue with the next cell
    #[default]
    Continue,
}

/// Outcome for one crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    /// The label at the crop center is a nucleus
    Centered,
    /// Nuclei were found, but the crop center is background
    OffCenter,
    /// The backend found no nucleus at all
    Empty,
    /// The backend failed for this crop
    Failed,
}

/// Result of a detection batch, index-aligned with the input crops
#[derive(Debug, Default)]
pub struct Detections {
    /// Label image per crop; `None` where the backend failed
    pub labels: Vec<Option<LabelImage>>,
    /// Classification per crop
    pub status: Vec<DetectionStatus>,
    /// Off-center crops rendered with their labels, keyed by crop index.
    /// Only populated when stashing was requested.
    pub off_center: Option<BTreeMap<usize, RgbImage>>,
    /// Backend failures, keyed by crop index
    pub failures: Vec<(usize, DetectError)>,
}

impl Detections {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn centered_count(&self) -> usize {
        self.count(DetectionStatus::Centered)
    }

    pub fn off_center_count(&self) -> usize {
        self.count(DetectionStatus::OffCenter)
    }

    pub fn empty_count(&self) -> usize {
        self.count(DetectionStatus::Empty)
    }

    pub fn failed_count(&self) -> usize {
        self.count(DetectionStatus::Failed)
    }

    fn count(&self, status: DetectionStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }
}
