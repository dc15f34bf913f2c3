//! Slide-related types and error definitions

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::BoundingBox;

/// Errors that can occur when working with slides
#[derive(Debug, Error)]
pub enum SlideError {
    #[error("Slide not found: {0}")]
    NotFound(String),

    #[error("Failed to open slide: {0}")]
    OpenError(String),

    #[error("Failed to read region {region:?}: {message}")]
    ReadError {
        region: BoundingBox,
        message: String,
    },

    #[error("Cell has no polygon to place a crop around")]
    EmptyPolygon,

    #[error("Cell {index}: {source}")]
    Cell {
        index: usize,
        #[source]
        source: Box<SlideError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SlideError {
    /// Attach the index of the cell being read
    pub fn for_cell(self, index: usize) -> Self {
        match self {
            SlideError::Cell { .. } => self,
            other => SlideError::Cell {
                index,
                source: Box::new(other),
            },
        }
    }
}

/// Metadata for a whole-slide image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideMetadata {
    /// Short name used in export file names
    pub name: String,
    /// Full resolution width in pixels
    pub width: u64,
    /// Full resolution height in pixels
    pub height: u64,
    /// Scanner vendor (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// Microns per pixel X (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpp_x: Option<f64>,
    /// Microns per pixel Y (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpp_y: Option<f64>,
}

impl SlideMetadata {
    /// Full slide extent at level 0
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }
}

/// Slide name: the file name up to its first dot
pub fn slide_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .filter(|n| !n.is_empty())
        .unwrap_or("slide")
        .to_string()
}
