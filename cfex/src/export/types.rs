//! Export-related types and error definitions

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;

use crate::annotation::CellGeometry;
use crate::mask::ObjectMasks;

/// Errors that can occur while writing cell files
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Cell {index} has no nucleus polygon")]
    EmptyNucleusPolygon { index: usize },

    #[error("Failed to write image: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Failed to write cell index: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// One cell ready to be written
#[derive(Debug, Clone, Copy)]
pub struct ExportedCell<'a> {
    /// Position of the cell in the annotation data
    pub index: usize,
    pub geometry: &'a CellGeometry,
    pub image: &'a RgbImage,
    pub masks: &'a ObjectMasks,
}

/// Result of an export run
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Timestamped directory holding the files
    pub dir: PathBuf,
    /// Number of cells written
    pub written: usize,
    /// Path of the `cells.csv` index
    pub index_path: PathBuf,
}
