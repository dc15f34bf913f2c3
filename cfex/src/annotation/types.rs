//! Annotation-related types and error definitions

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::geometry::{Point, Polygon, centroid};

/// Errors that can occur when reading annotation exports
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Failed to parse annotation data: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("No usable cell records in {0}")]
    Empty(String),
}

/// One annotated cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellGeometry {
    /// Cell boundary, exterior ring
    pub cell_polygon: Polygon,
    /// Nucleus boundary, exterior ring
    pub nucleus_polygon: Polygon,
    /// Classification name, if the cell was classified
    pub target: Option<String>,
    /// Normalised measurement names to values, when extracted
    pub measurements: Option<BTreeMap<String, f64>>,
}

/// Centroid of a polygon whose vertices are first truncated to whole pixels
fn pixel_centroid(polygon: &[Point]) -> Option<Point> {
    let pixels: Polygon = polygon
        .iter()
        .map(|p| {
            let (x, y) = p.truncated();
            Point::new(x as f64, y as f64)
        })
        .collect();
    centroid(&pixels)
}

impl CellGeometry {
    /// Centroid of the cell polygon on whole-pixel vertices, used to place
    /// the crop
    pub fn cell_centroid(&self) -> Option<Point> {
        pixel_centroid(&self.cell_polygon)
    }

    /// Centroid of the nucleus polygon on whole-pixel vertices, used in
    /// export file names
    pub fn nucleus_centroid(&self) -> Option<Point> {
        pixel_centroid(&self.nucleus_polygon)
    }
}

/// Sorted union of measurement names over all cells
pub fn measurement_names(cells: &[CellGeometry]) -> Vec<String> {
    cells
        .iter()
        .filter_map(|cell| cell.measurements.as_ref())
        .flat_map(|m| m.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
