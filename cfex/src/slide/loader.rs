//! Cell crop loading

use image::RgbImage;
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::annotation::CellGeometry;
use crate::geometry::{BoundingBox, cell_roi_bounding_box};

use super::service::RegionReader;
use super::types::SlideError;

/// Crop box of one cell: `2 * margin` square around the truncated centroid
/// of its cell polygon
pub fn cell_bounding_box(cell: &CellGeometry, margin: u32) -> Result<BoundingBox, SlideError> {
    let centroid = cell.cell_centroid().ok_or(SlideError::EmptyPolygon)?;
    Ok(cell_roi_bounding_box(centroid.truncated(), margin))
}

/// Read one crop per cell, in cell order.
///
/// A failed read is reported at its cell's position and does not stop the
/// remaining reads.
pub fn load_cell_images(
    reader: &dyn RegionReader,
    cells: &[CellGeometry],
    margin: u32,
    progress: &ProgressBar,
) -> Vec<Result<RgbImage, SlideError>> {
    info!(
        "Loading slide regions defined by a {}x{} pixels bounding box",
        u64::from(margin) * 2,
        u64::from(margin) * 2
    );

    let images = cells
        .iter()
        .enumerate()
        .map(|(index, cell)| {
            let crop = cell_bounding_box(cell, margin)
                .and_then(|bbox| {
                    debug!("Cell {}: reading {:?}", index, bbox);
                    reader.read_region(&bbox)
                })
                .map_err(|e| e.for_cell(index));
            progress.inc(1);
            crop
        })
        .collect();
    progress.finish();
    images
}
