//! Boundary contour extraction

use imageproc::contours::{BorderType, find_contours};

use crate::geometry::{Point, Polygon};

use super::types::BinaryMask;

/// Outer boundary of the first foreground region, as pixel-center coordinates.
///
/// Returns `None` for an empty mask. When the mask holds several disjoint
/// regions only the first outer border in raster order is returned.
pub(crate) fn first_outer_contour(mask: &BinaryMask) -> Option<Polygon> {
    find_contours::<i32>(mask)
        .into_iter()
        .find(|contour| contour.border_type == BorderType::Outer)
        .map(|contour| {
            contour
                .points
                .iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect()
        })
}
