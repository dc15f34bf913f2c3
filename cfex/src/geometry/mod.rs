//! Geometry utilities
//!
//! Pure functions for centroids, bounding boxes and coordinate transforms
//! shared by the loader, the mask engine and the export writer.

mod types;

pub use types::{BoundingBox, Point, Polygon};

use image::GenericImageView;

/// Extra width and height added once to the raw span in [`roi_bounding_box`]
pub const ROI_MARGIN: i64 = 200;

/// Mean of all polygon point coordinates.
///
/// Returns `None` for an empty polygon.
pub fn centroid(polygon: &[Point]) -> Option<Point> {
    if polygon.is_empty() {
        return None;
    }
    let n = polygon.len() as f64;
    let (sum_x, sum_y) = polygon
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sum_x / n, sum_y / n))
}

/// Re-express an absolute point relative to the upper-left corner of a box
pub fn transform_to_local(bounding_box: &BoundingBox, point: Point) -> Point {
    Point::new(
        point.x - bounding_box.x as f64,
        point.y - bounding_box.y as f64,
    )
}

/// Bounding box enclosing the bounding rectangles of all polygons.
///
/// Width and height are the raw span plus [`ROI_MARGIN`], added once rather
/// than split across both sides. Returns `None` when no polygon has points.
pub fn roi_bounding_box(polygons: &[Polygon]) -> Option<BoundingBox> {
    let mut bounds: Option<(i64, i64, i64, i64)> = None;

    for rect in polygons.iter().filter_map(|p| BoundingBox::enclosing(p)) {
        let (min_x, min_y, max_x, max_y) = bounds.unwrap_or((
            rect.x,
            rect.y,
            rect.right(),
            rect.bottom(),
        ));
        bounds = Some((
            min_x.min(rect.x),
            min_y.min(rect.y),
            max_x.max(rect.right()),
            max_y.max(rect.bottom()),
        ));
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| BoundingBox {
        x: min_x,
        y: min_y,
        width: (max_x - min_x + ROI_MARGIN) as u64,
        height: (max_y - min_y + ROI_MARGIN) as u64,
    })
}

/// Square box of side `2 * margin` centered on a cell centroid
pub fn cell_roi_bounding_box(centroid: (i64, i64), margin: u32) -> BoundingBox {
    let (cx, cy) = centroid;
    let margin_i = i64::from(margin);
    BoundingBox {
        x: cx - margin_i,
        y: cy - margin_i,
        width: u64::from(margin) * 2,
        height: u64::from(margin) * 2,
    }
}

/// Integer midpoint of an image as an `(x, y)` pixel position
pub fn image_center<I: GenericImageView>(image: &I) -> (u32, u32) {
    let (width, height) = image.dimensions();
    (width / 2, height / 2)
}
