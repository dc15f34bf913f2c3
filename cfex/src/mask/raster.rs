//! Scanline polygon rasterization

use image::Luma;

use crate::geometry::Point;

use super::types::BinaryMask;

/// Pixels within this distance of the boundary count as inside. Rows are
/// sampled this far above and below their center and spans are widened by it,
/// so vertices carrying rounding error still cover boundary pixels.
const EDGE_TOLERANCE: f64 = 1e-7;

/// Set every pixel whose center lies inside or on the polygon to 1.
///
/// Pixel `(x, y)` has its center at coordinate `(x, y)`. Uses the even-odd
/// rule; parts of the polygon outside the mask are clipped.
pub(crate) fn fill_polygon(mask: &mut BinaryMask, polygon: &[Point]) {
    if polygon.len() < 3 {
        return;
    }

    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let (min_y, max_y) = polygon
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.y), hi.max(p.y))
        });
    let row_start = (min_y - EDGE_TOLERANCE).ceil().max(0.0);
    let row_end = (max_y + EDGE_TOLERANCE).floor().min(f64::from(height - 1));
    if row_end < row_start {
        return;
    }

    let max_x = f64::from(width - 1);
    let mut crossings = Vec::with_capacity(polygon.len());

    for row in row_start as u32..=row_end as u32 {
        let center = f64::from(row);
        for scan_y in [center - EDGE_TOLERANCE, center + EDGE_TOLERANCE] {
            scanline_crossings(polygon, scan_y, &mut crossings);
            for span in crossings.chunks_exact(2) {
                let x0 = (span[0] - EDGE_TOLERANCE).ceil().max(0.0);
                let x1 = (span[1] + EDGE_TOLERANCE).floor().min(max_x);
                if x1 < x0 {
                    continue;
                }
                for x in x0 as u32..=x1 as u32 {
                    mask.put_pixel(x, row, Luma([1]));
                }
            }
        }
    }
}

/// Sorted x positions where the horizontal line `y = scan_y` crosses an edge
fn scanline_crossings(polygon: &[Point], scan_y: f64, crossings: &mut Vec<f64>) {
    crossings.clear();
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y <= scan_y) != (b.y <= scan_y) {
            let t = (scan_y - a.y) / (b.y - a.y);
            crossings.push(a.x + t * (b.x - a.x));
        }
    }
    crossings.sort_by(f64::total_cmp);
}
