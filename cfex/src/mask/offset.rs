//! Outward polygon offsetting with square joins
//!
//! The buffered region is kept as a union of simple pieces instead of a
//! single merged outline: the source polygon, one quad per edge swept along
//! its outward normal, and one square-join cap per convex vertex. Concave
//! vertices need no piece since the quads of adjacent edges overlap there.
//! Rasterizing the pieces into one mask yields the same pixels as
//! rasterizing the merged outline, without a polygon-clipping pass.

use crate::geometry::{Point, Polygon};

use super::raster::fill_polygon;
use super::types::BinaryMask;

/// Turns smaller than this (as the cross product of unit tangents) are
/// treated as straight or as a full reversal.
const TURN_EPSILON: f64 = 1e-12;

/// Region covered by a polygon dilated outward by a fixed distance
#[derive(Debug, Clone, Default)]
pub struct OffsetRegion {
    pieces: Vec<Polygon>,
}

impl OffsetRegion {
    /// Simple polygons whose union is the region
    pub fn pieces(&self) -> &[Polygon] {
        &self.pieces
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Rasterize the region into a new `width` x `height` mask
    pub fn rasterize(&self, width: u32, height: u32) -> BinaryMask {
        let mut mask = BinaryMask::new(width, height);
        self.rasterize_into(&mut mask);
        mask
    }

    /// Set all pixels covered by the region to 1, leaving others untouched
    pub fn rasterize_into(&self, mask: &mut BinaryMask) {
        for piece in &self.pieces {
            fill_polygon(mask, piece);
        }
    }
}

/// Dilate a closed polygon outward by `delta` using square joins.
///
/// Orientation of the input does not matter. Polygons of zero area (a single
/// point, a segment, back-and-forth paths) are buffered on both sides with
/// square end caps. A non-positive `delta` returns the polygon itself.
pub fn offset_polygon(polygon: &[Point], delta: f64) -> OffsetRegion {
    let mut path = dedup_closed(polygon);
    if path.is_empty() {
        return OffsetRegion::default();
    }

    if delta <= 0.0 {
        return OffsetRegion {
            pieces: if path.len() >= 3 { vec![path] } else { Vec::new() },
        };
    }

    if let [p] = path.as_slice() {
        return OffsetRegion {
            pieces: vec![vec![
                Point::new(p.x - delta, p.y - delta),
                Point::new(p.x + delta, p.y - delta),
                Point::new(p.x + delta, p.y + delta),
                Point::new(p.x - delta, p.y + delta),
            ]],
        };
    }

    if signed_area(&path) < 0.0 {
        path.reverse();
    }

    let n = path.len();
    let tangents: Vec<Point> = (0..n).map(|i| unit(path[i], path[(i + 1) % n])).collect();
    let normals: Vec<Point> = tangents.iter().map(|t| Point::new(t.y, -t.x)).collect();

    let mut pieces = Vec::with_capacity(2 * n + 1);
    if n >= 3 {
        pieces.push(path.clone());
    }

    for i in 0..n {
        let a = path[i];
        let b = path[(i + 1) % n];
        let nrm = normals[i];
        pieces.push(vec![
            a,
            b,
            Point::new(b.x + delta * nrm.x, b.y + delta * nrm.y),
            Point::new(a.x + delta * nrm.x, a.y + delta * nrm.y),
        ]);
    }

    for i in 0..n {
        let prev = (i + n - 1) % n;
        if let Some(cap) = square_cap(
            path[i],
            tangents[prev],
            normals[prev],
            tangents[i],
            normals[i],
            delta,
        ) {
            pieces.push(cap);
        }
    }

    OffsetRegion { pieces }
}

/// Square-join cap at vertex `p` between the incoming edge (`t1`, `n1`) and
/// the outgoing edge (`t2`, `n2`). The corner is cut perpendicular to the
/// bisector at distance `delta` from `p`. Returns `None` at concave or
/// straight vertices.
fn square_cap(
    p: Point,
    t1: Point,
    n1: Point,
    t2: Point,
    n2: Point,
    delta: f64,
) -> Option<Polygon> {
    let turn = cross(t1, t2);
    let reversal = turn.abs() <= TURN_EPSILON && dot(t1, t2) < 0.0;
    if turn <= TURN_EPSILON && !reversal {
        return None;
    }

    let angle = turn.abs().atan2(dot(n1, n2));
    let k = (angle / 4.0).tan();

    Some(vec![
        p,
        Point::new(p.x + delta * n1.x, p.y + delta * n1.y),
        Point::new(p.x + delta * (n1.x + k * t1.x), p.y + delta * (n1.y + k * t1.y)),
        Point::new(p.x + delta * (n2.x - k * t2.x), p.y + delta * (n2.y - k * t2.y)),
        Point::new(p.x + delta * n2.x, p.y + delta * n2.y),
    ])
}

/// Drop consecutive duplicate vertices, including a closing copy of the first
fn dedup_closed(polygon: &[Point]) -> Polygon {
    let mut path: Polygon = Vec::with_capacity(polygon.len());
    for &p in polygon {
        if path.last() != Some(&p) {
            path.push(p);
        }
    }
    while path.len() > 1 && path.first() == path.last() {
        path.pop();
    }
    path
}

/// Shoelace area, positive for counter-clockwise order in a y-up frame
fn signed_area(path: &[Point]) -> f64 {
    let n = path.len();
    (0..n)
        .map(|i| {
            let a = path[i];
            let b = path[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

fn unit(a: Point, b: Point) -> Point {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx.hypot(dy);
    Point::new(dx / len, dy / len)
}

fn cross(a: Point, b: Point) -> f64 {
    a.x * b.y - a.y * b.x
}

fn dot(a: Point, b: Point) -> f64 {
    a.x * b.x + a.y * b.y
}
