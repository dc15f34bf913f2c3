//! Geometric primitives

use serde::{Deserialize, Serialize};

/// Point in 2D space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Coordinates truncated toward zero
    pub fn truncated(self) -> (i64, i64) {
        (self.x as i64, self.y as i64)
    }
}

/// Ordered polygon vertices, closed implicitly
pub type Polygon = Vec<Point>;

/// Axis-aligned box in slide coordinates; `x`, `y` is the upper-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: u64,
    pub height: u64,
}

impl BoundingBox {
    /// Smallest integer box containing all points, with corners taken from
    /// the truncated minimum and maximum coordinates.
    pub fn enclosing(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let init = (first.x, first.y, first.x, first.y);
        let (min_x, min_y, max_x, max_y) =
            points.iter().fold(init, |(x0, y0, x1, y1), p| {
                (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y))
            });
        let (x, y) = (min_x.floor() as i64, min_y.floor() as i64);
        Some(Self {
            x,
            y,
            width: (max_x.floor() as i64 - x) as u64,
            height: (max_y.floor() as i64 - y) as u64,
        })
    }

    pub fn right(&self) -> i64 {
        self.x + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height as i64
    }

    /// Overlap with another box, `None` if they do not intersect
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(BoundingBox {
            x,
            y,
            width: (right - x) as u64,
            height: (bottom - y) as u64,
        })
    }
}
