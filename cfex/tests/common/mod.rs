//! Common Test Utilities for Integration Tests
//!
//! Mock stage implementations shared across integration test modules.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use cfex::detect::{DetectError, Segmenter};
use cfex::geometry::BoundingBox;
use cfex::mask::LabelImage;
use cfex::slide::{RegionReader, SlideError, SlideMetadata};
use image::{Luma, Rgb, RgbImage};

/// What the mock segmenter returns for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Disc of label 1 on the crop center
    Centered,
    /// Disc of label 1 in the upper-left corner
    OffCenter,
    /// All background
    Empty,
    /// Backend error
    Fail,
}

/// Segmenter that replays a fixed list of outcomes in call order.
/// Calls beyond the list are answered with [`Outcome::Centered`].
pub struct MockSegmenter {
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: Mutex<usize>,
}

impl MockSegmenter {
    pub fn new(outcomes: &[Outcome]) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

/// Label image with a disc of `label` at `center`
pub fn disc_labels(width: u32, height: u32, center: (u32, u32), radius: u32, label: u32) -> LabelImage {
    let r2 = i64::from(radius * radius);
    LabelImage::from_fn(width, height, |x, y| {
        let dx = i64::from(x) - i64::from(center.0);
        let dy = i64::from(y) - i64::from(center.1);
        Luma([if dx * dx + dy * dy <= r2 { label } else { 0 }])
    })
}

#[async_trait]
impl Segmenter for MockSegmenter {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError> {
        *self.calls.lock().unwrap() += 1;
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Centered);
        let (w, h) = image.dimensions();
        match outcome {
            Outcome::Centered => Ok(disc_labels(w, h, (w / 2, h / 2), w / 6, 1)),
            Outcome::OffCenter => Ok(disc_labels(w, h, (w / 8, h / 8), w / 10, 1)),
            Outcome::Empty => Ok(LabelImage::new(w, h)),
            Outcome::Fail => Err(DetectError::Backend("mock failure".to_string())),
        }
    }
}

/// Slide of uniform color that refuses regions starting right of `fail_from_x`
pub struct MockRegionReader {
    metadata: SlideMetadata,
    fail_from_x: i64,
    pub requests: Mutex<Vec<BoundingBox>>,
}

impl MockRegionReader {
    pub fn new(name: &str, fail_from_x: i64) -> Self {
        Self {
            metadata: SlideMetadata {
                name: name.to_string(),
                width: 2000,
                height: 2000,
                vendor: None,
                mpp_x: Some(0.25),
                mpp_y: Some(0.25),
            },
            fail_from_x,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl RegionReader for MockRegionReader {
    fn metadata(&self) -> &SlideMetadata {
        &self.metadata
    }

    fn read_region(&self, region: &BoundingBox) -> Result<RgbImage, SlideError> {
        self.requests.lock().unwrap().push(*region);
        if region.x >= self.fail_from_x {
            return Err(SlideError::ReadError {
                region: *region,
                message: "mock read failure".to_string(),
            });
        }
        Ok(RgbImage::from_pixel(
            region.width as u32,
            region.height as u32,
            Rgb([230, 180, 200]),
        ))
    }
}

/// QuPath-style feature for a square cell with a smaller square nucleus
pub fn square_feature(cx: f64, cy: f64, class: Option<&str>, area: f64) -> String {
    let ring = |half: f64| {
        format!(
            "[[[{x0}, {y0}], [{x1}, {y0}], [{x1}, {y1}], [{x0}, {y1}], [{x0}, {y0}]]]",
            x0 = cx - half,
            y0 = cy - half,
            x1 = cx + half,
            y1 = cy + half
        )
    };
    let classification = class
        .map(|name| format!(r#""classification": {{"name": "{name}"}},"#))
        .unwrap_or_default();
    format!(
        r#"{{
            "type": "Feature",
            "geometry": {{"type": "Polygon", "coordinates": {cell}}},
            "nucleusGeometry": {{"type": "Polygon", "coordinates": {nucleus}}},
            "properties": {{
                {classification}
                "measurements": [{{"name": "Nucleus: Area", "value": {area}}}]
            }}
        }}"#,
        cell = ring(8.0),
        nucleus = ring(4.0),
    )
}

/// GeoJSON feature array
pub fn feature_array(features: &[String]) -> String {
    format!("[{}]", features.join(","))
}
