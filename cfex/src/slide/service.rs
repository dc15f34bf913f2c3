//! RegionReader trait definition

use image::RgbImage;

use super::types::{SlideError, SlideMetadata};
use crate::geometry::BoundingBox;

/// Trait for slide sources that can serve level-0 regions
pub trait RegionReader: Send + Sync {
    /// Slide metadata
    fn metadata(&self) -> &SlideMetadata;

    /// Read a region in level-0 slide coordinates as RGB.
    ///
    /// The returned image always has the box's size; parts outside the slide
    /// are filled.
    fn read_region(&self, region: &BoundingBox) -> Result<RgbImage, SlideError>;

    /// Full resolution dimensions
    fn dimensions(&self) -> (u64, u64) {
        let metadata = self.metadata();
        (metadata.width, metadata.height)
    }
}
