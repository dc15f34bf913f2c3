//! Local slide reader using OpenSlide

use std::path::Path;

use image::{Rgb, RgbImage, RgbaImage};
use openslide_rs::{Address, OpenSlide, Region, Size};
use tracing::{debug, info};

use crate::config::OpenSlideConfig;
use crate::geometry::BoundingBox;

use super::service::RegionReader;
use super::types::{SlideError, SlideMetadata, slide_name};

/// Read the part of `region` that lies inside `bounds` and place it on a
/// canvas of the full region size filled with `fill_value`.
///
/// `read` receives the visible part, in the same coordinates as `region`, and
/// must return an image of exactly that size.
pub fn compose_region<F>(
    region: &BoundingBox,
    bounds: &BoundingBox,
    fill_value: u8,
    read: F,
) -> Result<RgbImage, SlideError>
where
    F: FnOnce(&BoundingBox) -> Result<RgbImage, SlideError>,
{
    let mut canvas = RgbImage::from_pixel(
        region.width as u32,
        region.height as u32,
        Rgb([fill_value; 3]),
    );
    let Some(visible) = region.intersection(bounds) else {
        debug!("Region {:?} lies outside the slide", region);
        return Ok(canvas);
    };

    let part = read(&visible)?;
    if visible != *region {
        debug!("Padding region {:?} to {:?}", visible, region);
    }
    image::imageops::replace(&mut canvas, &part, visible.x - region.x, visible.y - region.y);
    Ok(canvas)
}

/// Blend premultiplied RGBA over an opaque background
fn flatten_rgba(rgba: &RgbaImage, fill_value: u8) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let background = u16::from(fill_value) * u16::from(255 - a) / 255;
        let blend = |c: u8| (u16::from(c) + background).min(255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Slide reader backed by a local OpenSlide handle
pub struct OpenSlideReader {
    slide: OpenSlide,
    metadata: SlideMetadata,
    fill_value: u8,
}

impl OpenSlideReader {
    /// Open a slide file
    pub fn open(path: &Path, config: &OpenSlideConfig) -> Result<Self, SlideError> {
        if !path.is_file() {
            return Err(SlideError::NotFound(path.display().to_string()));
        }

        let slide = OpenSlide::new(path)
            .map_err(|e| SlideError::OpenError(format!("Failed to open {:?}: {}", path, e)))?;

        let (width, height) = slide
            .get_level_dimensions(0)
            .map(|d| (d.w as u64, d.h as u64))
            .map_err(|e| SlideError::OpenError(format!("No level 0 in {:?}: {}", path, e)))?;

        let vendor = slide.get_property_value("openslide.vendor").ok();

        let mpp_x = slide
            .get_property_value("openslide.mpp-x")
            .ok()
            .and_then(|s| s.parse().ok());

        let mpp_y = slide
            .get_property_value("openslide.mpp-y")
            .ok()
            .and_then(|s| s.parse().ok());

        let metadata = SlideMetadata {
            name: slide_name(path),
            width,
            height,
            vendor,
            mpp_x,
            mpp_y,
        };
        info!(
            "Opened slide {} ({}x{}, vendor {:?})",
            metadata.name, width, height, metadata.vendor
        );

        Ok(Self {
            slide,
            metadata,
            fill_value: config.fill_value,
        })
    }
}

impl RegionReader for OpenSlideReader {
    fn metadata(&self) -> &SlideMetadata {
        &self.metadata
    }

    fn read_region(&self, region: &BoundingBox) -> Result<RgbImage, SlideError> {
        compose_region(region, &self.metadata.bounds(), self.fill_value, |visible| {
            let request = Region {
                address: Address {
                    x: visible.x as u32,
                    y: visible.y as u32,
                },
                level: 0,
                size: Size {
                    w: visible.width as u32,
                    h: visible.height as u32,
                },
            };
            let rgba = self
                .slide
                .read_image_rgba(&request)
                .map_err(|e| SlideError::ReadError {
                    region: *visible,
                    message: e.to_string(),
                })?;
            Ok(flatten_rgba(&rgba, self.fill_value))
        })
    }
}
