//! Segmenter trait definition

use async_trait::async_trait;
use image::RgbImage;

use super::types::DetectError;
use crate::mask::LabelImage;

/// Nucleus instance-segmentation backend
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Make the backend ready to answer requests, e.g. load a model.
    ///
    /// Called before each crop, outside the per-crop deadline. Backends
    /// that are always ready keep the default.
    async fn start(&self) -> Result<(), DetectError> {
        Ok(())
    }

    /// Segment one RGB crop into an integer label image of the same size
    async fn segment(&self, image: &RgbImage) -> Result<LabelImage, DetectError>;
}
