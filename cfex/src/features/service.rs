//! FeatureExtractor trait definition

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::types::FeatureError;

/// Trait for feature measurement backends
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Measure every cell in `cell_images` and write the filtered feature
    /// table under `output`, returning its path
    async fn extract(&self, cell_images: &Path, output: &Path) -> Result<PathBuf, FeatureError>;
}
