//! Pipeline result types and error definitions

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::annotation::AnnotationError;
use crate::config::ConfigError;
use crate::detect::DetectError;
use crate::export::ExportError;
use crate::features::FeatureError;
use crate::mask::MaskError;
use crate::slide::SlideError;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    #[error(transparent)]
    Slide(#[from] SlideError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Stage at which a single cell dropped out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Detect,
    Mask,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Detect => "detect",
            Stage::Mask => "mask",
        };
        f.write_str(name)
    }
}

/// One cell that could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellFailure {
    /// Position of the cell in the annotation data
    pub index: usize,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for CellFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell {} ({}): {}", self.index, self.stage, self.message)
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Cells read from the annotation data
    pub total: usize,
    /// Crops whose center pixel is a nucleus
    pub centered: usize,
    /// Crops whose center pixel is background
    pub off_center: usize,
    /// Cells written by the export stage
    pub exported: usize,
    pub failed: Vec<CellFailure>,
    pub export_dir: Option<PathBuf>,
    pub features_csv: Option<PathBuf>,
}

impl RunSummary {
    /// Whether every cell made it through
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
