//! Mask engine
//!
//! Derives the three per-cell masks from a nucleus instance label image:
//! - Nucleus: pixels carrying the label found at the image center
//! - Expansion: the nucleus dilated outward by a fixed margin
//! - Outline: expansion minus nucleus

mod contour;
pub mod engine;
pub mod offset;
mod raster;
mod types;

pub use engine::{
    DEFAULT_EXPANSION_SIZE, MaskEngine, expansion_mask, nucleus_mask, outline_mask,
};
pub use offset::{OffsetRegion, offset_polygon};
pub use types::{BinaryMask, LabelImage, MaskError, MaskKind, ObjectMasks, ObjectMasksTable};
