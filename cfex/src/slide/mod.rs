//! Slide module for reading cell crops from whole-slide images
//!
//! This module provides:
//! - `RegionReader` trait for abstracting slide sources
//! - `OpenSlideReader` for reading slides locally with OpenSlide
//! - `load_cell_images` for mapping cells to padded crops

mod loader;
mod local;
mod service;
mod types;

pub use loader::{cell_bounding_box, load_cell_images};
pub use local::{OpenSlideReader, compose_region};
pub use service::RegionReader;
pub use types::{SlideError, SlideMetadata, slide_name};
