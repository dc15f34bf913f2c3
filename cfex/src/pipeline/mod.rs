//! End-to-end cell feature extraction
//!
//! Sequences extraction, crop loading, segmentation, mask derivation, export
//! and feature measurement for one slide.

mod reporter;
mod runner;
mod types;

pub use reporter::Reporter;
pub use runner::{Pipeline, RunInput, Stages};
pub use types::{CellFailure, PipelineError, RunSummary, Stage};
