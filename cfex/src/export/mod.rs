//! Cell image export
//!
//! Writes each cell's color crop and masks into a timestamped directory, plus
//! a `cells.csv` index.

mod types;
mod writer;

pub use types::{ExportError, ExportSummary, ExportedCell};
pub use writer::{ExportWriter, cell_file_stem, timestamped_dir_name};
