//! Cell image and mask writer

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{ImageBuffer, Luma, RgbImage};
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::mask::{BinaryMask, MaskKind};

use super::types::{ExportError, ExportSummary, ExportedCell};

const INDEX_FILE_NAME: &str = "cells.csv";
const UNDETECTED_DIR_NAME: &str = "undetected";

/// Directory name for one export run, e.g. `cells_20240131T154502.123`
pub fn timestamped_dir_name(now: DateTime<Local>) -> String {
    format!("cells_{}", now.format("%Y%m%dT%H%M%S%.3f"))
}

/// File stem shared by a cell's image and masks:
/// `cell{index}_{target}_{x}_{y}_{slide}`, with `n` for unclassified cells
pub fn cell_file_stem(index: usize, target: Option<&str>, centroid: (i64, i64), slide: &str) -> String {
    format!(
        "cell{}_{}_{}_{}_{}",
        index,
        target.unwrap_or("n"),
        centroid.0,
        centroid.1,
        slide
    )
}

/// Mask pixels widened to 16 bits
fn to_u16(mask: &BinaryMask) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    ImageBuffer::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([u16::from(mask.get_pixel(x, y).0[0])])
    })
}

/// Writes cell crops and masks for one run
#[derive(Debug, Clone)]
pub struct ExportWriter {
    root: PathBuf,
    masks: Vec<MaskKind>,
}

impl ExportWriter {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            root: config.path.clone(),
            masks: config.masks.clone(),
        }
    }

    /// Mask kinds written per cell
    pub fn masks(&self) -> &[MaskKind] {
        &self.masks
    }

    /// Write every cell into a fresh timestamped directory under the export
    /// path.
    ///
    /// `measurement_names` are the columns added to the index for cells that
    /// carry measurements.
    pub fn write(
        &self,
        slide: &str,
        cells: &[ExportedCell<'_>],
        measurement_names: &[String],
        progress: &ProgressBar,
    ) -> Result<ExportSummary, ExportError> {
        let dir = self.root.join(timestamped_dir_name(Local::now()));
        std::fs::create_dir_all(&dir)?;
        info!("Saving {} cell images to {}", cells.len(), dir.display());

        let index_path = dir.join(INDEX_FILE_NAME);
        let mut index = csv::Writer::from_path(&index_path)?;
        let mut header: Vec<&str> = vec!["Index", "FileName", "Target", "CentroidX", "CentroidY", "SlideName"];
        header.extend(measurement_names.iter().map(String::as_str));
        index.write_record(&header)?;

        for cell in cells {
            let stem = self.write_cell(&dir, slide, cell)?;
            let (cx, cy) = nucleus_centroid(cell)?;

            let mut row = vec![
                cell.index.to_string(),
                format!("{stem}.png"),
                cell.geometry.target.clone().unwrap_or_default(),
                cx.to_string(),
                cy.to_string(),
                slide.to_string(),
            ];
            if let Some(measurements) = &cell.geometry.measurements {
                row.extend(measurement_names.iter().map(|name| {
                    measurements.get(name).map(f64::to_string).unwrap_or_default()
                }));
            } else {
                row.extend(measurement_names.iter().map(|_| String::new()));
            }
            index.write_record(&row)?;
            progress.inc(1);
        }
        index.flush()?;
        progress.finish();

        Ok(ExportSummary {
            dir,
            written: cells.len(),
            index_path,
        })
    }

    /// Write off-center crops rendered with their labels into
    /// `<dir>/undetected` for manual review
    pub fn write_overlays(&self, dir: &Path, overlays: &BTreeMap<usize, RgbImage>) -> Result<usize, ExportError> {
        if overlays.is_empty() {
            return Ok(0);
        }
        let undetected = dir.join(UNDETECTED_DIR_NAME);
        std::fs::create_dir_all(&undetected)?;
        for (index, overlay) in overlays {
            overlay.save(undetected.join(format!("cell{index}_overlay.png")))?;
        }
        info!("Saved {} off-center cells to {}", overlays.len(), undetected.display());
        Ok(overlays.len())
    }

    /// Write one cell's crop and requested masks, returning the file stem
    fn write_cell(&self, dir: &Path, slide: &str, cell: &ExportedCell<'_>) -> Result<String, ExportError> {
        let centroid = nucleus_centroid(cell)?;
        let stem = cell_file_stem(cell.index, cell.geometry.target.as_deref(), centroid, slide);

        let image_path = dir.join(format!("{stem}.png"));
        cell.image.save(&image_path)?;
        debug!("Wrote {}", image_path.display());

        for kind in &self.masks {
            let mask_path = dir.join(format!("{}_{}.tif", stem, kind.column_name()));
            to_u16(cell.masks.get(*kind)).save(&mask_path)?;
        }
        Ok(stem)
    }
}

fn nucleus_centroid(cell: &ExportedCell<'_>) -> Result<(i64, i64), ExportError> {
    cell.geometry
        .nucleus_centroid()
        .map(|p| p.truncated())
        .ok_or(ExportError::EmptyNucleusPolygon { index: cell.index })
}
