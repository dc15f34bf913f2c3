//! Pipeline orchestration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::annotation::{CellGeometry, measurement_names};
use crate::backend::Backends;
use crate::config::{Config, ConfigError};
use crate::detect::{BatchMode, CellDetector, DetectError, Segmenter};
use crate::export::{ExportWriter, ExportedCell};
use crate::features::FeatureExtractor;
use crate::mask::{LabelImage, MaskEngine, MaskError, ObjectMasks};
use crate::slide::{RegionReader, load_cell_images};

use super::reporter::Reporter;
use super::types::{CellFailure, PipelineError, RunSummary, Stage};

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunInput {
    /// Whole-slide image
    pub wsi: PathBuf,
    /// Cell annotation export
    pub data: PathBuf,
    /// Keep at most this many cells
    pub size: Option<usize>,
    /// Carry the annotation measurements into the cell index
    pub extract_measurements: bool,
}

/// Stage implementations used by a run
pub struct Stages {
    pub reader: Arc<dyn RegionReader>,
    pub segmenter: Arc<dyn Segmenter>,
    pub features: Option<Arc<dyn FeatureExtractor>>,
}

/// Per-cell state carried between stages
struct CellRecord {
    index: usize,
    geometry: CellGeometry,
    image: Option<RgbImage>,
    labels: Option<LabelImage>,
    masks: Option<ObjectMasks>,
}

/// Cell feature extraction pipeline for one slide
pub struct Pipeline {
    config: Config,
    backends: Backends,
    reporter: Reporter,
}

impl Pipeline {
    /// Validate settings and resolve backends; bad values and unknown names
    /// fail here, before any processing
    pub fn new(config: Config, reporter: Reporter) -> Result<Self, PipelineError> {
        config.validate()?;
        let backends = Backends::from_config(&config)?;
        Ok(Self {
            config,
            backends,
            reporter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open the slide, start the configured backends and run every stage
    pub async fn run(&self, input: &RunInput) -> Result<RunSummary, PipelineError> {
        for path in [&input.wsi, &input.data] {
            if !path.exists() {
                return Err(ConfigError::PathNotFound(path.clone()).into());
            }
        }
        if let Some(pipeline) = &self.config.features.cellprofiler.pipeline
            && !pipeline.exists()
        {
            return Err(ConfigError::PathNotFound(pipeline.clone()).into());
        }

        let wsi = input.wsi.clone();
        let loader = self.backends.loader.clone();
        let reader = tokio::task::spawn_blocking(move || loader.open(&wsi)).await??;
        let segmenter = self.backends.segmentation.build()?;
        let features = if self.config.features_enabled() {
            self.backends.features.build()
        } else {
            None
        };

        self.run_with(
            input,
            Stages {
                reader,
                segmenter,
                features,
            },
        )
        .await
    }

    /// Run every stage with the given implementations
    pub async fn run_with(&self, input: &RunInput, stages: Stages) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();

        // Extraction and crop loading
        self.reporter.stage("loading input data");
        info!("WSI path: {}", input.wsi.display());
        info!("Cell data path: {}", input.data.display());
        let data = input.data.clone();
        let format = self.backends.annotation;
        let (extract, size) = (input.extract_measurements, input.size);
        let geometries = tokio::task::spawn_blocking(move || format.read(&data, extract, size)).await??;
        summary.total = geometries.len();
        let names = if input.extract_measurements {
            measurement_names(&geometries)
        } else {
            Vec::new()
        };
        let slide = stages.reader.metadata().name.clone();

        let reader = Arc::clone(&stages.reader);
        let margin = self.config.slide.bounding_box_margin;
        let bar = self.reporter.progress(geometries.len(), "loading");
        let (geometries, crops) = tokio::task::spawn_blocking(move || {
            let crops = load_cell_images(reader.as_ref(), &geometries, margin, &bar);
            (geometries, crops)
        })
        .await?;

        let mut records = Vec::with_capacity(geometries.len());
        for (index, (geometry, crop)) in geometries.into_iter().zip(crops).enumerate() {
            let image = match crop {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("{}", e);
                    summary.failed.push(CellFailure {
                        index,
                        stage: Stage::Load,
                        message: e.to_string(),
                    });
                    None
                }
            };
            records.push(CellRecord {
                index,
                geometry,
                image,
                labels: None,
                masks: None,
            });
        }

        // Segmentation
        self.reporter.stage("instance segmentation");
        let mode = if self.config.detection.fail_fast {
            BatchMode::FailFast
        } else {
            BatchMode::Continue
        };
        let detector = CellDetector::new(stages.segmenter, self.config.detection.timeout, mode);
        let loaded: Vec<usize> = (0..records.len())
            .filter(|&i| records[i].image.is_some())
            .collect();
        let images: Vec<RgbImage> = loaded
            .iter()
            .filter_map(|&i| records[i].image.clone())
            .collect();
        let bar = self.reporter.progress(images.len(), "segmenting");
        let detections = detector
            .detect(&images, true, &bar)
            .await
            .map_err(|e| reindex(e, &loaded))?;
        drop(images);

        summary.centered = detections.centered_count();
        summary.off_center = detections.off_center_count();
        for (position, error) in &detections.failures {
            let index = loaded[*position];
            summary.failed.push(CellFailure {
                index,
                stage: Stage::Detect,
                message: cause(error),
            });
        }
        let overlays: BTreeMap<usize, RgbImage> = detections
            .off_center
            .unwrap_or_default()
            .into_iter()
            .map(|(position, overlay)| (loaded[position], overlay))
            .collect();
        for (position, labels) in detections.labels.into_iter().enumerate() {
            records[loaded[position]].labels = labels;
        }

        // Mask derivation
        self.reporter.stage("object mask generation");
        let engine = MaskEngine::new(self.config.mask.expansion_size);
        let labels: Vec<Option<LabelImage>> = records.iter_mut().map(|r| r.labels.take()).collect();
        let masks = tokio::task::spawn_blocking(move || derive_masks(&engine, &labels)).await?;
        for (record, result) in records.iter_mut().zip(masks) {
            match result {
                Some(Ok(masks)) => record.masks = Some(masks),
                Some(Err(e)) => {
                    warn!("Cell {}: {}", record.index, e);
                    summary.failed.push(CellFailure {
                        index: record.index,
                        stage: Stage::Mask,
                        message: e.to_string(),
                    });
                }
                None => {}
            }
        }

        // Export
        self.reporter.stage("export");
        let writer = ExportWriter::new(&self.config.export);
        let cells: Vec<ExportedCell<'_>> = records
            .iter()
            .filter_map(|record| {
                Some(ExportedCell {
                    index: record.index,
                    geometry: &record.geometry,
                    image: record.image.as_ref()?,
                    masks: record.masks.as_ref()?,
                })
            })
            .collect();
        let bar = self.reporter.progress(cells.len(), "exporting");
        let export = writer.write(&slide, &cells, &names, &bar)?;
        writer.write_overlays(&export.dir, &overlays)?;
        summary.exported = export.written;
        summary.export_dir = Some(export.dir.clone());

        // Feature measurement
        if let (Some(features), Some(output)) = (&stages.features, &self.config.features.output_path) {
            self.reporter.stage("extraction");
            info!("Extracting cell features with {}", features.name());
            summary.features_csv = Some(features.extract(&export.dir, output).await?);
        }

        summary.failed.sort_by_key(|f| f.index);
        info!(
            "Processed {} cells: {} exported, {} failed",
            summary.total,
            summary.exported,
            summary.failed.len()
        );
        Ok(summary)
    }
}

/// Derive masks for every segmented crop, in parallel, keeping positions
fn derive_masks(
    engine: &MaskEngine,
    labels: &[Option<LabelImage>],
) -> Vec<Option<Result<ObjectMasks, MaskError>>> {
    info!("Creating cell object masks");
    labels
        .par_iter()
        .map(|l| l.as_ref().map(|l| engine.derive(l)))
        .collect()
}

/// Replace a batch position with the cell's annotation index
fn reindex(error: DetectError, loaded: &[usize]) -> DetectError {
    match error {
        DetectError::Cell { index, source } => DetectError::Cell {
            index: loaded.get(index).copied().unwrap_or(index),
            source,
        },
        other => other,
    }
}

/// Underlying reason of a per-cell detection error
fn cause(error: &DetectError) -> String {
    match error {
        DetectError::Cell { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reindex_maps_batch_position() {
        let err = DetectError::Timeout(Duration::from_secs(1)).for_cell(1);
        match reindex(err, &[0, 4, 7]) {
            DetectError::Cell { index, .. } => assert_eq!(index, 4),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cause_strips_cell_wrapper() {
        let err = DetectError::Backend("model missing".to_string()).for_cell(2);
        assert_eq!(cause(&err), "Segmentation backend failed: model missing");
    }

    #[test]
    fn test_derive_masks_keeps_gaps() {
        let mut centered = LabelImage::new(9, 9);
        centered.put_pixel(4, 4, image::Luma([1]));
        let labels = vec![Some(centered), None, Some(LabelImage::new(9, 9))];
        let masks = derive_masks(&MaskEngine::default(), &labels);
        assert_eq!(masks.len(), 3);
        assert!(masks[0].as_ref().unwrap().as_ref().unwrap().has_nucleus());
        assert!(masks[1].is_none());
        assert!(!masks[2].as_ref().unwrap().as_ref().unwrap().has_nucleus());
    }
}
