//! CellProfiler feature backend
//!
//! Runs a headless CellProfiler pipeline over exported cell images and
//! masks, collects its `exported_*.csv` tables and reduces the object tables
//! to one filtered feature table.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CellProfilerConfig;

use super::service::FeatureExtractor;
use super::table::{ObjectTable, merge_object_tables};
use super::types::FeatureError;

/// Tables written by the measurement pipeline
const EXPORTED_TABLES: &[&str] = &[
    "Experiment",
    "Image",
    "Nucleus",
    "NucleusObject",
    "Outline",
    "OutlineObject",
];

/// Object tables reduced into the feature table
const OBJECT_TABLES: &[&str] = &["NucleusObject", "OutlineObject"];

/// Input files of one pipeline run, as percent-encoded file URLs
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileBatch {
    pub png: Vec<String>,
    pub tif_nucleus: Vec<String>,
    pub tif_outline: Vec<String>,
}

impl FileBatch {
    /// Collect images and masks from an export directory, sorted by name
    pub fn collect(dir: &Path) -> Result<Self, FeatureError> {
        let dir = dir.canonicalize()?;
        let mut batch = FileBatch::default();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let url = Url::from_file_path(&path)
                .map_err(|()| FeatureError::InvalidPath(path.clone()))?
                .to_string();
            if name.ends_with(".png") {
                batch.png.push(url);
            } else if name.ends_with("NucleusMask.tif") {
                batch.tif_nucleus.push(url);
            } else if name.ends_with("OutlineMask.tif") {
                batch.tif_outline.push(url);
            }
        }
        batch.png.sort();
        batch.tif_nucleus.sort();
        batch.tif_outline.sort();

        info!(
            "Images: {}, nucleus masks: {}, outline masks: {}",
            batch.png.len(),
            batch.tif_nucleus.len(),
            batch.tif_outline.len()
        );
        if batch.png.is_empty() {
            return Err(FeatureError::NoImages(dir));
        }
        Ok(batch)
    }

    /// One URL per line, in the order CellProfiler should load them
    fn file_list(&self) -> String {
        let mut list = String::new();
        for url in self.png.iter().chain(&self.tif_nucleus).chain(&self.tif_outline) {
            list.push_str(url);
            list.push('\n');
        }
        list
    }
}

/// Feature extraction through the CellProfiler command line
pub struct CellProfiler {
    config: CellProfilerConfig,
    pipeline: PathBuf,
}

impl CellProfiler {
    pub fn new(config: CellProfilerConfig, pipeline: PathBuf) -> Self {
        Self { config, pipeline }
    }

    /// Run the pipeline for one batch and move its tables into
    /// `<output>/pipeline` with the batch suffix
    async fn run_batch(&self, batch: &FileBatch, number: usize, output: &Path) -> Result<(), FeatureError> {
        let pipeline_dir = output.join("pipeline");
        std::fs::create_dir_all(&pipeline_dir)?;

        let list_path = pipeline_dir.join(format!("file_list_{number}.txt"));
        std::fs::write(&list_path, batch.file_list())?;

        info!(
            "Running pipeline: {}",
            self.pipeline.file_name().and_then(|n| n.to_str()).unwrap_or("?")
        );
        let start = Instant::now();
        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg("-c")
            .arg("-r")
            .arg("-p")
            .arg(&self.pipeline)
            .arg("-o")
            .arg(output)
            .arg("--file-list")
            .arg(&list_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| FeatureError::Timeout(self.config.timeout))??;
        debug!("Pipeline finished in {:?}", start.elapsed());

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(FeatureError::Backend {
                status: result.status.code(),
                message: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }

        for table in EXPORTED_TABLES {
            let exported = output.join(format!("exported_{table}.csv"));
            let target = pipeline_dir.join(format!("exported_{table}_{number}.csv"));
            if let Err(e) = std::fs::rename(&exported, &target) {
                let contents = output.join(format!("measure_cells_batch_{number}_contents.json"));
                std::fs::write(&contents, serde_json::to_string_pretty(batch)?)?;
                warn!(
                    "Processing of batch {} did not succeed ({}), batch contents in {}",
                    number,
                    e,
                    contents.display()
                );
                return Err(FeatureError::MissingExport {
                    table: table.to_string(),
                    batch: number,
                    contents,
                });
            }
        }
        Ok(())
    }

    /// Reduce the object tables of every batch into the filtered table
    fn filter(&self, batches: usize, output: &Path) -> Result<PathBuf, FeatureError> {
        let pipeline_dir = output.join("pipeline");
        let mut tables = Vec::with_capacity(OBJECT_TABLES.len());
        for object in OBJECT_TABLES {
            info!("Processing {} data", object);
            let mut table = ObjectTable::new(object);
            for number in 0..batches {
                let path = pipeline_dir.join(format!("exported_{object}_{number}.csv"));
                table.append(ObjectTable::read(&path, object)?);
            }
            tables.push(table);
        }
        merge_object_tables(&tables, output)
    }
}

#[async_trait]
impl FeatureExtractor for CellProfiler {
    fn name(&self) -> &'static str {
        "cellprofiler"
    }

    async fn extract(&self, cell_images: &Path, output: &Path) -> Result<PathBuf, FeatureError> {
        std::fs::create_dir_all(output)?;
        let batches = [FileBatch::collect(cell_images)?];
        for (number, batch) in batches.iter().enumerate() {
            self.run_batch(batch, number, output).await?;
        }
        self.filter(batches.len(), output)
    }
}
