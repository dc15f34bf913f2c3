use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use cfex::config::{Config, parse_finite};
use cfex::pipeline::{Pipeline, Reporter, RunInput, RunSummary};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Extract cell images, masks and features from a whole-slide image"
)]
struct Args {
    /// Whole-slide image
    #[arg(short, long)]
    wsi: PathBuf,

    /// Cell annotation export (QuPath GeoJSON)
    #[arg(short, long)]
    data: PathBuf,

    /// Process at most this many cells
    #[arg(short, long)]
    size: Option<usize>,

    /// Carry the annotation measurements into the cell index
    #[arg(short = 'm', long)]
    measurement_extraction: bool,

    /// Parent directory of the exported cell images
    #[arg(long)]
    cell_image_export_path: Option<PathBuf>,

    /// Directory for feature measurement tables
    #[arg(short, long)]
    output_path: Option<PathBuf>,

    /// CellProfiler pipeline file; features are measured only when set
    #[arg(long)]
    cell_profiler_pipeline_path: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(long)]
    silent: bool,

    /// Distance from the cell centroid to each side of its crop
    #[arg(long)]
    bounding_box_margin: Option<u32>,

    /// Outward offset of the nucleus contour, in pixels
    #[arg(long, value_parser = finite_f64)]
    expansion_size: Option<f64>,

    /// Abort at the first cell the segmentation backend fails on
    #[arg(long)]
    fail_fast: bool,

    /// Nucleus segmentation backend
    #[arg(long)]
    segmentation_backend: Option<String>,

    /// Whole-slide image reader
    #[arg(long)]
    loader_backend: Option<String>,

    /// Feature measurement backend
    #[arg(long)]
    features_backend: Option<String>,

    /// Deadline for segmenting a single crop
    #[arg(long)]
    segmentation_timeout_secs: Option<u64>,
}

fn finite_f64(val: &str) -> Result<f64, String> {
    parse_finite(val).ok_or_else(|| format!("{val:?} is not a finite number"))
}

impl Args {
    /// Overlay the command line onto the environment configuration
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.cell_image_export_path {
            config.export.path = path.clone();
        }
        if let Some(path) = &self.output_path {
            config.features.output_path = Some(path.clone());
        }
        if let Some(path) = &self.cell_profiler_pipeline_path {
            config.features.cellprofiler.pipeline = Some(path.clone());
        }
        if let Some(margin) = self.bounding_box_margin {
            config.slide.bounding_box_margin = margin;
        }
        if let Some(size) = self.expansion_size {
            config.mask.expansion_size = size;
        }
        if self.fail_fast {
            config.detection.fail_fast = true;
        }
        if let Some(name) = &self.segmentation_backend {
            config.detection.backend = name.clone();
        }
        if let Some(name) = &self.loader_backend {
            config.slide.backend = name.clone();
        }
        if let Some(name) = &self.features_backend {
            config.features.backend = name.clone();
        }
        if let Some(secs) = self.segmentation_timeout_secs {
            config.detection.timeout = Duration::from_secs(secs);
        }
    }
}

/// Ensure a directory exists, creating it if necessary
fn ensure_directory(path: &Path, name: &str) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created {} directory: {:?}", name, path);
        Ok(())
    } else if path.is_dir() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} path {:?} exists but is not a directory", name, path),
        ))
    }
}

fn report(summary: &RunSummary) {
    info!(
        "Cells: {} total, {} centered, {} off-center, {} exported",
        summary.total, summary.centered, summary.off_center, summary.exported
    );
    if let Some(dir) = &summary.export_dir {
        info!("Cell images: {}", dir.display());
    }
    if let Some(csv) = &summary.features_csv {
        info!("Cell features: {}", csv.display());
    }
    for failure in &summary.failed {
        warn!("Failed {}", failure);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize tracing
    let default_filter = if args.silent { "cfex=warn" } else { "cfex=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Environment first, command line on top
    let mut config = Config::from_env();
    args.apply(&mut config);
    info!(
        "Loaded configuration: loader={}, segmentation={}, margin={}, expansion={}",
        config.slide.backend,
        config.detection.backend,
        config.slide.bounding_box_margin,
        config.mask.expansion_size
    );

    ensure_directory(&config.export.path, "cell image export")?;
    if let Some(output) = &config.features.output_path {
        ensure_directory(output, "output")?;
    }
    if config.features.output_path.is_some() != config.features.cellprofiler.pipeline.is_some() {
        warn!("Feature measurement needs both --output-path and --cell-profiler-pipeline-path; skipping it");
    }

    let pipeline = Pipeline::new(config, Reporter::new(args.silent))?;
    let input = RunInput {
        wsi: args.wsi.clone(),
        data: args.data.clone(),
        size: args.size,
        extract_measurements: args.measurement_extraction,
    };

    let summary = pipeline.run(&input).await?;
    report(&summary);

    if summary.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{} of {} cells failed", summary.failed.len(), summary.total);
        Ok(ExitCode::FAILURE)
    }
}
