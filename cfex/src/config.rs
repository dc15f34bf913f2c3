//! Run configuration
//!
//! Defaults are overlaid with `CFEX_*` environment variables, and the CLI
//! overrides both.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mask::{DEFAULT_EXPANSION_SIZE, MaskKind};

/// Errors raised while resolving configuration, before any processing starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported {kind} backend: {name}")]
    UnsupportedBackend { kind: &'static str, name: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid value for {setting}: {value}")]
    Invalid { setting: &'static str, value: String },
}

/// Parse a finite floating point setting; NaN and infinities are rejected
pub fn parse_finite(val: &str) -> Option<f64> {
    val.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Main run configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Slide reading configuration
    pub slide: SlideConfig,

    /// Nucleus segmentation configuration
    pub detection: DetectionConfig,

    /// Mask derivation configuration
    pub mask: MaskConfig,

    /// Cell image export configuration
    pub export: ExportConfig,

    /// Feature measurement configuration
    pub features: FeatureConfig,
}

/// Slide-related configuration
#[derive(Debug, Clone)]
pub struct SlideConfig {
    /// Loader backend name
    pub backend: String,
    /// Distance from the cell centroid to each side of its crop
    pub bounding_box_margin: u32,
    /// OpenSlide reader settings
    pub openslide: OpenSlideConfig,
}

/// OpenSlide reader settings
#[derive(Debug, Clone)]
pub struct OpenSlideConfig {
    /// Channel value for crop pixels outside the slide
    pub fill_value: u8,
}

/// Segmentation-related configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Segmentation backend name
    pub backend: String,
    /// Deadline for a single crop
    pub timeout: Duration,
    /// Abort the batch at the first failing crop
    pub fail_fast: bool,
    /// StarDist worker settings
    pub stardist: StarDistConfig,
}

/// StarDist worker settings
#[derive(Debug, Clone)]
pub struct StarDistConfig {
    /// Python interpreter
    pub program: String,
    /// Worker script
    pub script: PathBuf,
    /// Pretrained model name
    pub model: String,
    /// Lower normalisation percentile
    pub percentile_low: f64,
    /// Upper normalisation percentile
    pub percentile_high: f64,
    /// Deadline for loading the model
    pub startup_timeout: Duration,
}

/// Mask derivation configuration
#[derive(Debug, Clone)]
pub struct MaskConfig {
    /// Outward offset of the nucleus contour, in pixels
    pub expansion_size: f64,
}

/// Export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Parent directory of the timestamped cell image directory
    pub path: PathBuf,
    /// Mask kinds written next to each cell image
    pub masks: Vec<MaskKind>,
}

/// Feature measurement configuration
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Feature backend name
    pub backend: String,
    /// Directory for measurement tables; features are skipped when unset
    pub output_path: Option<PathBuf>,
    /// CellProfiler settings
    pub cellprofiler: CellProfilerConfig,
}

/// CellProfiler settings
#[derive(Debug, Clone)]
pub struct CellProfilerConfig {
    /// CellProfiler executable
    pub program: String,
    /// Arguments placed before the CellProfiler flags, e.g. `-m cellprofiler`
    pub args: Vec<String>,
    /// Pipeline file; features are skipped when unset
    pub pipeline: Option<PathBuf>,
    /// Deadline for one pipeline run
    pub timeout: Duration,
}

impl Default for SlideConfig {
    fn default() -> Self {
        Self {
            backend: "openslide".to_string(),
            bounding_box_margin: 50,
            openslide: OpenSlideConfig::default(),
        }
    }
}

impl Default for OpenSlideConfig {
    fn default() -> Self {
        Self { fill_value: 255 }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            backend: "stardist".to_string(),
            timeout: Duration::from_secs(120),
            fail_fast: false,
            stardist: StarDistConfig::default(),
        }
    }
}

impl Default for StarDistConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/scripts/stardist_worker.py"
            )),
            model: "2D_versatile_he".to_string(),
            percentile_low: 1.0,
            percentile_high: 99.8,
            startup_timeout: Duration::from_secs(300),
        }
    }
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            expansion_size: DEFAULT_EXPANSION_SIZE,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            masks: vec![MaskKind::Nucleus, MaskKind::Outline],
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            backend: "cellprofiler".to_string(),
            output_path: None,
            cellprofiler: CellProfilerConfig::default(),
        }
    }
}

impl Default for CellProfilerConfig {
    fn default() -> Self {
        Self {
            program: "cellprofiler".to_string(),
            args: Vec::new(),
            pipeline: None,
            timeout: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Slide config
        if let Ok(name) = env::var("CFEX_LOADER_BACKEND")
            && !name.is_empty()
        {
            config.slide.backend = name;
        }
        if let Ok(val) = env::var("CFEX_BOUNDING_BOX_MARGIN")
            && let Ok(margin) = val.parse()
        {
            config.slide.bounding_box_margin = margin;
        }
        if let Ok(val) = env::var("CFEX_FILL_VALUE")
            && let Ok(v) = val.parse()
        {
            config.slide.openslide.fill_value = v;
        }

        // Detection config
        if let Ok(name) = env::var("CFEX_SEGMENTATION_BACKEND")
            && !name.is_empty()
        {
            config.detection.backend = name;
        }
        if let Ok(val) = env::var("CFEX_SEGMENTATION_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.detection.timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("CFEX_FAIL_FAST") {
            config.detection.fail_fast = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(program) = env::var("CFEX_STARDIST_PROGRAM")
            && !program.is_empty()
        {
            config.detection.stardist.program = program;
        }
        if let Ok(path) = env::var("CFEX_STARDIST_SCRIPT")
            && !path.is_empty()
        {
            config.detection.stardist.script = PathBuf::from(path);
        }
        if let Ok(model) = env::var("CFEX_STARDIST_MODEL")
            && !model.is_empty()
        {
            config.detection.stardist.model = model;
        }
        if let Ok(val) = env::var("CFEX_STARDIST_STARTUP_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.detection.stardist.startup_timeout = Duration::from_secs(secs);
        }

        // Mask config
        if let Ok(val) = env::var("CFEX_EXPANSION_SIZE")
            && let Some(size) = parse_finite(&val)
        {
            config.mask.expansion_size = size;
        }

        // Export config
        if let Ok(path) = env::var("CFEX_EXPORT_PATH")
            && !path.is_empty()
        {
            config.export.path = PathBuf::from(path);
        }
        if let Ok(val) = env::var("CFEX_EXPORT_MASKS")
            && let Ok(kinds) = val
                .split(',')
                .map(|kind| kind.trim().parse::<MaskKind>())
                .collect::<Result<Vec<_>, _>>()
        {
            config.export.masks = kinds;
        }

        // Feature config
        if let Ok(name) = env::var("CFEX_FEATURES_BACKEND")
            && !name.is_empty()
        {
            config.features.backend = name;
        }
        if let Ok(path) = env::var("CFEX_OUTPUT_PATH")
            && !path.is_empty()
        {
            config.features.output_path = Some(PathBuf::from(path));
        }
        if let Ok(program) = env::var("CFEX_CELLPROFILER_PROGRAM")
            && !program.is_empty()
        {
            config.features.cellprofiler.program = program;
        }
        if let Ok(args) = env::var("CFEX_CELLPROFILER_ARGS") {
            config.features.cellprofiler.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(path) = env::var("CFEX_CELLPROFILER_PIPELINE")
            && !path.is_empty()
        {
            config.features.cellprofiler.pipeline = Some(PathBuf::from(path));
        }
        if let Ok(val) = env::var("CFEX_CELLPROFILER_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.features.cellprofiler.timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Reject settings that would silently produce meaningless output
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mask.expansion_size.is_finite() {
            return Err(ConfigError::Invalid {
                setting: "expansion size",
                value: self.mask.expansion_size.to_string(),
            });
        }
        Ok(())
    }

    /// Whether the feature measurement stage has everything it needs
    pub fn features_enabled(&self) -> bool {
        self.features.output_path.is_some() && self.features.cellprofiler.pipeline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.slide.bounding_box_margin, 50);
        assert_eq!(config.slide.openslide.fill_value, 255);
        assert_eq!(config.mask.expansion_size, 6.0);
        assert_eq!(config.detection.timeout, Duration::from_secs(120));
        assert_eq!(config.detection.stardist.model, "2D_versatile_he");
        assert_eq!(config.detection.stardist.percentile_low, 1.0);
        assert_eq!(config.detection.stardist.percentile_high, 99.8);
        assert_eq!(
            config.export.masks,
            vec![MaskKind::Nucleus, MaskKind::Outline]
        );
        assert_eq!(
            config.features.cellprofiler.timeout,
            Duration::from_secs(3600)
        );
        assert!(!config.features_enabled());
    }

    #[test]
    fn test_config_from_env() {
        // No CFEX_* variables are set in the test environment
        let config = Config::from_env();
        assert_eq!(config.slide.backend, "openslide");
        assert_eq!(config.detection.backend, "stardist");
        assert_eq!(config.features.backend, "cellprofiler");
    }

    #[test]
    fn test_parse_finite() {
        assert_eq!(parse_finite(" 4.5 "), Some(4.5));
        assert_eq!(parse_finite("0"), Some(0.0));
        assert_eq!(parse_finite("NaN"), None);
        assert_eq!(parse_finite("inf"), None);
        assert_eq!(parse_finite("-infinity"), None);
        assert_eq!(parse_finite("six"), None);
    }

    #[test]
    fn test_validate_rejects_non_finite_expansion() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());
        for size in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            config.mask.expansion_size = size;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { setting: "expansion size", .. })
            ));
        }
    }

    #[test]
    fn test_features_enabled_needs_pipeline_and_output() {
        let mut config = Config::default();
        config.features.output_path = Some(PathBuf::from("/tmp/out"));
        assert!(!config.features_enabled());
        config.features.cellprofiler.pipeline = Some(PathBuf::from("measure.cppipe"));
        assert!(config.features_enabled());
    }
}
