//! Backend selection
//!
//! Every pluggable stage is a closed set of variants, each holding its own
//! configuration. Names are resolved once, before any processing starts.

use std::path::Path;
use std::sync::Arc;

use crate::annotation::{AnnotationError, CellGeometry, QuPathParser};
use crate::config::{
    CellProfilerConfig, Config, ConfigError, DetectionConfig, FeatureConfig, OpenSlideConfig,
    SlideConfig, StarDistConfig,
};
use crate::detect::{DetectError, Segmenter, StarDistSegmenter};
use crate::features::{CellProfiler, FeatureExtractor};
use crate::slide::{OpenSlideReader, RegionReader, SlideError};

/// Nucleus instance segmentation backends
#[derive(Debug, Clone)]
pub enum SegmentationBackend {
    StarDist(StarDistConfig),
}

impl SegmentationBackend {
    pub const NAMES: &'static [&'static str] = &["stardist"];

    pub fn from_name(name: &str, config: &DetectionConfig) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "stardist" => Ok(Self::StarDist(config.stardist.clone())),
            _ => Err(ConfigError::UnsupportedBackend {
                kind: "segmentation",
                name: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StarDist(_) => "stardist",
        }
    }

    pub fn build(&self) -> Result<Arc<dyn Segmenter>, DetectError> {
        match self {
            Self::StarDist(config) => Ok(Arc::new(StarDistSegmenter::new(config.clone())?)),
        }
    }
}

/// Whole-slide image readers
#[derive(Debug, Clone)]
pub enum ImageLoadBackend {
    OpenSlide(OpenSlideConfig),
}

impl ImageLoadBackend {
    pub const NAMES: &'static [&'static str] = &["openslide"];

    pub fn from_name(name: &str, config: &SlideConfig) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "openslide" => Ok(Self::OpenSlide(config.openslide.clone())),
            _ => Err(ConfigError::UnsupportedBackend {
                kind: "image loader",
                name: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenSlide(_) => "openslide",
        }
    }

    pub fn open(&self, path: &Path) -> Result<Arc<dyn RegionReader>, SlideError> {
        match self {
            Self::OpenSlide(config) => Ok(Arc::new(OpenSlideReader::open(path, config)?)),
        }
    }
}

/// Feature measurement backends
#[derive(Debug, Clone)]
pub enum FeatureBackend {
    CellProfiler(CellProfilerConfig),
}

impl FeatureBackend {
    pub const NAMES: &'static [&'static str] = &["cellprofiler"];

    pub fn from_name(name: &str, config: &FeatureConfig) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "cellprofiler" => Ok(Self::CellProfiler(config.cellprofiler.clone())),
            _ => Err(ConfigError::UnsupportedBackend {
                kind: "feature",
                name: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CellProfiler(_) => "cellprofiler",
        }
    }

    /// Build the extractor; `None` when no pipeline file is configured
    pub fn build(&self) -> Option<Arc<dyn FeatureExtractor>> {
        match self {
            Self::CellProfiler(config) => {
                let pipeline = config.pipeline.clone()?;
                Some(Arc::new(CellProfiler::new(config.clone(), pipeline)))
            }
        }
    }
}

/// Annotation export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationFormat {
    #[default]
    QuPath,
}

impl AnnotationFormat {
    pub const NAMES: &'static [&'static str] = &["qupath"];

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "qupath" => Ok(Self::QuPath),
            _ => Err(ConfigError::UnsupportedBackend {
                kind: "annotation format",
                name: name.to_string(),
            }),
        }
    }

    pub fn read(
        &self,
        path: &Path,
        extract_measurements: bool,
        limit: Option<usize>,
    ) -> Result<Vec<CellGeometry>, AnnotationError> {
        match self {
            Self::QuPath => QuPathParser::new(extract_measurements, limit).parse_file(path),
        }
    }
}

/// Backends resolved for one run
#[derive(Debug, Clone)]
pub struct Backends {
    pub annotation: AnnotationFormat,
    pub loader: ImageLoadBackend,
    pub segmentation: SegmentationBackend,
    pub features: FeatureBackend,
}

impl Backends {
    /// Resolve every backend name in the configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            annotation: AnnotationFormat::QuPath,
            loader: ImageLoadBackend::from_name(&config.slide.backend, &config.slide)?,
            segmentation: SegmentationBackend::from_name(&config.detection.backend, &config.detection)?,
            features: FeatureBackend::from_name(&config.features.backend, &config.features)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_known_names() {
        let config = Config::default();
        let backends = Backends::from_config(&config).unwrap();
        assert_eq!(backends.loader.name(), "openslide");
        assert_eq!(backends.segmentation.name(), "stardist");
        assert_eq!(backends.features.name(), "cellprofiler");
        assert_eq!(AnnotationFormat::from_name("QuPath").unwrap(), AnnotationFormat::QuPath);
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let mut config = Config::default();
        config.detection.backend = "cellpose".to_string();
        match Backends::from_config(&config) {
            Err(ConfigError::UnsupportedBackend { kind, name }) => {
                assert_eq!(kind, "segmentation");
                assert_eq!(name, "cellpose");
            }
            other => panic!("unexpected: {other:?}"),
        }

        assert!(ImageLoadBackend::from_name("slideio", &SlideConfig::default()).is_err());
        assert!(FeatureBackend::from_name("", &FeatureConfig::default()).is_err());
        assert!(AnnotationFormat::from_name("geojson").is_err());
    }

    #[test]
    fn test_segmentation_backend_carries_config() {
        let mut config = DetectionConfig::default();
        config.stardist.model = "2D_paper_dsb2018".to_string();
        let SegmentationBackend::StarDist(stardist) =
            SegmentationBackend::from_name("StarDist", &config).unwrap();
        assert_eq!(stardist.model, "2D_paper_dsb2018");
    }

    #[test]
    fn test_feature_backend_needs_pipeline() {
        let mut config = FeatureConfig::default();
        let backend = FeatureBackend::from_name("cellprofiler", &config).unwrap();
        assert!(backend.build().is_none());

        config.cellprofiler.pipeline = Some(PathBuf::from("measure.cppipe"));
        let backend = FeatureBackend::from_name("cellprofiler", &config).unwrap();
        assert_eq!(backend.build().unwrap().name(), "cellprofiler");
    }
}
