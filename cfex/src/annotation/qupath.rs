//! QuPath GeoJSON cell detection exports

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::{AnnotationError, CellGeometry};
use crate::geometry::{Point, Polygon};

/// Build a Pascal-case feature name from a QuPath measurement name.
///
/// `"Nucleus: circularity"` becomes `"NucleusCircularity"`. Words starting
/// with an ASCII character are capitalised, everything that is not
/// alphanumeric is dropped.
pub fn format_feature_name(name: &str) -> String {
    let mut formatted = String::with_capacity(name.len());
    for word in name.split_whitespace() {
        let mut chars = word.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        if first.is_ascii() {
            formatted.extend(first.to_uppercase());
            formatted.extend(chars.flat_map(char::to_lowercase));
        } else {
            formatted.push_str(word);
        }
    }
    formatted.retain(char::is_alphanumeric);
    formatted
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Features(Vec<Record>),
    Collection { features: Vec<Record> },
}

#[derive(Deserialize)]
struct Record {
    geometry: Option<Geometry>,
    #[serde(rename = "nucleusGeometry")]
    nucleus_geometry: Option<Geometry>,
    #[serde(default)]
    properties: Properties,
    // Older exports keep these next to the geometry
    classification: Option<Classification>,
    measurements: Option<Measurements>,
}

#[derive(Deserialize, Default)]
struct Properties {
    classification: Option<Classification>,
    measurements: Option<Measurements>,
}

#[derive(Deserialize)]
struct Classification {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Measurements {
    List(Vec<Measurement>),
    Map(BTreeMap<String, serde_json::Value>),
}

#[derive(Deserialize)]
struct Measurement {
    name: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
    #[serde(other)]
    Unsupported,
}

impl Geometry {
    /// Exterior ring of the (first) polygon
    fn exterior(&self) -> Option<Polygon> {
        let ring = match self {
            Geometry::Polygon { coordinates } => coordinates.first()?,
            Geometry::MultiPolygon { coordinates } => coordinates.first()?.first()?,
            Geometry::Unsupported => return None,
        };
        let polygon: Polygon = ring
            .iter()
            .filter_map(|position| match position.as_slice() {
                [x, y, ..] => Some(Point::new(*x, *y)),
                _ => None,
            })
            .collect();
        (!polygon.is_empty()).then_some(polygon)
    }
}

impl Measurements {
    fn normalized(&self) -> BTreeMap<String, f64> {
        let value = |v: &serde_json::Value| v.as_f64().unwrap_or(f64::NAN);
        match self {
            Measurements::List(list) => list
                .iter()
                .map(|m| (format_feature_name(&m.name), value(&m.value)))
                .collect(),
            Measurements::Map(map) => map
                .iter()
                .map(|(name, v)| (format_feature_name(name), value(v)))
                .collect(),
        }
    }
}

/// Parser for QuPath cell detection GeoJSON
#[derive(Debug, Clone, Default)]
pub struct QuPathParser {
    /// Keep the per-cell measurement table
    extract_measurements: bool,
    /// Keep at most this many cells
    limit: Option<usize>,
}

impl QuPathParser {
    pub fn new(extract_measurements: bool, limit: Option<usize>) -> Self {
        Self {
            extract_measurements,
            limit,
        }
    }

    /// Parse an export file
    pub fn parse_file(&self, path: &Path) -> Result<Vec<CellGeometry>, AnnotationError> {
        info!("Parsing cell data: {}", path.display());
        let file = std::fs::File::open(path)?;
        let cells = self.parse_reader(std::io::BufReader::new(file))?;
        if cells.is_empty() {
            return Err(AnnotationError::Empty(path.display().to_string()));
        }
        Ok(cells)
    }

    /// Parse an export from any reader
    pub fn parse_reader<R: Read>(&self, reader: R) -> Result<Vec<CellGeometry>, AnnotationError> {
        let document: Document = serde_json::from_reader(reader)?;
        Ok(self.collect(document))
    }

    /// Parse an export held in memory
    pub fn parse_str(&self, data: &str) -> Result<Vec<CellGeometry>, AnnotationError> {
        let document: Document = serde_json::from_str(data)?;
        Ok(self.collect(document))
    }

    fn collect(&self, document: Document) -> Vec<CellGeometry> {
        let records = match document {
            Document::Features(features) | Document::Collection { features } => features,
        };
        let total = records.len();

        let mut cells = Vec::with_capacity(total);
        let mut skipped = 0usize;
        for (index, record) in records.into_iter().enumerate() {
            match self.convert(record) {
                Some(cell) => cells.push(cell),
                None => {
                    debug!("Record {} lacks a cell or nucleus polygon", index);
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            warn!("Skipped {} of {} records without cell and nucleus polygons", skipped, total);
        }

        if let Some(limit) = self.limit {
            cells.truncate(limit);
        }
        info!("Cell object count: {}", cells.len());
        cells
    }

    fn convert(&self, record: Record) -> Option<CellGeometry> {
        let cell_polygon = record.geometry.as_ref()?.exterior()?;
        let nucleus_polygon = record.nucleus_geometry.as_ref()?.exterior()?;

        let Record {
            properties,
            classification,
            measurements,
            ..
        } = record;

        let target = properties
            .classification
            .or(classification)
            .and_then(|c| c.name);
        let measurements = if self.extract_measurements {
            Some(
                properties
                    .measurements
                    .or(measurements)
                    .map(|m| m.normalized())
                    .unwrap_or_default(),
            )
        } else {
            None
        };

        Some(CellGeometry {
            cell_polygon,
            nucleus_polygon,
            target,
            measurements,
        })
    }
}
