//! Filtering and merging of per-object measurement tables

use std::path::{Path, PathBuf};

use tracing::info;

use super::types::FeatureError;

/// Column holding the color image file name of each measured object
pub const FILE_NAME_COLUMN: &str = "FileName_Color";

const METADATA_MARKERS: &[&str] = &[
    "Metadata",
    "FileName",
    "PathName",
    "Number_Object_Number",
    "Parent_Cell",
    "ImageNumber",
    "ObjectNumber",
];

const AXIS_SUFFIXES: &[&str] = &["_X", "_Y", "_Z"];

/// Bookkeeping columns that are not features
pub fn is_metadata_column(name: &str) -> bool {
    METADATA_MARKERS.iter().any(|marker| name.contains(marker))
}

/// Per-axis location columns
pub fn is_axis_column(name: &str) -> bool {
    AXIS_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Centroid and slide name encoded in an exported cell file name,
/// `cell{i}_{target}_{x}_{y}_{slide}.png`
fn parse_cell_file_name(file_name: &str) -> (String, String) {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let parts: Vec<&str> = stem.splitn(5, '_').collect();
    let centroid = match parts.get(2..4) {
        Some([x, y]) => format!("[{x}, {y}]"),
        _ => String::new(),
    };
    let slide = parts.get(4).map(|s| s.to_string()).unwrap_or_default();
    (centroid, slide)
}

/// Feature columns of one object type, prefixed with the object name
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectTable {
    pub object: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// `[x, y]` per row, from the cell file name
    pub centroids: Vec<String>,
    /// Slide name per row, from the cell file name
    pub slides: Vec<String>,
}

impl ObjectTable {
    pub fn new(object: &str) -> Self {
        Self {
            object: object.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            centroids: Vec::new(),
            slides: Vec::new(),
        }
    }

    /// Read one exported table, dropping metadata and axis columns
    pub fn read(path: &Path, object: &str) -> Result<Self, FeatureError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let file_column = headers
            .iter()
            .position(|h| h == FILE_NAME_COLUMN)
            .ok_or_else(|| FeatureError::MissingColumn {
                column: FILE_NAME_COLUMN.to_string(),
                path: path.to_path_buf(),
            })?;

        let keep: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !is_metadata_column(h) && !is_axis_column(h))
            .map(|(i, _)| i)
            .collect();

        let mut table = Self::new(object);
        table.columns = keep
            .iter()
            .map(|&i| format!("{}_{}", object, &headers[i]))
            .collect();

        for record in reader.records() {
            let record = record?;
            table.rows.push(
                keep.iter()
                    .map(|&i| record.get(i).unwrap_or_default().to_string())
                    .collect(),
            );
            let (centroid, slide) = parse_cell_file_name(record.get(file_column).unwrap_or_default());
            table.centroids.push(centroid);
            table.slides.push(slide);
        }
        info!(
            "Processed {} data: {} rows, {} features",
            object,
            table.rows.len(),
            table.columns.len()
        );
        Ok(table)
    }

    /// Append the rows of another batch of the same object type
    pub fn append(&mut self, mut other: ObjectTable) {
        if self.columns.is_empty() {
            self.columns = std::mem::take(&mut other.columns);
        }
        self.rows.append(&mut other.rows);
        self.centroids.append(&mut other.centroids);
        self.slides.append(&mut other.slides);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Join object tables side by side and write
/// `<output>/filtered/filtered_on_n{rows}_nf{features}.csv`.
///
/// Rows are aligned by position; shorter tables are padded with empty cells.
pub fn merge_object_tables(tables: &[ObjectTable], output: &Path) -> Result<PathBuf, FeatureError> {
    let filtered = output.join("filtered");
    std::fs::create_dir_all(&filtered)?;

    let rows = tables.iter().map(ObjectTable::len).max().unwrap_or(0);
    let features: usize = tables.iter().map(|t| t.columns.len()).sum();
    let path = filtered.join(format!("filtered_on_n{rows}_nf{features}.csv"));

    let mut writer = csv::Writer::from_path(&path)?;
    let mut header = vec![String::new()];
    header.extend(tables.iter().flat_map(|t| t.columns.iter().cloned()));
    header.push("CentroidCoordinates".to_string());
    header.push("SlideName".to_string());
    writer.write_record(&header)?;

    for row in 0..rows {
        let mut record = vec![row.to_string()];
        for table in tables {
            match table.rows.get(row) {
                Some(values) => record.extend(values.iter().cloned()),
                None => record.extend(std::iter::repeat_n(String::new(), table.columns.len())),
            }
        }
        let source = tables.iter().find(|t| row < t.len());
        record.push(source.map(|t| t.centroids[row].clone()).unwrap_or_default());
        record.push(source.map(|t| t.slides[row].clone()).unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!("Cell features data: {}", path.display());
    Ok(path)
}
