//! Mask-related types and error definitions

use std::fmt;
use std::str::FromStr;

use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Instance label image: one connected region per nucleus, 0 = background
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Binary mask with pixel values in {0, 1}
pub type BinaryMask = GrayImage;

/// Errors raised by the mask engine.
///
/// An empty nucleus is not an error: it yields all-zero masks.
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Mask shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch { left: (u32, u32), right: (u32, u32) },

    #[error("Expansion mask does not cover nucleus pixel ({x}, {y})")]
    NucleusNotCovered { x: u32, y: u32 },

    #[error("Mask value {value} at ({x}, {y}) is not binary")]
    NotBinary { x: u32, y: u32, value: u8 },
}

/// The three mask flavors derived per cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskKind {
    Nucleus,
    Expansion,
    Outline,
}

impl MaskKind {
    pub const ALL: [MaskKind; 3] = [MaskKind::Nucleus, MaskKind::Expansion, MaskKind::Outline];

    /// Column / file suffix name, e.g. `NucleusMask`
    pub fn column_name(self) -> &'static str {
        match self {
            MaskKind::Nucleus => "NucleusMask",
            MaskKind::Expansion => "ExpansionMask",
            MaskKind::Outline => "OutlineMask",
        }
    }
}

impl fmt::Display for MaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MaskKind::Nucleus => "nucleus",
            MaskKind::Expansion => "expansion",
            MaskKind::Outline => "outline",
        };
        f.write_str(name)
    }
}

impl FromStr for MaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nucleus" => Ok(MaskKind::Nucleus),
            "expansion" => Ok(MaskKind::Expansion),
            "outline" => Ok(MaskKind::Outline),
            other => Err(format!("unknown mask kind: {}", other)),
        }
    }
}

/// Masks derived for a single cell
#[derive(Debug, Clone)]
pub struct ObjectMasks {
    pub nucleus: BinaryMask,
    pub expansion: BinaryMask,
    pub outline: BinaryMask,
}

impl ObjectMasks {
    pub fn get(&self, kind: MaskKind) -> &BinaryMask {
        match kind {
            MaskKind::Nucleus => &self.nucleus,
            MaskKind::Expansion => &self.expansion,
            MaskKind::Outline => &self.outline,
        }
    }

    /// Whether the focused nucleus was found (center pixel not background)
    pub fn has_nucleus(&self) -> bool {
        self.nucleus.pixels().any(|p| p.0[0] != 0)
    }
}

/// Column-oriented batch result: one row per input index, one column per kind
#[derive(Debug, Clone, Default)]
pub struct ObjectMasksTable {
    pub nucleus: Vec<BinaryMask>,
    pub expansion: Vec<BinaryMask>,
    pub outline: Vec<BinaryMask>,
}

impl ObjectMasksTable {
    pub fn len(&self) -> usize {
        self.nucleus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nucleus.is_empty()
    }

    pub fn column(&self, kind: MaskKind) -> &[BinaryMask] {
        match kind {
            MaskKind::Nucleus => &self.nucleus,
            MaskKind::Expansion => &self.expansion,
            MaskKind::Outline => &self.outline,
        }
    }

    /// Masks of one row
    pub fn row(&self, index: usize) -> Option<ObjectMasks> {
        Some(ObjectMasks {
            nucleus: self.nucleus.get(index)?.clone(),
            expansion: self.expansion.get(index)?.clone(),
            outline: self.outline.get(index)?.clone(),
        })
    }
}

impl FromIterator<ObjectMasks> for ObjectMasksTable {
    fn from_iter<T: IntoIterator<Item = ObjectMasks>>(iter: T) -> Self {
        let mut table = ObjectMasksTable::default();
        for masks in iter {
            table.nucleus.push(masks.nucleus);
            table.expansion.push(masks.expansion);
            table.outline.push(masks.outline);
        }
        table
    }
}
