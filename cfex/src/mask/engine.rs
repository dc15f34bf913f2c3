//! Nucleus, expansion and outline mask derivation

use image::Luma;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::geometry::image_center;

use super::contour::first_outer_contour;
use super::offset::offset_polygon;
use super::types::{BinaryMask, LabelImage, MaskError, ObjectMasks, ObjectMasksTable};

/// Default outward offset, in pixels, from nucleus to expansion boundary
pub const DEFAULT_EXPANSION_SIZE: f64 = 6.0;

/// Binary mask of the instance whose label sits at the image center.
///
/// A background center pixel yields an all-zero mask.
pub fn nucleus_mask(labels: &LabelImage) -> Result<BinaryMask, MaskError> {
    ensure_not_empty(labels.width(), labels.height())?;

    let (cx, cy) = image_center(labels);
    let focused = labels.get_pixel(cx, cy).0[0];
    if focused == 0 {
        debug!("Center pixel ({}, {}) is background", cx, cy);
        return Ok(BinaryMask::new(labels.width(), labels.height()));
    }

    Ok(BinaryMask::from_fn(labels.width(), labels.height(), |x, y| {
        Luma([u8::from(labels.get_pixel(x, y).0[0] == focused)])
    }))
}

/// Nucleus dilated outward by `expansion_size` pixels, unioned with the
/// nucleus itself.
///
/// Uses the first outer contour of the nucleus; an empty nucleus yields an
/// all-zero mask of the same shape.
pub fn expansion_mask(nucleus: &BinaryMask, expansion_size: f64) -> Result<BinaryMask, MaskError> {
    ensure_not_empty(nucleus.width(), nucleus.height())?;

    let Some(contour) = first_outer_contour(nucleus) else {
        return Ok(BinaryMask::new(nucleus.width(), nucleus.height()));
    };

    let mut expansion = nucleus.clone();
    for pixel in expansion.pixels_mut() {
        pixel.0[0] = pixel.0[0].min(1);
    }
    offset_polygon(&contour, expansion_size).rasterize_into(&mut expansion);
    Ok(expansion)
}

/// Pixel-wise `expansion - nucleus`.
///
/// Fails instead of clamping when a nucleus pixel is missing from the
/// expansion or when either input is not binary.
pub fn outline_mask(nucleus: &BinaryMask, expansion: &BinaryMask) -> Result<BinaryMask, MaskError> {
    if nucleus.dimensions() != expansion.dimensions() {
        return Err(MaskError::ShapeMismatch {
            left: expansion.dimensions(),
            right: nucleus.dimensions(),
        });
    }

    let mut outline = BinaryMask::new(nucleus.width(), nucleus.height());
    for (x, y, out) in outline.enumerate_pixels_mut() {
        let n = nucleus.get_pixel(x, y).0[0];
        let e = expansion.get_pixel(x, y).0[0];
        if n > 1 {
            return Err(MaskError::NotBinary { x, y, value: n });
        }
        if e > 1 {
            return Err(MaskError::NotBinary { x, y, value: e });
        }
        if e < n {
            return Err(MaskError::NucleusNotCovered { x, y });
        }
        out.0[0] = e - n;
    }
    Ok(outline)
}

fn ensure_not_empty(width: u32, height: u32) -> Result<(), MaskError> {
    if width == 0 || height == 0 {
        return Err(MaskError::EmptyImage { width, height });
    }
    Ok(())
}

/// Mask engine configured with an expansion size
#[derive(Debug, Clone, Copy)]
pub struct MaskEngine {
    expansion_size: f64,
}

impl Default for MaskEngine {
    fn default() -> Self {
        Self::new(DEFAULT_EXPANSION_SIZE)
    }
}

impl MaskEngine {
    pub fn new(expansion_size: f64) -> Self {
        Self { expansion_size }
    }

    pub fn expansion_size(&self) -> f64 {
        self.expansion_size
    }

    /// Derive all three masks for one label image
    pub fn derive(&self, labels: &LabelImage) -> Result<ObjectMasks, MaskError> {
        let nucleus = nucleus_mask(labels)?;
        let expansion = expansion_mask(&nucleus, self.expansion_size)?;
        let outline = outline_mask(&nucleus, &expansion)?;
        Ok(ObjectMasks {
            nucleus,
            expansion,
            outline,
        })
    }

    /// Derive masks for every label image, index-aligned with the input.
    ///
    /// Cells are processed in parallel; each entry carries its own result.
    pub fn derive_each(&self, labels: &[LabelImage]) -> Vec<Result<ObjectMasks, MaskError>> {
        info!("Deriving object masks for {} cells", labels.len());
        labels.par_iter().map(|l| self.derive(l)).collect()
    }

    /// Derive masks for every label image, failing on the first error
    pub fn derive_batch(&self, labels: &[LabelImage]) -> Result<Vec<ObjectMasks>, MaskError> {
        self.derive_each(labels).into_iter().collect()
    }

    /// Batch derivation materialized as one column per mask kind
    pub fn derive_table(&self, labels: &[LabelImage]) -> Result<ObjectMasksTable, MaskError> {
        Ok(self.derive_batch(labels)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn count(mask: &BinaryMask) -> usize {
        mask.pixels().filter(|p| p.0[0] != 0).count()
    }

    fn disk_labels(size: u32, cx: i64, cy: i64, radius: i64, label: u32) -> LabelImage {
        LabelImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as i64 - cx, y as i64 - cy);
            Luma([if dx * dx + dy * dy <= radius * radius { label } else { 0 }])
        })
    }

    fn assert_mask_invariants(masks: &ObjectMasks) {
        for (x, y, n) in masks.nucleus.enumerate_pixels() {
            let e = masks.expansion.get_pixel(x, y).0[0];
            let o = masks.outline.get_pixel(x, y).0[0];
            assert!(n.0[0] <= 1 && e <= 1 && o <= 1);
            assert!(e >= n.0[0], "nucleus pixel ({}, {}) not in expansion", x, y);
            assert_eq!(o, e - n.0[0]);
        }
    }

    #[test]
    fn test_nucleus_mask_keeps_only_focused_label() {
        let mut labels = disk_labels(41, 20, 20, 5, 7);
        labels.put_pixel(2, 2, Luma([3]));
        labels.put_pixel(38, 38, Luma([7 + 1]));
        let nucleus = nucleus_mask(&labels).unwrap();
        assert_eq!(nucleus.get_pixel(20, 20).0[0], 1);
        assert_eq!(nucleus.get_pixel(2, 2).0[0], 0);
        assert_eq!(nucleus.get_pixel(38, 38).0[0], 0);
        assert_eq!(count(&nucleus), count(&nucleus_mask(&disk_labels(41, 20, 20, 5, 1)).unwrap()));
    }

    #[test]
    fn test_background_center_yields_empty_masks() {
        let labels = disk_labels(40, 6, 6, 4, 2);
        let masks = MaskEngine::default().derive(&labels).unwrap();
        assert_eq!(count(&masks.nucleus), 0);
        assert_eq!(count(&masks.expansion), 0);
        assert_eq!(count(&masks.outline), 0);
        assert_eq!(masks.nucleus.dimensions(), (40, 40));
        assert!(!masks.has_nucleus());
    }

    #[test]
    fn test_nucleus_mask_does_not_modify_input() {
        let labels = disk_labels(21, 10, 10, 3, 9);
        let before = labels.clone();
        let _ = nucleus_mask(&labels).unwrap();
        assert_eq!(labels, before);
    }

    #[test]
    fn test_expansion_grows_by_offset() {
        let labels = disk_labels(61, 30, 30, 5, 4);
        let masks = MaskEngine::new(6.0).derive(&labels).unwrap();
        assert_mask_invariants(&masks);
        assert!(masks.has_nucleus());
        // rightmost nucleus pixel is x = 35
        assert_eq!(masks.expansion.get_pixel(40, 30).0[0], 1);
        assert_eq!(masks.expansion.get_pixel(30, 20).0[0], 1);
        assert_eq!(masks.expansion.get_pixel(45, 30).0[0], 0);
        assert_eq!(masks.outline.get_pixel(30, 30).0[0], 0);
        assert_eq!(masks.outline.get_pixel(38, 30).0[0], 1);
    }

    #[test]
    fn test_expansion_is_clipped_to_image() {
        let labels = LabelImage::from_pixel(7, 7, Luma([1]));
        let masks = MaskEngine::default().derive(&labels).unwrap();
        assert_eq!(count(&masks.expansion), 49);
        assert_eq!(count(&masks.outline), 0);
    }

    #[test]
    fn test_single_pixel_nucleus() {
        let mut labels = LabelImage::new(21, 21);
        labels.put_pixel(10, 10, Luma([5]));
        let masks = MaskEngine::new(2.0).derive(&labels).unwrap();
        assert_mask_invariants(&masks);
        assert_eq!(count(&masks.nucleus), 1);
        assert_eq!(count(&masks.expansion), 25);
        assert_eq!(count(&masks.outline), 24);
    }

    #[test]
    fn test_outline_rejects_uncovered_nucleus() {
        let mut nucleus = BinaryMask::new(5, 5);
        nucleus.put_pixel(2, 2, Luma([1]));
        let expansion = BinaryMask::new(5, 5);
        let err = outline_mask(&nucleus, &expansion).unwrap_err();
        assert!(matches!(err, MaskError::NucleusNotCovered { x: 2, y: 2 }));
    }

    #[test]
    fn test_outline_rejects_shape_mismatch() {
        let err = outline_mask(&BinaryMask::new(5, 5), &BinaryMask::new(5, 6)).unwrap_err();
        assert!(matches!(err, MaskError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let err = nucleus_mask(&LabelImage::new(0, 10)).unwrap_err();
        assert!(matches!(err, MaskError::EmptyImage { width: 0, height: 10 }));
    }

    #[test]
    fn test_random_blobs_respect_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let engine = MaskEngine::default();
        for _ in 0..40 {
            let size = rng.random_range(20..60u32);
            let mut labels = LabelImage::new(size, size);
            for label in 1..=rng.random_range(1..5u32) {
                let cx = rng.random_range(0..size) as i64;
                let cy = rng.random_range(0..size) as i64;
                let r = rng.random_range(1..8i64);
                for (x, y, p) in labels.enumerate_pixels_mut() {
                    let (dx, dy) = (x as i64 - cx, y as i64 - cy);
                    if dx * dx + dy * dy <= r * r {
                        p.0[0] = label;
                    }
                }
            }
            let masks = engine.derive(&labels).unwrap();
            assert_mask_invariants(&masks);
            let center = labels.get_pixel(size / 2, size / 2).0[0];
            assert_eq!(masks.has_nucleus(), center != 0);
            if center == 0 {
                assert_eq!(count(&masks.expansion), 0);
            }
        }
    }

    #[test]
    fn test_batch_is_index_aligned() {
        let batch = vec![
            disk_labels(31, 15, 15, 4, 1),
            disk_labels(31, 3, 3, 2, 1),
            LabelImage::new(31, 31),
        ];
        let engine = MaskEngine::default();
        let masks = engine.derive_batch(&batch).unwrap();
        assert_eq!(masks.len(), 3);
        assert!(masks[0].has_nucleus());
        assert!(!masks[1].has_nucleus());
        assert!(!masks[2].has_nucleus());

        let table = engine.derive_table(&batch).unwrap();
        assert_eq!(table.nucleus.len(), 3);
        assert_eq!(table.expansion.len(), 3);
        assert_eq!(table.outline.len(), 3);
        assert_eq!(count(&table.nucleus[0]), count(&masks[0].nucleus));
    }
}
