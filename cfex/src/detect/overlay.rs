//! Label overlay rendering for manual review of off-center crops

use image::{Rgb, RgbImage};

use crate::mask::LabelImage;

/// Weight of the label color when blended over the crop
const OVERLAY_ALPHA: f32 = 0.5;

/// Blend a distinct color per label over the crop; background stays as is.
///
/// Pixels outside the label image (if sizes differ) are left untouched.
pub fn render_label_overlay(image: &RgbImage, labels: &LabelImage) -> RgbImage {
    let mut out = image.clone();
    let (lw, lh) = labels.dimensions();

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if x >= lw || y >= lh {
            continue;
        }
        let label = labels.get_pixel(x, y).0[0];
        if label == 0 {
            continue;
        }
        let color = label_color(label);
        for c in 0..3 {
            let base = f32::from(pixel.0[c]);
            let tint = f32::from(color.0[c]);
            pixel.0[c] = (base * (1.0 - OVERLAY_ALPHA) + tint * OVERLAY_ALPHA).round() as u8;
        }
    }

    out
}

/// Deterministic, well-spread color for a label value
fn label_color(label: u32) -> Rgb<u8> {
    let h = label.wrapping_mul(0x9E37_79B9).rotate_left(13) ^ 0x5bd1_e995;
    let [r, g, b, _] = h.to_le_bytes();
    // keep colors away from black so they remain visible on dark tissue
    Rgb([r | 0x40, g | 0x40, b | 0x40])
}
