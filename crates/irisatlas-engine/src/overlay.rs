//! Segmentation overlay rendering and image artifact output.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, Rgb, RgbImage};
use irisatlas_spec::write_atomic;

use crate::error::{EngineError, EngineResult};

/// Blend factor used when neither the run nor the model configures one.
pub const DEFAULT_OVERLAY_ALPHA: f64 = 0.45;

/// Label to RGB colour.
pub type ClassColors = BTreeMap<u8, [u8; 3]>;

/// Blends class colours over the original image.
///
/// Pixels whose label has no colour are blended against black, so the
/// whole image darkens uniformly by `alpha` outside coloured regions.
pub fn render_overlay(
    original: &RgbImage,
    mask: &GrayImage,
    colors: &ClassColors,
    alpha: f64,
) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let base = original.get_pixel(x, y).0;
        let tint = mask
            .get_pixel_checked(x, y)
            .and_then(|label| colors.get(&label.0[0]))
            .copied()
            .unwrap_or([0, 0, 0]);
        let mut out = [0u8; 3];
        for channel in 0..3 {
            let value = f64::from(base[channel]) * (1.0 - alpha) + f64::from(tint[channel]) * alpha;
            out[channel] = value.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Encodes an image as PNG and writes it atomically.
pub fn write_png(path: &Path, image: &DynamicImage) -> EngineResult<()> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|err| EngineError::ImageWrite {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    write_atomic(path, &bytes).map_err(|err| EngineError::ImageWrite {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend() {
        let original = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        let mask = GrayImage::from_raw(2, 1, vec![2, 0]).unwrap();
        let mut colors = ClassColors::new();
        colors.insert(2, [200, 0, 0]);

        let out = render_overlay(&original, &mask, &colors, 0.5);
        assert_eq!(out.get_pixel(0, 0).0, [150, 50, 50]);
        assert_eq!(out.get_pixel(1, 0).0, [50, 50, 50]);
    }

    #[test]
    fn test_alpha_zero_is_identity() {
        let original = RgbImage::from_pixel(3, 3, Rgb([7, 8, 9]));
        let mask = GrayImage::from_pixel(3, 3, image::Luma([2]));
        let out = render_overlay(&original, &mask, &ClassColors::new(), 0.0);
        assert_eq!(out, original);
    }

    #[test]
    fn test_write_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mask = GrayImage::from_raw(2, 2, vec![0, 1, 2, 5]).unwrap();
        write_png(&path, &DynamicImage::ImageLuma8(mask.clone())).unwrap();

        let decoded = image::open(&path).unwrap().to_luma8();
        assert_eq!(decoded, mask);
    }
}
