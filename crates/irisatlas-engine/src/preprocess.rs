//! Input image loading.
//!
//! Decodes the input, keeps the original colour raster for overlays, and
//! derives the grayscale raster the segmenter consumes. Suspicious inputs
//! produce warnings, never errors.

use std::path::Path;

use image::{GrayImage, RgbImage};

use crate::error::{EngineError, EngineResult};

/// File suffixes expected for NIR captures. Others are still decoded.
pub const SUPPORTED_IMAGE_SUFFIXES: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Mean per-pixel channel standard deviation above which a capture is
/// considered colour rather than NIR.
const CHANNEL_SPREAD_LIMIT: f64 = 12.0;

/// Largest red/blue difference tolerated for a NIR capture.
const CHANNEL_DELTA_LIMIT: i16 = 40;

/// A decoded input image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Original image as RGB.
    pub original: RgbImage,
    /// Grayscale conversion of the original.
    pub grayscale: GrayImage,
    /// Non-blocking warnings about the input.
    pub warnings: Vec<String>,
}

/// Loads an image and converts it for analysis.
pub fn load_image_for_analysis(path: &Path) -> EngineResult<LoadedImage> {
    if !path.exists() {
        return Err(EngineError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(EngineError::InputNotAFile {
            path: path.to_path_buf(),
        });
    }

    let mut warnings = Vec::new();
    if let Some(suffix) = path.extension().map(|s| s.to_string_lossy().to_lowercase()) {
        if !SUPPORTED_IMAGE_SUFFIXES.contains(&suffix.as_str()) {
            warnings.push(format!(
                "Input extension '.{}' is uncommon for this workflow; attempting decode.",
                suffix
            ));
        }
    }

    let decoded = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map_err(|source| EngineError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    let original = decoded.to_rgb8();
    let grayscale = decoded.to_luma8();

    if likely_non_nir(&original) {
        warnings.push(
            "Input may not be a true NIR source (high inter-channel divergence detected). \
             Analysis continues with grayscale conversion."
                .to_string(),
        );
    }

    Ok(LoadedImage {
        original,
        grayscale,
        warnings,
    })
}

/// Heuristic check for colour imagery.
///
/// NIR captures are close to monochrome across channels. A high mean
/// channel spread or a large red/blue difference anywhere marks the input as
/// probably not NIR.
pub fn likely_non_nir(image: &RgbImage) -> bool {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return false;
    }

    let mut spread_sum = 0.0f64;
    let mut max_delta = 0i16;
    for pixel in image.pixels() {
        let [r, g, b] = pixel.0;
        let values = [f64::from(r), f64::from(g), f64::from(b)];
        let mean = values.iter().sum::<f64>() / 3.0;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 3.0;
        spread_sum += variance.sqrt();
        max_delta = max_delta.max((i16::from(b) - i16::from(r)).abs());
    }

    spread_sum / pixel_count as f64 > CHANNEL_SPREAD_LIMIT || max_delta > CHANNEL_DELTA_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_gray_input_is_nir_like() {
        let image = RgbImage::from_pixel(4, 4, Rgb([90, 90, 90]));
        assert!(!likely_non_nir(&image));
    }

    #[test]
    fn test_colour_input_flagged() {
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 40, 20]));
        assert!(likely_non_nir(&image));
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let err = load_image_for_analysis(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, EngineError::InputNotFound { .. }));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_undecodable_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_image_for_analysis(&path).unwrap_err();
        assert!(matches!(err, EngineError::Decode { .. }));
    }

    #[test]
    fn test_uncommon_suffix_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.raw");
        RgbImage::from_pixel(2, 2, Rgb([10, 10, 10]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let loaded = load_image_for_analysis(&path).unwrap();
        assert_eq!(loaded.grayscale.dimensions(), (2, 2));
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains(".raw"));
    }
}
