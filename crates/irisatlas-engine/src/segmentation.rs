//! Segmentation collaborator contract.
//!
//! The runtime does not segment images itself. It calls a [`Segmenter`] and
//! enforces the label contract on whatever comes back: the mask must match
//! the input raster's dimensions and contain only canonical labels.

use image::{GrayImage, Luma};

use crate::error::{EngineError, EngineResult};

pub const BACKGROUND: u8 = 0;
pub const PUPIL: u8 = 1;
pub const IRIS: u8 = 2;
pub const COLLARETTE: u8 = 3;
pub const SCURF_RIM: u8 = 4;
pub const CONTRACTION_FURROWS: u8 = 5;

/// The canonical label map, in label order.
pub const CANONICAL_LABELS: [(&str, u8); 6] = [
    ("background", BACKGROUND),
    ("pupil", PUPIL),
    ("iris", IRIS),
    ("collarette", COLLARETTE),
    ("scurf_rim", SCURF_RIM),
    ("contraction_furrows", CONTRACTION_FURROWS),
];

/// Maps a grayscale raster to a single-channel label raster.
pub trait Segmenter {
    /// Runs inference on `gray`.
    fn infer(&self, gray: &GrayImage) -> EngineResult<GrayImage>;
}

impl<F> Segmenter for F
where
    F: Fn(&GrayImage) -> EngineResult<GrayImage>,
{
    fn infer(&self, gray: &GrayImage) -> EngineResult<GrayImage> {
        self(gray)
    }
}

/// Returns true if `label` is part of the canonical label set.
pub fn is_canonical(label: u8) -> bool {
    label <= CONTRACTION_FURROWS
}

/// Checks a segmenter's output against the input raster.
pub fn validate_mask(gray: &GrayImage, mask: &GrayImage) -> EngineResult<()> {
    if gray.dimensions() != mask.dimensions() {
        return Err(EngineError::MaskShape {
            expected_width: gray.width(),
            expected_height: gray.height(),
            found_width: mask.width(),
            found_height: mask.height(),
        });
    }

    let mut seen = [false; 256];
    for pixel in mask.pixels() {
        seen[pixel.0[0] as usize] = true;
    }
    let unexpected: Vec<u8> = (0..=u8::MAX)
        .filter(|&label| seen[label as usize] && !is_canonical(label))
        .collect();
    if !unexpected.is_empty() {
        return Err(EngineError::UnexpectedLabels { labels: unexpected });
    }
    Ok(())
}

/// Binary sub-mask (0/1) of the iris label.
pub fn iris_sub_mask(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([u8::from(mask.get_pixel(x, y).0[0] == IRIS)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_mask_accepts_canonical_labels() {
        let gray = GrayImage::new(3, 2);
        let mask = GrayImage::from_raw(3, 2, vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert!(validate_mask(&gray, &mask).is_ok());
    }

    #[test]
    fn test_validate_mask_rejects_out_of_range() {
        let gray = GrayImage::new(2, 2);
        let mask = GrayImage::from_raw(2, 2, vec![0, 9, 2, 6]).unwrap();
        match validate_mask(&gray, &mask) {
            Err(EngineError::UnexpectedLabels { labels }) => assert_eq!(labels, vec![6, 9]),
            other => panic!("expected UnexpectedLabels, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_mask_rejects_dimension_mismatch() {
        let gray = GrayImage::new(4, 4);
        let mask = GrayImage::new(4, 3);
        assert!(matches!(
            validate_mask(&gray, &mask),
            Err(EngineError::MaskShape { found_height: 3, .. })
        ));
    }

    #[test]
    fn test_closure_segmenter_and_iris_mask() {
        let segmenter = |gray: &GrayImage| -> EngineResult<GrayImage> {
            Ok(GrayImage::from_pixel(gray.width(), gray.height(), Luma([IRIS])))
        };
        let mask = segmenter.infer(&GrayImage::new(2, 2)).unwrap();
        let iris = iris_sub_mask(&mask);
        assert!(iris.pixels().all(|p| p.0[0] == 1));
    }
}
