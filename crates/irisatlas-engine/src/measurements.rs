//! Pixel counts and structural ratios derived from the label mask.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::segmentation::{COLLARETTE, CONTRACTION_FURROWS, IRIS, PUPIL, SCURF_RIM};

/// Per-class pixel counts and their ratios to the iris area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub pupil_pixels: u64,
    pub iris_pixels: u64,
    pub collarette_pixels: u64,
    /// Contraction furrow pixels.
    pub furrow_pixels: u64,
    /// Scurf rim pixels.
    pub scurf_pixels: u64,
    pub pupil_to_iris: f64,
    pub collarette_to_iris: f64,
    pub furrow_to_iris: f64,
    pub scurf_to_iris: f64,
}

/// Computes measurements from a validated label mask.
///
/// Fails when the mask has no iris pixels.
pub fn compute_measurements(mask: &GrayImage) -> EngineResult<Measurements> {
    let mut counts = [0u64; 256];
    for pixel in mask.pixels() {
        counts[pixel.0[0] as usize] += 1;
    }

    let iris_pixels = counts[IRIS as usize];
    if iris_pixels == 0 {
        return Err(EngineError::ZeroIrisArea);
    }

    let pupil_pixels = counts[PUPIL as usize];
    let collarette_pixels = counts[COLLARETTE as usize];
    let furrow_pixels = counts[CONTRACTION_FURROWS as usize];
    let scurf_pixels = counts[SCURF_RIM as usize];
    let ratio = |n: u64| n as f64 / iris_pixels as f64;

    Ok(Measurements {
        pupil_pixels,
        iris_pixels,
        collarette_pixels,
        furrow_pixels,
        scurf_pixels,
        pupil_to_iris: ratio(pupil_pixels),
        collarette_to_iris: ratio(collarette_pixels),
        furrow_to_iris: ratio(furrow_pixels),
        scurf_to_iris: ratio(scurf_pixels),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_ratios() {
        // 4 iris, 2 pupil, 1 collarette, 1 scurf rim, 0 furrows
        let mask = GrayImage::from_raw(4, 2, vec![2, 2, 2, 2, 1, 1, 3, 4]).unwrap();
        let m = compute_measurements(&mask).unwrap();
        assert_eq!(m.iris_pixels, 4);
        assert_eq!(m.pupil_pixels, 2);
        assert_eq!(m.scurf_pixels, 1);
        assert_eq!(m.furrow_pixels, 0);
        assert_eq!(m.pupil_to_iris, 0.5);
        assert_eq!(m.collarette_to_iris, 0.25);
    }

    #[test]
    fn test_zero_iris_is_fatal() {
        let mask = GrayImage::from_raw(2, 1, vec![0, 1]).unwrap();
        assert!(matches!(
            compute_measurements(&mask),
            Err(EngineError::ZeroIrisArea)
        ));
    }
}
