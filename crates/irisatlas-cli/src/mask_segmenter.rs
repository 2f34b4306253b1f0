//! Segmentation backed by a precomputed label mask on disk.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use irisatlas_engine::{EngineError, EngineResult, Segmenter};

/// Returns the label mask stored at a path, ignoring the input raster.
///
/// The file is decoded on every call, so a missing or unreadable mask
/// surfaces as a run-fatal segmentation error and is recorded in the
/// run-state file like any other upstream failure.
///
/// Only 8-bit single-channel files are accepted; colour or 16-bit masks are
/// rejected rather than converted.
#[derive(Debug, Clone)]
pub struct MaskFileSegmenter {
    path: PathBuf,
}

impl MaskFileSegmenter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Segmenter for MaskFileSegmenter {
    fn infer(&self, _gray: &GrayImage) -> EngineResult<GrayImage> {
        let decoded = image::open(&self.path).map_err(|err| EngineError::Segmentation {
            message: format!("cannot load mask '{}': {}", self.path.display(), err),
        })?;
        match decoded {
            DynamicImage::ImageLuma8(mask) => Ok(mask),
            other => Err(EngineError::Segmentation {
                message: format!(
                    "Segmentation mask must be single-channel 8-bit, '{}' is {:?}",
                    self.path.display(),
                    other.color()
                ),
            }),
        }
    }
}
