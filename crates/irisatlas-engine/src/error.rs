//! Error types for the analysis runtime.

use std::path::PathBuf;

use irisatlas_spec::PersistError;
use thiserror::Error;

/// Result type for run-level operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Run-fatal errors.
///
/// Any of these aborts the run, marks the run-state file `failed` with the
/// error message, and is returned to the caller. Stage faults never surface
/// here; see [`StageError`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The input image path does not exist.
    #[error("Input image does not exist: {path}")]
    InputNotFound { path: PathBuf },

    /// The input path exists but is not a regular file.
    #[error("Input path must be a file: {path}")]
    InputNotAFile { path: PathBuf },

    /// The input file could not be decoded as an image.
    #[error("Unable to decode image file: {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The segmenter itself reported a failure.
    #[error("Segmentation failed: {message}")]
    Segmentation { message: String },

    /// The segmentation mask does not cover the input raster.
    #[error(
        "Segmentation mask is {found_width}x{found_height}, expected {expected_width}x{expected_height}"
    )]
    MaskShape {
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    /// The segmentation mask contains values outside the canonical label set.
    #[error("Unexpected labels found in segmentation output")]
    UnexpectedLabels { labels: Vec<u8> },

    /// The mask contains no iris pixels, so no ratio can be computed.
    #[error("iris_pixels is zero; cannot compute ratios")]
    ZeroIrisArea,

    /// The model configuration could not be read.
    #[error("failed to read model config '{path}': {source}")]
    ModelConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model configuration is not valid JSON.
    #[error("failed to parse model config '{path}': {source}")]
    ModelConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The model configuration is not a JSON object.
    #[error("model config must be a JSON object")]
    ModelConfigShape,

    /// An image artifact could not be encoded or written.
    #[error("Failed to write image: {path}: {message}")]
    ImageWrite { path: PathBuf, message: String },

    /// A JSON artifact or the run-state file could not be persisted.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Shared state could not be deep-copied into a stage snapshot.
    #[error("failed to snapshot shared state: {0}")]
    Snapshot(#[source] serde_json::Error),

    /// The stage table violates the ordering or uniqueness rules.
    #[error("invalid stage table: {message}")]
    InvalidStageTable { message: String },
}

/// A fault raised by a stage body.
///
/// The executor absorbs every `StageError` and records the stage as
/// `failed`; it is never propagated to the caller of the run.
#[derive(Debug, Error)]
pub enum StageError {
    /// Free-form failure.
    #[error("{0}")]
    Message(String),

    /// I/O failure inside the stage.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON failure inside the stage.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Image encode/decode failure inside the stage.
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl StageError {
    /// Creates a free-form stage error.
    pub fn msg(message: impl Into<String>) -> Self {
        StageError::Message(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_error_message_is_stable() {
        let err = EngineError::UnexpectedLabels { labels: vec![7] };
        assert_eq!(err.to_string(), "Unexpected labels found in segmentation output");
    }

    #[test]
    fn test_stage_error_display() {
        assert_eq!(StageError::msg("boom").to_string(), "boom");
        let io = StageError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.to_string(), "disk");
    }
}
