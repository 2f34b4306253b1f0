//! IrisAtlas CLI library.
//!
//! Command implementations for the `irisatlas` binary, plus the file-backed
//! segmenter used when the label mask comes from disk.

pub mod commands;
pub mod logging;
pub mod mask_segmenter;

pub use mask_segmenter::MaskFileSegmenter;
