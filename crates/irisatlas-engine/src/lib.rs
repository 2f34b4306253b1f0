//! IrisAtlas Analysis Runtime
//!
//! Runs a fixed-order pipeline of independently failable stages over the
//! output of an upstream segmentation step, and leaves a reproducible,
//! hashed record of what ran.
//!
//! # Overview
//!
//! For every stage in the [`StageTable`], in order:
//!
//! 1. the dependency [`gate`] decides whether the stage may run
//! 2. [`context::build_snapshot`] assembles an isolated view of the run
//! 3. [`executor::invoke`] runs the stage on a worker thread under its time
//!    budget and normalizes the outcome
//! 4. the telemetry record is appended and a successful payload is merged
//!
//! Afterwards the results file and the sealed [`irisatlas_spec::Manifest`]
//! are written atomically and the run-state file is marked `completed`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use image::GrayImage;
//! use irisatlas_engine::{EngineResult, Runtime};
//! use irisatlas_spec::RunConfig;
//!
//! fn segment(gray: &GrayImage) -> EngineResult<GrayImage> {
//!     Ok(GrayImage::from_pixel(gray.width(), gray.height(), image::Luma([2])))
//! }
//!
//! let config = RunConfig::new()
//!     .with("output_dir", "outputs".into())
//!     .with("extensions", serde_json::json!({"sector_mapping": {"schema": 24}}));
//! let output = Runtime::new(segment).run(Path::new("eye.png"), "cpu", &config)?;
//! for record in &output.extension_telemetry {
//!     println!("{} {} {}ms", record.name, record.status, record.duration_ms);
//! }
//! # Ok::<(), irisatlas_engine::EngineError>(())
//! ```

pub mod build_info;
pub mod context;
pub mod determinism;
pub mod error;
pub mod executor;
pub mod gate;
pub mod manifest_builder;
pub mod measurements;
pub mod memory;
pub mod model;
pub mod overlay;
pub mod preprocess;
pub mod registry;
pub mod result;
pub mod runtime;
pub mod segmentation;
pub mod stage;
pub mod stages;

pub use context::{build_snapshot, ContextSnapshot, Frozen, RunInfo, SharedState};
pub use error::{EngineError, EngineResult, StageError};
pub use executor::{invoke, StageOutcome};
pub use gate::GateDecision;
pub use manifest_builder::{build_manifest, compute_model_hash, ManifestInputs};
pub use measurements::{compute_measurements, Measurements};
pub use model::ModelConfig;
pub use registry::{build_extensions, StageTable, EXECUTION_ORDER};
pub use result::AnalysisResult;
pub use runtime::{Runtime, RuntimeOutput};
pub use segmentation::Segmenter;
pub use stage::Extension;
pub use stages::{Detection, Detector, DetectorParams};
