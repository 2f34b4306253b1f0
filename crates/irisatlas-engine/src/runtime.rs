//! The pipeline orchestrator.
//!
//! A run moves through the run-state file as follows:
//!
//! ```text
//! queued -> running -> (upstream steps, stages, results, manifest) -> completed
//!                   \-> failed (any run-fatal error, re-raised to the caller)
//! ```
//!
//! Upstream steps (image load, segmentation, measurements, image artifacts)
//! are fatal on failure. Stages never are: every stage outcome becomes a
//! telemetry record and, if it carries one, a run-level warning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use irisatlas_spec::{
    write_json_atomic, Manifest, PersistError, RunConfig, RunState, RunStateStore,
    TelemetryRecord, ENGINE_VERSION,
};
use serde_json::{json, Value};

use crate::context::{build_snapshot, RunInfo, SharedState};
use crate::determinism::DETERMINISTIC_SEED;
use crate::error::EngineResult;
use crate::executor;
use crate::gate::{self, GateDecision};
use crate::manifest_builder::{build_manifest, ManifestInputs};
use crate::measurements::{compute_measurements, Measurements};
use crate::model::{resolve_device, ModelConfig};
use crate::overlay::{render_overlay, write_png};
use crate::preprocess::load_image_for_analysis;
use crate::registry::StageTable;
use crate::result::AnalysisResult;
use crate::segmentation::{iris_sub_mask, validate_mask, Segmenter};

pub const MASK_FILENAME: &str = "mask.png";
pub const INPUT_COPY_FILENAME: &str = "input.png";
pub const OVERLAY_FILENAME: &str = "overlay.png";
pub const RESULTS_FILENAME: &str = "results.json";
pub const MANIFEST_FILENAME: &str = "manifest.json";

const ADVISORY_FAIL_FLAG_WARNING: &str =
    "fail_on_extension_error=true is reserved; soft-fail mode remains active.";

/// Progress notification: event name and payload.
pub type ProgressCallback = dyn Fn(&str, &Value) + Send + Sync;

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct RuntimeOutput {
    pub analysis_result: AnalysisResult,
    pub extension_telemetry: Vec<TelemetryRecord>,
    pub manifest: Manifest,
    pub results_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Drives one analysis run at a time.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use image::GrayImage;
/// use irisatlas_engine::{EngineResult, Runtime};
/// use irisatlas_spec::RunConfig;
///
/// let segmenter = |gray: &GrayImage| -> EngineResult<GrayImage> {
///     Ok(GrayImage::from_pixel(gray.width(), gray.height(), image::Luma([2])))
/// };
/// let config = RunConfig::new().with("output_dir", "out".into());
///
/// let output = Runtime::new(segmenter).run(Path::new("eye.png"), "auto", &config)?;
/// assert!(output.manifest.verify()?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Runtime {
    segmenter: Box<dyn Segmenter>,
    stages: StageTable,
    progress: Option<Box<ProgressCallback>>,
}

impl Runtime {
    /// Creates a runtime with the built-in stage table.
    pub fn new<S: Segmenter + 'static>(segmenter: S) -> Self {
        Self {
            segmenter: Box::new(segmenter),
            stages: StageTable::builtin(),
            progress: None,
        }
    }

    /// Replaces the stage table.
    pub fn with_stages(mut self, stages: StageTable) -> Self {
        self.stages = stages;
        self
    }

    /// Installs a progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// The stage table in use.
    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    /// Runs the full pipeline over `input`.
    ///
    /// On a run-fatal error the run-state file is left `failed` with the
    /// error message, and the error is returned. No manifest exists for such
    /// a run.
    pub fn run(&self, input: &Path, device: &str, config: &RunConfig) -> EngineResult<RuntimeOutput> {
        let output_dir = absolutize(&config.output_dir());
        std::fs::create_dir_all(&output_dir).map_err(|source| PersistError::Write {
            path: output_dir.clone(),
            source,
        })?;

        let input_path = absolutize(input);
        let snapshot = config.snapshot();
        let store = RunStateStore::new(absolutize(&config.state_path(&output_dir)));

        store.write(RunState::Queued, &input_path, &output_dir, &snapshot, None)?;
        store.write(RunState::Running, &input_path, &output_dir, &snapshot, None)?;
        tracing::info!(
            input = %input_path.display(),
            output_dir = %output_dir.display(),
            "run started"
        );

        let paths = RunPaths {
            input: input_path,
            output_dir,
        };
        match self.execute(&paths, device, config, &snapshot, &store) {
            Ok(output) => {
                self.emit("analysis_done", &json!({"result": "success", "error": Value::Null}));
                Ok(output)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(error = %message, "run failed");
                if let Err(state_err) = store.write(
                    RunState::Failed,
                    &paths.input,
                    &paths.output_dir,
                    &snapshot,
                    Some(&message),
                ) {
                    tracing::error!(error = %state_err, "could not record failed run state");
                }
                self.emit("analysis_done", &json!({"result": "failed", "error": message}));
                Err(err)
            }
        }
    }

    fn execute(
        &self,
        paths: &RunPaths,
        device: &str,
        config: &RunConfig,
        snapshot: &Value,
        store: &RunStateStore,
    ) -> EngineResult<RuntimeOutput> {
        let loaded = load_image_for_analysis(&paths.input)?;
        let mut warnings = loaded.warnings;

        let mut model = ModelConfig::load(config)?;
        let device = resolve_device(device);
        model.set_device(&device);
        self.emit("segmentation_started", &json!({"device": device}));

        let mask = self.segmenter.infer(&loaded.grayscale)?;
        validate_mask(&loaded.grayscale, &mask)?;
        let metrics = compute_measurements(&mask)?;

        let mask_path = paths.output_dir.join(MASK_FILENAME);
        let overlay_path = paths.output_dir.join(OVERLAY_FILENAME);
        let results_path = paths.output_dir.join(RESULTS_FILENAME);
        let manifest_path = paths.output_dir.join(MANIFEST_FILENAME);

        write_png(&mask_path, &DynamicImage::ImageLuma8(mask.clone()))?;
        write_png(
            &paths.output_dir.join(INPUT_COPY_FILENAME),
            &DynamicImage::ImageRgb8(loaded.original.clone()),
        )?;
        let overlay = render_overlay(
            &loaded.original,
            &mask,
            &model.class_colors(),
            model.overlay_alpha(config),
        );
        write_png(&overlay_path, &DynamicImage::ImageRgb8(overlay))?;

        if config.fail_on_extension_error() {
            warnings.push(ADVISORY_FAIL_FLAG_WARNING.to_string());
        }

        let shared = SharedState {
            iris_mask: iris_sub_mask(&mask),
            grayscale: loaded.grayscale,
            original: loaded.original,
            mask,
        };
        let run_info = RunInfo {
            input_path: paths.input.clone(),
            output_dir: paths.output_dir.clone(),
            device: device.clone(),
            model_version: model.model_version(),
        };
        let (outputs, telemetry) =
            self.run_stages(&shared, &run_info, &metrics, config, snapshot, &mut warnings)?;

        let analysis_result = AnalysisResult {
            status: "success".to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            model_version: model.model_version(),
            input_filename: paths
                .input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device,
            mask_path: mask_path.display().to_string(),
            overlay_path: overlay_path.display().to_string(),
            results_json_path: results_path.display().to_string(),
            metrics,
            warnings,
            extensions: outputs,
        };
        let payload = analysis_result
            .to_results_payload()
            .map_err(PersistError::from)?;
        write_json_atomic(&results_path, &payload)?;

        let timestamp = config.manifest_timestamp();
        let manifest = build_manifest(ManifestInputs {
            analysis: &analysis_result,
            telemetry: &telemetry,
            config_snapshot: snapshot,
            model_config: &model,
            run_state: RunState::Completed,
            input_path: &paths.input,
            output_dir: &paths.output_dir,
            timestamp: timestamp.as_deref(),
        })?;
        write_json_atomic(&manifest_path, &manifest)?;

        store.write(
            RunState::Completed,
            &paths.input,
            &paths.output_dir,
            snapshot,
            None,
        )?;
        tracing::info!(
            stages = telemetry.len(),
            warnings = analysis_result.warnings.len(),
            manifest_sha256 = %manifest.manifest_sha256,
            "run completed"
        );

        Ok(RuntimeOutput {
            analysis_result,
            extension_telemetry: telemetry,
            manifest,
            results_path,
            manifest_path,
        })
    }

    /// Runs every stage in table order.
    ///
    /// Returns the successful payloads by stage name and one telemetry
    /// record per stage. Only a snapshot failure is an error here.
    fn run_stages(
        &self,
        shared: &SharedState,
        run_info: &RunInfo,
        metrics: &Measurements,
        config: &RunConfig,
        snapshot: &Value,
        warnings: &mut Vec<String>,
    ) -> EngineResult<(BTreeMap<String, Value>, Vec<TelemetryRecord>)> {
        let mut outputs: BTreeMap<String, Value> = BTreeMap::new();
        let mut telemetry = Vec::with_capacity(self.stages.len());

        for stage in self.stages.iter() {
            let identity = stage.identity();
            let name = identity.name.clone();

            if let GateDecision::Skip { reason } = gate::check(&identity, &outputs) {
                tracing::info!(stage = %name, reason = %reason, "stage skipped");
                warnings.push(format!("[{}] {}", name, reason));
                telemetry.push(TelemetryRecord::skipped(&identity, reason));
                continue;
            }

            let configured_version = config.extension_version(&name);
            if let Some(warning) = gate::version_warning(&identity, configured_version.as_deref()) {
                warnings.push(format!("[{}] {}", name, warning));
            }

            let context = build_snapshot(shared, run_info, metrics, snapshot, &outputs, DETERMINISTIC_SEED)?;
            let timeout_ms = config.extension_timeout_ms(&name);
            self.emit(&format!("{}_started", name), &json!({"timeout_ms": timeout_ms}));
            tracing::debug!(stage = %name, timeout_ms, "stage started");

            let outcome = executor::invoke(Arc::clone(stage), context, timeout_ms);
            let status = outcome.result.status;
            tracing::info!(
                stage = %name,
                status = %status,
                duration_ms = outcome.telemetry.duration_ms,
                "stage finished"
            );

            if let Some(warning) = &outcome.result.warning {
                warnings.push(format!("[{}] {}", name, warning));
            }
            if status.is_success() {
                outputs.insert(name.clone(), outcome.result.payload);
            }
            telemetry.push(outcome.telemetry);
            self.emit(&format!("{}_done", name), &json!({"status": status}));
        }

        Ok((outputs, telemetry))
    }

    fn emit(&self, event: &str, payload: &Value) {
        if let Some(callback) = &self.progress {
            callback(event, payload);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("stages", &self.stages)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

struct RunPaths {
    input: PathBuf,
    output_dir: PathBuf,
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
