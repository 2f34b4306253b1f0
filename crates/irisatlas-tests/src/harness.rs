//! Test harness utilities: scratch workspaces, fixture images, fake
//! segmenters, and probe stages that record how they were called.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{GrayImage, Luma, Rgb, RgbImage};
use irisatlas_engine::{ContextSnapshot, EngineResult, Extension, StageError};
use irisatlas_spec::{ExtensionResult, RunConfig, RunStateRecord, RunStateStore, StageIdentity};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Side length of the fixture eye image.
pub const EYE_SIZE: u32 = 32;

/// Fixed manifest timestamp used by every fixture configuration.
pub const FIXED_TIMESTAMP: &str = "2024-01-01T00:00:00Z";

/// A scratch directory holding one input image and one output directory.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create work dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }

    /// Writes a near-gray gradient image and returns its path.
    pub fn write_eye(&self) -> PathBuf {
        let path = self.path().join("eye.png");
        let img = RgbImage::from_fn(EYE_SIZE, EYE_SIZE, |x, y| {
            let v = (x * 4 + y * 3) as u8;
            Rgb([v, v, v.saturating_add(2)])
        });
        img.save(&path).expect("Failed to write fixture image");
        path
    }

    /// Base configuration: output directory plus fixed manifest timestamp.
    pub fn config(&self) -> RunConfig {
        RunConfig::new()
            .with("output_dir", self.output_dir().display().to_string().into())
            .with("manifest_timestamp", FIXED_TIMESTAMP.into())
    }

    /// Base configuration with `extensions` set.
    pub fn config_with_extensions(&self, extensions: Value) -> RunConfig {
        self.config().with("extensions", extensions)
    }

    /// Reads the run-state record from the default location.
    pub fn run_state(&self) -> RunStateRecord {
        RunStateStore::new(self.output_file("session_state.json"))
            .read()
            .expect("Failed to read run state")
            .expect("No run state written")
    }

    /// Reads a JSON artifact from the output directory.
    pub fn read_json(&self, name: &str) -> Value {
        let text = std::fs::read_to_string(self.output_file(name)).expect("Failed to read artifact");
        serde_json::from_str(&text).expect("Artifact is not JSON")
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Segmenter producing a centred pupil disc inside an iris ring.
pub fn ring_segmenter(gray: &GrayImage) -> EngineResult<GrayImage> {
    let (w, h) = gray.dimensions();
    let (cx, cy) = (w as i64 / 2, h as i64 / 2);
    Ok(GrayImage::from_fn(w, h, |x, y| {
        let (dx, dy) = (x as i64 - cx, y as i64 - cy);
        let d2 = dx * dx + dy * dy;
        let label = match d2 {
            d if d <= 9 => 1,
            d if d <= 100 && dx > 6 => 3,
            d if d <= 144 => 2,
            _ => 0,
        };
        Luma([label])
    }))
}

/// Segmenter filling the whole raster with one label.
pub fn constant_segmenter(label: u8) -> impl Fn(&GrayImage) -> EngineResult<GrayImage> + 'static {
    move |gray: &GrayImage| Ok(GrayImage::from_pixel(gray.width(), gray.height(), Luma([label])))
}

/// What a [`ProbeStage`] does when invoked.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return a success payload naming the stage.
    Succeed,
    /// Sleep, then succeed.
    Sleep(Duration),
    /// Return a stage error with this message.
    Fail(String),
    /// Panic with this message.
    Panic(String),
    /// Return a success whose payload is not an object.
    Malformed,
}

/// A configurable stage that counts its invocations and records the prior
/// outputs it was shown.
#[derive(Clone)]
pub struct ProbeStage {
    identity: StageIdentity,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<BTreeMap<String, Value>>>>,
}

impl ProbeStage {
    pub fn new(name: &str) -> Self {
        Self {
            identity: StageIdentity::new(name, "1"),
            behavior: Behavior::Succeed,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requires(mut self, deps: &[&str]) -> Self {
        self.identity = self.identity.requires(deps.iter().copied());
        self
    }

    pub fn optional_requires(mut self, deps: &[&str]) -> Self {
        self.identity = self.identity.optional_requires(deps.iter().copied());
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Number of times the stage body has been entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prior outputs seen by each invocation, in call order.
    pub fn seen_outputs(&self) -> Vec<BTreeMap<String, Value>> {
        self.seen.lock().expect("probe lock poisoned").clone()
    }

    /// Shares this probe as a stage table entry. The returned handle and
    /// `self` observe the same counters.
    pub fn handle(&self) -> Arc<dyn Extension> {
        Arc::new(self.clone())
    }
}

impl Extension for ProbeStage {
    fn identity(&self) -> StageIdentity {
        self.identity.clone()
    }

    fn run(&self, ctx: &ContextSnapshot) -> Result<ExtensionResult, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .expect("probe lock poisoned")
            .push(ctx.extension_outputs.clone());

        let payload = json!({
            "stage": self.identity.name,
            "iris_pixels": ctx.metrics.iris_pixels,
        });
        match &self.behavior {
            Behavior::Succeed => Ok(ExtensionResult::success(payload)),
            Behavior::Sleep(duration) => {
                std::thread::sleep(*duration);
                Ok(ExtensionResult::success(payload))
            }
            Behavior::Fail(message) => Err(StageError::msg(message.clone())),
            Behavior::Panic(message) => panic!("{}", message),
            Behavior::Malformed => Ok(ExtensionResult::success(json!([1, 2, 3]))),
        }
    }
}

/// Removes the measured telemetry fields (`duration_ms`, `peak_memory_mb`)
/// and the hash covering them, leaving only the reproducible part of a
/// manifest.
pub fn reproducible_manifest_view(manifest: &Value) -> Value {
    let mut view = manifest.clone();
    if let Some(map) = view.as_object_mut() {
        map.remove(irisatlas_spec::MANIFEST_HASH_FIELD);
    }
    if let Some(records) = view.get_mut("extensions").and_then(Value::as_array_mut) {
        for record in records {
            if let Some(record) = record.as_object_mut() {
                record.remove("duration_ms");
                record.remove("peak_memory_mb");
            }
        }
    }
    view
}
