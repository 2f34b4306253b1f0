//! Context snapshots handed to stages.
//!
//! The orchestrator owns the shared rasters, metrics, configuration, and
//! accumulated outputs. A stage only ever sees a [`ContextSnapshot`] built
//! from them by [`build_snapshot`]:
//!
//! - rasters are copied into fresh buffers behind [`Frozen`], which only
//!   hands out shared references
//! - configuration and prior outputs go through a serialize/deserialize
//!   round-trip, so nothing in the snapshot aliases orchestrator state

use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use rand_pcg::Pcg32;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::determinism;
use crate::error::{EngineError, EngineResult};
use crate::measurements::Measurements;

/// A read-only copy of a value.
///
/// Cloning a `Frozen` shares the same copy; there is no way to obtain a
/// mutable reference to it.
#[derive(Debug)]
pub struct Frozen<T>(Arc<T>);

impl<T: Clone> Frozen<T> {
    /// Copies `value` into a new read-only buffer.
    pub fn copy_of(value: &T) -> Self {
        Frozen(Arc::new(value.clone()))
    }
}

impl<T> Clone for Frozen<T> {
    fn clone(&self) -> Self {
        Frozen(Arc::clone(&self.0))
    }
}

impl<T> Deref for Frozen<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Raster state produced by the upstream steps, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct SharedState {
    pub grayscale: GrayImage,
    pub original: RgbImage,
    /// Label mask.
    pub mask: GrayImage,
    /// Binary (0/1) iris sub-mask.
    pub iris_mask: GrayImage,
}

/// Run-level identity carried into every snapshot.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub device: String,
    pub model_version: String,
}

/// Isolated view of the run for one stage invocation.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub grayscale: Frozen<GrayImage>,
    pub original: Frozen<RgbImage>,
    pub mask: Frozen<GrayImage>,
    pub iris_mask: Frozen<GrayImage>,
    pub metrics: Measurements,
    pub device: String,
    pub model_version: String,
    /// Sanitized run configuration.
    pub config: Value,
    /// Successful outputs of earlier stages, by stage name.
    pub extension_outputs: BTreeMap<String, Value>,
    /// Seed returned by the determinism reset for this invocation.
    pub seed: u64,
}

impl ContextSnapshot {
    /// Settings of one stage (`extensions.<name>`), empty if absent.
    pub fn stage_settings(&self, name: &str) -> Map<String, Value> {
        irisatlas_spec::config::extension_settings(&self.config, name)
    }

    /// Output of an earlier stage, if it succeeded.
    pub fn prior_output(&self, name: &str) -> Option<&Value> {
        self.extension_outputs.get(name)
    }

    /// Reproducible random stream for this invocation.
    pub fn rng(&self) -> Pcg32 {
        determinism::stage_rng(self.seed)
    }
}

/// Builds the snapshot for one stage invocation. Has no side effects.
pub fn build_snapshot(
    shared: &SharedState,
    run: &RunInfo,
    metrics: &Measurements,
    config: &Value,
    outputs: &BTreeMap<String, Value>,
    seed: u64,
) -> EngineResult<ContextSnapshot> {
    Ok(ContextSnapshot {
        input_path: run.input_path.clone(),
        output_dir: run.output_dir.clone(),
        grayscale: Frozen::copy_of(&shared.grayscale),
        original: Frozen::copy_of(&shared.original),
        mask: Frozen::copy_of(&shared.mask),
        iris_mask: Frozen::copy_of(&shared.iris_mask),
        metrics: *metrics,
        device: run.device.clone(),
        model_version: run.model_version.clone(),
        config: deep_copy(config)?,
        extension_outputs: deep_copy(outputs)?,
        seed,
    })
}

/// Copies a value through its JSON form.
pub fn deep_copy<T>(value: &T) -> EngineResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let bytes = serde_json::to_vec(value).map_err(EngineError::Snapshot)?;
    serde_json::from_slice(&bytes).map_err(EngineError::Snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> (SharedState, RunInfo, Measurements) {
        let mask = GrayImage::from_raw(2, 2, vec![2, 2, 1, 0]).unwrap();
        let shared = SharedState {
            grayscale: GrayImage::new(2, 2),
            original: RgbImage::new(2, 2),
            iris_mask: crate::segmentation::iris_sub_mask(&mask),
            mask: mask.clone(),
        };
        let run = RunInfo {
            input_path: PathBuf::from("in.png"),
            output_dir: PathBuf::from("out"),
            device: "cpu".into(),
            model_version: "unknown".into(),
        };
        let metrics = crate::measurements::compute_measurements(&mask).unwrap();
        (shared, run, metrics)
    }

    #[test]
    fn test_snapshot_does_not_alias_orchestrator_state() {
        let (mut shared, run, metrics) = fixture();
        let config = json!({"extensions": {"a": {"timeout_ms": 5}}});
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), json!({"count": 1}));

        let snapshot = build_snapshot(&shared, &run, &metrics, &config, &outputs, 0).unwrap();

        shared.mask.put_pixel(0, 0, image::Luma([5]));
        outputs.get_mut("a").unwrap()["count"] = json!(2);
        outputs.insert("b".to_string(), json!({}));

        assert_eq!(snapshot.mask.get_pixel(0, 0).0[0], 2);
        assert_eq!(snapshot.prior_output("a"), Some(&json!({"count": 1})));
        assert!(snapshot.prior_output("b").is_none());
        assert_eq!(snapshot.stage_settings("a")["timeout_ms"], json!(5));
    }

    #[test]
    fn test_stage_mutating_its_copy_is_invisible() {
        let (shared, run, metrics) = fixture();
        let outputs = BTreeMap::new();
        let config = json!({"k": [1, 2]});
        let snapshot = build_snapshot(&shared, &run, &metrics, &config, &outputs, 0).unwrap();

        let mut stage_copy = snapshot.clone();
        stage_copy.config["k"] = json!("changed");
        stage_copy.extension_outputs.insert("x".into(), json!(1));

        assert_eq!(config, json!({"k": [1, 2]}));
        assert_eq!(snapshot.config, json!({"k": [1, 2]}));
        assert!(snapshot.extension_outputs.is_empty());
    }

    #[test]
    fn test_rng_follows_seed() {
        use rand::Rng;
        let (shared, run, metrics) = fixture();
        let outputs = BTreeMap::new();
        let a = build_snapshot(&shared, &run, &metrics, &json!({}), &outputs, 0).unwrap();
        let b = build_snapshot(&shared, &run, &metrics, &json!({}), &outputs, 0).unwrap();
        assert_eq!(a.rng().gen::<u64>(), b.rng().gen::<u64>());
    }
}
