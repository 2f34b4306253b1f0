//! The run manifest.
//!
//! A manifest is the reproducibility record of one completed run: versions,
//! model identity, sanitized configuration, environment, per-stage telemetry,
//! and artifact paths. It carries its own integrity hash in
//! [`MANIFEST_HASH_FIELD`], computed over the canonical JSON of every other
//! field.
//!
//! # Example
//!
//! ```
//! use irisatlas_spec::{Manifest, ManifestArtifacts, RunState};
//!
//! let manifest = Manifest {
//!     app_version: "0.1.0".into(),
//!     engine_version: "0.5.0".into(),
//!     engine_api_version: "1".into(),
//!     manifest_schema_version: "1".into(),
//!     model_version: "unknown".into(),
//!     device: "cpu".into(),
//!     timestamp: "2024-01-01T00:00:00Z".into(),
//!     model_hash: "abc".into(),
//!     config_snapshot: serde_json::json!({}),
//!     environment_snapshot: serde_json::json!({}),
//!     extensions: Vec::new(),
//!     run_state: RunState::Completed,
//!     input_path: "in.png".into(),
//!     output_dir: "out".into(),
//!     artifacts: ManifestArtifacts::default(),
//!     manifest_sha256: String::new(),
//! }
//! .seal()
//! .unwrap();
//!
//! assert!(manifest.verify().unwrap());
//! ```

use serde::{Deserialize, Serialize};

use crate::hash::manifest_hash;
use crate::status::RunState;
use crate::telemetry::TelemetryRecord;

/// Name of the self-referential integrity field.
pub const MANIFEST_HASH_FIELD: &str = "manifest_sha256";

/// Paths of the artifacts a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestArtifacts {
    /// Segmentation mask image.
    pub mask_path: String,
    /// Overlay visualization image.
    pub overlay_path: String,
    /// Results JSON file.
    pub results_json_path: String,
}

/// Reproducibility record of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub app_version: String,
    pub engine_version: String,
    pub engine_api_version: String,
    pub manifest_schema_version: String,
    pub model_version: String,
    pub device: String,
    pub timestamp: String,
    /// SHA-256 identifying the model weights or, failing that, its config.
    pub model_hash: String,
    /// Sanitized configuration (private keys removed).
    pub config_snapshot: serde_json::Value,
    pub environment_snapshot: serde_json::Value,
    /// One telemetry record per stage, in execution order.
    pub extensions: Vec<TelemetryRecord>,
    pub run_state: RunState,
    pub input_path: String,
    pub output_dir: String,
    pub artifacts: ManifestArtifacts,
    /// Hash of the canonical JSON of every other field.
    pub manifest_sha256: String,
}

impl Manifest {
    /// Computes the integrity hash over every field except the hash itself.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        Ok(manifest_hash(&value))
    }

    /// Returns the manifest with its integrity hash filled in.
    pub fn seal(mut self) -> Result<Self, serde_json::Error> {
        self.manifest_sha256 = self.compute_hash()?;
        Ok(self)
    }

    /// Returns true if the stored hash matches the content.
    pub fn verify(&self) -> Result<bool, serde_json::Error> {
        Ok(self.compute_hash()? == self.manifest_sha256)
    }
}

/// Verifies a manifest given as raw JSON.
///
/// Works on the untyped value so that manifests with fields unknown to this
/// version still verify against exactly what was written.
pub fn verify_value(value: &serde_json::Value) -> bool {
    match value.get(MANIFEST_HASH_FIELD).and_then(|v| v.as_str()) {
        Some(stored) => manifest_hash(value) == stored,
        None => false,
    }
}
