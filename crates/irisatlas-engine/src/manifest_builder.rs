//! Manifest assembly.
//!
//! The model hash is resolved in priority order:
//!
//! 1. an explicit `model_hash` in the run configuration or the model config
//! 2. the SHA-256 of `<model_folder>/<checkpoint_name>` when that file exists
//! 3. the canonical hash of the model config itself
//!
//! The manifest's own `manifest_sha256` is computed last, over every other
//! field.

use std::path::{Path, PathBuf};

use irisatlas_spec::{
    canonical_value_hash, sha256_file, Manifest, ManifestArtifacts, RunState, TelemetryRecord,
    APP_VERSION, ENGINE_API_VERSION, ENGINE_VERSION, MANIFEST_SCHEMA_VERSION,
};
use serde_json::{json, Map, Value};

use crate::build_info;
use crate::error::{EngineError, EngineResult};
use crate::model::ModelConfig;
use crate::result::AnalysisResult;

/// Everything the manifest is assembled from.
#[derive(Debug, Clone, Copy)]
pub struct ManifestInputs<'a> {
    pub analysis: &'a AnalysisResult,
    pub telemetry: &'a [TelemetryRecord],
    pub config_snapshot: &'a Value,
    pub model_config: &'a ModelConfig,
    pub run_state: RunState,
    pub input_path: &'a Path,
    pub output_dir: &'a Path,
    /// Fixed timestamp; the current UTC time is used when `None`.
    pub timestamp: Option<&'a str>,
}

/// Assembles and seals the manifest.
pub fn build_manifest(inputs: ManifestInputs<'_>) -> EngineResult<Manifest> {
    let model_config = inputs.model_config.to_value();
    let model_version = inputs
        .model_config
        .get("model_version")
        .map(|_| inputs.model_config.model_version())
        .unwrap_or_else(|| inputs.analysis.model_version.clone());

    let manifest = Manifest {
        app_version: APP_VERSION.to_string(),
        engine_version: ENGINE_VERSION.to_string(),
        engine_api_version: ENGINE_API_VERSION.to_string(),
        manifest_schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
        model_version,
        device: inputs.analysis.device.clone(),
        timestamp: inputs
            .timestamp
            .map(str::to_string)
            .unwrap_or_else(irisatlas_spec::utc_now_iso),
        model_hash: compute_model_hash(&model_config, inputs.config_snapshot),
        config_snapshot: inputs.config_snapshot.clone(),
        environment_snapshot: environment_snapshot(),
        extensions: inputs.telemetry.to_vec(),
        run_state: inputs.run_state,
        input_path: inputs.input_path.display().to_string(),
        output_dir: inputs.output_dir.display().to_string(),
        artifacts: ManifestArtifacts {
            mask_path: inputs.analysis.mask_path.clone(),
            overlay_path: inputs.analysis.overlay_path.clone(),
            results_json_path: inputs.analysis.results_json_path.clone(),
        },
        manifest_sha256: String::new(),
    };

    manifest
        .seal()
        .map_err(|source| EngineError::Persist(source.into()))
}

/// Resolves the model content hash.
pub fn compute_model_hash(model_config: &Value, config_snapshot: &Value) -> String {
    let explicit = [config_snapshot, model_config]
        .into_iter()
        .filter_map(|source| source.get("model_hash"))
        .find_map(non_empty_scalar);
    if let Some(hash) = explicit {
        return hash;
    }

    let folder = model_config.get("model_folder").and_then(non_empty_scalar);
    let checkpoint = model_config.get("checkpoint_name").and_then(non_empty_scalar);
    if let (Some(folder), Some(checkpoint)) = (folder, checkpoint) {
        let path = PathBuf::from(folder).join(checkpoint);
        if path.is_file() {
            match sha256_file(&path) {
                Ok(hash) => return hash,
                Err(err) => tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "checkpoint unreadable; hashing model config instead"
                ),
            }
        }
    }

    canonical_value_hash(model_config)
}

/// Operating system, toolchain, and dependency versions of the running engine.
pub fn environment_snapshot() -> Value {
    let mut packages = Map::new();
    packages.insert("irisatlas-engine".into(), json!(env!("CARGO_PKG_VERSION")));
    packages.insert("irisatlas-spec".into(), json!(APP_VERSION));
    for (name, version) in build_info::DEPENDENCY_VERSIONS {
        packages.insert((*name).to_string(), json!(version));
    }

    json!({
        "os": {
            "system": std::env::consts::OS,
            "family": std::env::consts::FAMILY,
            "machine": std::env::consts::ARCH,
        },
        "runtime": {
            "implementation": "rust",
            "version": build_info::RUSTC_VERSION,
            "target": build_info::TARGET_TRIPLE,
            "profile": build_info::PROFILE,
            "debug_assertions": cfg!(debug_assertions),
        },
        "cuda_version": Value::Null,
        "packages": packages,
    })
}

fn non_empty_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::Measurements;
    use irisatlas_spec::ExtensionStatus;
    use std::collections::BTreeMap;

    #[test]
    fn test_explicit_hash_wins() {
        let hash = compute_model_hash(&json!({"model_hash": "m"}), &json!({"model_hash": "c"}));
        assert_eq!(hash, "c");
        let hash = compute_model_hash(&json!({"model_hash": "m"}), &json!({"model_hash": ""}));
        assert_eq!(hash, "m");
    }

    #[test]
    fn test_checkpoint_file_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("weights.pth"), b"hello world").unwrap();
        let model = json!({
            "model_folder": dir.path().display().to_string(),
            "checkpoint_name": "weights.pth",
        });
        assert_eq!(
            compute_model_hash(&model, &json!({})),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_falls_back_to_config_hash() {
        let model = json!({"model_folder": "/nowhere", "checkpoint_name": "x.pth", "device": "cpu"});
        assert_eq!(
            compute_model_hash(&model, &json!({})),
            canonical_value_hash(&model)
        );
    }

    #[test]
    fn test_environment_records_toolchain_and_dependencies() {
        let env = environment_snapshot();
        let rustc = env["runtime"]["version"].as_str().unwrap();
        assert!(!rustc.is_empty());
        assert!(env["runtime"]["target"].is_string());
        for package in ["image", "serde_json", "sha2", "irisatlas-engine"] {
            assert!(env["packages"][package].is_string(), "missing {package}");
        }
        assert_eq!(env, environment_snapshot());
    }

    #[test]
    fn test_build_manifest_is_sealed_and_ordered() {
        let analysis = AnalysisResult {
            status: "success".into(),
            engine_version: ENGINE_VERSION.into(),
            model_version: "unknown".into(),
            input_filename: "eye.png".into(),
            device: "cpu".into(),
            mask_path: "o/mask.png".into(),
            overlay_path: "o/overlay.png".into(),
            results_json_path: "o/results.json".into(),
            metrics: Measurements {
                pupil_pixels: 0,
                iris_pixels: 1,
                collarette_pixels: 0,
                furrow_pixels: 0,
                scurf_pixels: 0,
                pupil_to_iris: 0.0,
                collarette_to_iris: 0.0,
                furrow_to_iris: 0.0,
                scurf_to_iris: 0.0,
            },
            warnings: vec![],
            extensions: BTreeMap::new(),
        };
        let telemetry: Vec<TelemetryRecord> = ["c", "a", "b"]
            .iter()
            .map(|name| TelemetryRecord {
                name: name.to_string(),
                version: "1".into(),
                status: ExtensionStatus::Success,
                duration_ms: 1,
                peak_memory_mb: None,
                model_version: None,
                warning: None,
            })
            .collect();
        let model = ModelConfig::default();

        let manifest = build_manifest(ManifestInputs {
            analysis: &analysis,
            telemetry: &telemetry,
            config_snapshot: &json!({"output_dir": "o"}),
            model_config: &model,
            run_state: RunState::Completed,
            input_path: Path::new("/in/eye.png"),
            output_dir: Path::new("/o"),
            timestamp: Some("2024-01-01T00:00:00Z"),
        })
        .unwrap();

        assert!(manifest.verify().unwrap());
        assert_eq!(manifest.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(manifest.model_version, "unknown");
        let names: Vec<&str> = manifest.extensions.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(manifest.model_hash, canonical_value_hash(&json!({})));
    }
}
