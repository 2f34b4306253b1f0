//! Run configuration.
//!
//! The configuration is a free-form JSON object. This module gives typed
//! access to the keys the runtime recognizes and produces the sanitized
//! snapshot that is persisted into run-state and manifest files.
//!
//! Recognized keys:
//! - `output_dir`, `state_path`
//! - `extensions.<stage>.{enabled, timeout_ms, version, ...}`
//! - `fail_on_extension_error` (advisory only)
//! - `model_config` / `model_config_path` / `model_folder` / `model_hash`
//! - `manifest_timestamp`
//! - `overlay_alpha`
//!
//! Keys starting with [`PRIVATE_KEY_PREFIX`] are ephemeral and never persisted.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{json_type_name, ConfigError};

/// Default per-stage time budget.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Prefix marking private/ephemeral configuration keys.
pub const PRIVATE_KEY_PREFIX: &str = "_";

/// Default run-state file name inside the output directory.
pub const DEFAULT_STATE_FILENAME: &str = "session_state.json";

/// A run configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunConfig {
    values: Map<String, Value>,
}

impl RunConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            other => Err(ConfigError::NotAnObject {
                found: json_type_name(&other),
            }),
        }
    }

    /// Loads a configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_value(value)
    }

    /// Sets a top-level key, returning the updated configuration.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Sets a top-level key in place.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Returns a top-level value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the whole configuration as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Output directory (`output_dir`, default `./outputs`).
    pub fn output_dir(&self) -> PathBuf {
        self.non_empty_str("output_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("outputs"))
    }

    /// Run-state file (`state_path`, default `<output_dir>/session_state.json`).
    pub fn state_path(&self, output_dir: &Path) -> PathBuf {
        self.non_empty_str("state_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| output_dir.join(DEFAULT_STATE_FILENAME))
    }

    /// Settings object for one stage (`extensions.<name>`), empty if absent.
    pub fn extension_settings(&self, name: &str) -> Map<String, Value> {
        extension_settings(&self.to_value(), name)
    }

    /// Time budget for one stage. Zero or negative budgets become 1 ms.
    pub fn extension_timeout_ms(&self, name: &str) -> u64 {
        self.extension_settings(name)
            .get("timeout_ms")
            .and_then(|value| {
                value_as_u64(value).or_else(|| value_as_f64(value).filter(|ms| *ms < 0.0).map(|_| 1))
            })
            .map(|ms| ms.max(1))
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    /// Configured version override for one stage, if any.
    pub fn extension_version(&self, name: &str) -> Option<String> {
        self.extension_settings(name)
            .get("version")
            .and_then(scalar_to_string)
    }

    /// The advisory `fail_on_extension_error` flag.
    pub fn fail_on_extension_error(&self) -> bool {
        self.values
            .get("fail_on_extension_error")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Manifest timestamp override, if a non-blank one is configured.
    pub fn manifest_timestamp(&self) -> Option<String> {
        self.values
            .get("manifest_timestamp")
            .and_then(scalar_to_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Overlay blend factor override.
    pub fn overlay_alpha(&self) -> Option<f64> {
        self.values.get("overlay_alpha").and_then(Value::as_f64)
    }

    /// Deep copy of the configuration with private keys removed.
    ///
    /// This is the only form of the configuration that is ever persisted.
    pub fn snapshot(&self) -> Value {
        let public: Map<String, Value> = self
            .values
            .iter()
            .filter(|(key, _)| !key.starts_with(PRIVATE_KEY_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(public)
    }

    fn non_empty_str(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Reads `extensions.<name>` out of a configuration value.
///
/// Shared by the runtime and by stages, which only see a snapshot.
pub fn extension_settings(config: &Value, name: &str) -> Map<String, Value> {
    config
        .get("extensions")
        .and_then(|e| e.get(name))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Interprets a number or numeric string as a non-negative integer.
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
