//! Model identity: configuration loading and device resolution.

use std::path::PathBuf;

use irisatlas_spec::RunConfig;
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};
use crate::overlay::{ClassColors, DEFAULT_OVERLAY_ALPHA};

/// Model configuration document.
///
/// Sources, in priority order: the inline `model_config` object of the run
/// configuration, then the JSON file named by `model_config_path`. With
/// neither, the model is unidentified and reports version `unknown`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelConfig {
    values: Map<String, Value>,
}

impl ModelConfig {
    /// Resolves the model configuration for a run.
    pub fn load(config: &RunConfig) -> EngineResult<Self> {
        if let Some(Value::Object(inline)) = config.get("model_config") {
            return Ok(Self {
                values: inline.clone(),
            });
        }

        let path = config
            .get("model_config_path")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let path = PathBuf::from(path);
        let text = std::fs::read_to_string(&path).map_err(|source| EngineError::ModelConfigRead {
            path: path.clone(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&text).map_err(|source| EngineError::ModelConfigParse {
                path: path.clone(),
                source,
            })?;
        let Value::Object(mut values) = value else {
            return Err(EngineError::ModelConfigShape);
        };

        if let Some(folder) = config.get("model_folder").and_then(Value::as_str) {
            if !folder.is_empty() {
                values.insert("model_folder".into(), Value::String(folder.to_string()));
            }
        }
        Ok(Self { values })
    }

    /// Wraps an existing JSON object.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Model version, `unknown` when unset.
    pub fn model_version(&self) -> String {
        match self.values.get("model_version") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => "unknown".to_string(),
        }
    }

    /// Records the resolved device on the configuration.
    pub fn set_device(&mut self, device: &str) {
        self.values
            .insert("device".into(), Value::String(device.to_string()));
    }

    /// Overlay blend factor: run override, then `overlay.alpha`, then the default.
    pub fn overlay_alpha(&self, config: &RunConfig) -> f64 {
        config
            .overlay_alpha()
            .or_else(|| self.overlay_section()?.get("alpha").and_then(Value::as_f64))
            .unwrap_or(DEFAULT_OVERLAY_ALPHA)
    }

    /// Class colours from `overlay.class_colors_bgr` (label → `[b, g, r]`).
    pub fn class_colors(&self) -> ClassColors {
        let Some(entries) = self
            .overlay_section()
            .and_then(|overlay| overlay.get("class_colors_bgr"))
            .and_then(Value::as_object)
        else {
            return ClassColors::new();
        };
        entries
            .iter()
            .filter_map(|(label, bgr)| {
                let label: u8 = label.trim().parse().ok()?;
                let channels = bgr.as_array()?;
                if channels.len() != 3 {
                    return None;
                }
                let mut rgb = [0u8; 3];
                for (i, channel) in channels.iter().rev().enumerate() {
                    rgb[i] = channel.as_u64()?.min(255) as u8;
                }
                Some((label, rgb))
            })
            .collect()
    }

    /// Returns a field of the configuration.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns the configuration as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    fn overlay_section(&self) -> Option<&Map<String, Value>> {
        self.values.get("overlay").and_then(Value::as_object)
    }
}

/// Normalizes a requested device.
///
/// `cpu` and `cuda` are kept. Anything else, including `auto`, resolves to
/// `cpu`: the runtime has no accelerator probe of its own.
pub fn resolve_device(requested: &str) -> String {
    match requested.trim().to_lowercase().as_str() {
        "cuda" => "cuda".to_string(),
        _ => "cpu".to_string(),
    }
}
