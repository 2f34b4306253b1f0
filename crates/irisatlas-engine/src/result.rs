//! The analysis result returned to callers and persisted as `results.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::measurements::Measurements;

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: String,
    pub engine_version: String,
    pub model_version: String,
    pub input_filename: String,
    pub device: String,
    pub mask_path: String,
    pub overlay_path: String,
    pub results_json_path: String,
    pub metrics: Measurements,
    /// Warnings from every step and stage, in execution order.
    pub warnings: Vec<String>,
    /// Successful stage payloads by stage name.
    pub extensions: BTreeMap<String, Value>,
}

/// Keys copied from stage payloads to the top level of `results.json`.
const MIRRORED_KEYS: &[(&str, &[&str])] = &[
    ("micro_features", &["micro_feature_metrics", "micro_feature_boxes"]),
    ("sector_mapping", &["sector_density_metrics"]),
    ("interpretation", &["interpretation_summary", "interpretation_text"]),
];

impl AnalysisResult {
    /// The `results.json` body: the result itself plus top-level copies of
    /// well-known stage outputs, for consumers that do not walk
    /// `extensions`.
    pub fn to_results_payload(&self) -> Result<Value, serde_json::Error> {
        let mut payload = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut payload {
            for (stage, keys) in MIRRORED_KEYS {
                let Some(output) = self.extensions.get(*stage) else {
                    continue;
                };
                for key in *keys {
                    let value = output.get(*key).cloned().unwrap_or(Value::Null);
                    map.insert((*key).to_string(), value);
                }
            }
        }
        Ok(payload)
    }
}
