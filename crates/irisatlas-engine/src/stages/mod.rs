//! Built-in stages.
//!
//! | Stage | Depends on |
//! |---|---|
//! | [`micro_features`] | none |
//! | [`sector_mapping`] | `micro_features` (optional) |
//! | [`interpretation`] | `micro_features`, `sector_mapping` (optional) |

pub mod interpretation;
pub mod micro_features;
pub mod sector_mapping;

pub use interpretation::Interpretation;
pub use micro_features::{Detection, Detector, DetectorParams, MicroFeatures};
pub use sector_mapping::SectorMapping;

use serde_json::{Map, Value};

pub(crate) const DISABLED_WARNING: &str = "Extension disabled by config.";

/// Reads the `enabled` flag of a stage's settings (default true).
pub(crate) fn enabled(settings: &Map<String, Value>) -> bool {
    settings
        .get("enabled")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}
