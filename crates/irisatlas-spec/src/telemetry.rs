//! Per-stage audit records.

use serde::{Deserialize, Serialize};

use crate::extension::StageIdentity;
use crate::status::ExtensionStatus;

/// Audit entry for one stage execution.
///
/// Exactly one record is appended per stage per run, in execution order,
/// whatever the outcome. Skipped stages that never ran report zero duration
/// and no memory figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Stage name.
    pub name: String,
    /// Implementation version that ran (never the configured override).
    pub version: String,
    /// Outcome.
    pub status: ExtensionStatus,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Process resident high-water mark during the attempt, in MiB. Includes
    /// the process baseline, not only the stage's own allocations.
    pub peak_memory_mb: Option<f64>,
    /// Model version reported by the stage.
    #[serde(default)]
    pub model_version: Option<String>,
    /// Warning raised by or about the stage.
    #[serde(default)]
    pub warning: Option<String>,
}

impl TelemetryRecord {
    /// Record for a stage that was gated out before invocation.
    pub fn skipped(identity: &StageIdentity, warning: impl Into<String>) -> Self {
        Self {
            name: identity.name.clone(),
            version: identity.version.clone(),
            status: ExtensionStatus::Skipped,
            duration_ms: 0,
            peak_memory_mb: None,
            model_version: None,
            warning: Some(warning.into()),
        }
    }
}

/// Rounds a byte count to MiB with three decimals.
pub fn bytes_to_mib(bytes: u64) -> f64 {
    let mib = bytes as f64 / (1024.0 * 1024.0);
    (mib * 1000.0).round() / 1000.0
}
