//! IrisAtlas Canonical Run Library
//!
//! This crate provides the types, hashing, and persistence primitives shared by
//! the IrisAtlas analysis engine and its tooling. It contains no pipeline logic.
//!
//! # Overview
//!
//! Every analysis run leaves three JSON artifacts behind:
//!
//! - **Run-state file**: the lifecycle marker of the run, overwritten at each
//!   transition (`queued` → `running` → `completed` | `failed`)
//! - **Results file**: the analysis result plus every successful stage output
//! - **Manifest file**: a canonical, self-hashed audit record of the run
//!
//! All three are written through [`atomic::write_json_atomic`], so a reader
//! only ever observes a complete previous or a complete new version.
//!
//! # Example
//!
//! ```
//! use irisatlas_spec::hash::{canonicalize_json, sha256_hex};
//!
//! let value = serde_json::json!({"b": 1, "a": [true, null]});
//! let canonical = canonicalize_json(&value);
//! assert_eq!(canonical, r#"{"a":[true,null],"b":1}"#);
//! assert_eq!(sha256_hex(canonical.as_bytes()).len(), 64);
//! ```
//!
//! # Modules
//!
//! - [`atomic`]: Crash-safe file replacement
//! - [`config`]: Run configuration accessors and snapshotting
//! - [`error`]: Persistence and configuration errors
//! - [`extension`]: Stage identity and stage result types
//! - [`hash`]: Canonical JSON and SHA-256 helpers
//! - [`manifest`]: The run manifest and its integrity hash
//! - [`run_state`]: Run-state record and store
//! - [`status`]: Run and stage status enums
//! - [`telemetry`]: Per-stage audit records

pub mod atomic;
pub mod config;
pub mod error;
pub mod extension;
pub mod hash;
pub mod manifest;
pub mod run_state;
pub mod status;
pub mod telemetry;

// Re-export commonly used types at the crate root
pub use atomic::{write_atomic, write_json_atomic, StagedWrite};
pub use config::{RunConfig, DEFAULT_TIMEOUT_MS};
pub use error::{ConfigError, PersistError};
pub use extension::{ExtensionResult, StageIdentity};
pub use hash::{canonical_value_hash, canonicalize_json, sha256_file, sha256_hex};
pub use manifest::{Manifest, ManifestArtifacts, MANIFEST_HASH_FIELD};
pub use run_state::{RunStateRecord, RunStateStore};
pub use status::{ExtensionStatus, RunState};
pub use telemetry::TelemetryRecord;

/// Application version stamped into every manifest.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logical engine version. Part of every manifest, so bumping it changes the
/// manifest hash of otherwise identical runs.
pub const ENGINE_VERSION: &str = "0.5.0";

/// Version of the public engine API contract.
pub const ENGINE_API_VERSION: &str = "1";

/// Manifest schema version (always "1" for this layout).
pub const MANIFEST_SCHEMA_VERSION: &str = "1";

/// Formats the current UTC time at second precision (`2024-01-31T12:00:00Z`).
pub fn utc_now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
