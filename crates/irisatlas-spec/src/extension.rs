//! Stage identity and stage result types.
//!
//! A stage ("extension") declares who it is and what it depends on through a
//! [`StageIdentity`], and reports what it produced through an
//! [`ExtensionResult`].
//!
//! # Example
//!
//! ```
//! use irisatlas_spec::{ExtensionResult, ExtensionStatus, StageIdentity};
//!
//! let identity = StageIdentity::new("sector_mapping", "1")
//!     .optional_requires(["micro_features"]);
//! assert!(identity.requires.is_empty());
//!
//! let result = ExtensionResult::success(serde_json::json!({"sectors": 12}));
//! assert_eq!(result.status, ExtensionStatus::Success);
//! assert!(result.malformed_reason().is_none());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::json_type_name;
use crate::status::ExtensionStatus;

/// Declared identity of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageIdentity {
    /// Unique stage name; also the key of its output in the run outputs.
    pub name: String,
    /// Implementation version.
    pub version: String,
    /// Stages that must have succeeded before this one may run.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Stages whose outputs are read when present. Never block execution.
    #[serde(default)]
    pub optional_requires: Vec<String>,
}

impl StageIdentity {
    /// Creates an identity with no dependencies.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            requires: Vec::new(),
            optional_requires: Vec::new(),
        }
    }

    /// Sets the hard dependencies.
    pub fn requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the optional dependencies.
    pub fn optional_requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_requires = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Structured output of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionResult {
    /// Outcome reported by the stage (or synthesized by the executor).
    pub status: ExtensionStatus,
    /// Key-value payload. Only merged into the run outputs on success.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    /// Optional human-readable warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Model version reported by the producer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ExtensionResult {
    /// Creates a result with the given status and an empty payload.
    pub fn new(status: ExtensionStatus) -> Self {
        Self {
            status,
            payload: empty_payload(),
            warning: None,
            model_version: None,
        }
    }

    /// Creates a successful result carrying `payload`.
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            payload,
            ..Self::new(ExtensionStatus::Success)
        }
    }

    /// Creates a skipped result with an explanation.
    pub fn skipped(warning: impl Into<String>) -> Self {
        Self::new(ExtensionStatus::Skipped).with_warning(warning)
    }

    /// Creates a failed result with an explanation.
    pub fn failed(warning: impl Into<String>) -> Self {
        Self::new(ExtensionStatus::Failed).with_warning(warning)
    }

    /// Attaches a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    /// Attaches a producer-reported model version.
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    /// Explains why this result cannot be accepted from a stage body, or
    /// returns `None` when it is well-formed.
    ///
    /// The payload must be a JSON object, and `Timeout` is reserved for the
    /// executor.
    pub fn malformed_reason(&self) -> Option<String> {
        if !self.payload.is_object() {
            return Some(format!(
                "payload must be an object, got {}",
                json_type_name(&self.payload)
            ));
        }
        if self.status == ExtensionStatus::Timeout {
            return Some("status 'timeout' is reserved for the runtime".to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_builder() {
        let identity = StageIdentity::new("b", "2")
            .requires(["a"])
            .optional_requires(vec!["c".to_string()]);
        assert_eq!(identity.name, "b");
        assert_eq!(identity.version, "2");
        assert_eq!(identity.requires, vec!["a"]);
        assert_eq!(identity.optional_requires, vec!["c"]);
    }

    #[test]
    fn test_result_constructors() {
        let ok = ExtensionResult::success(json!({"k": 1})).with_model_version("m1");
        assert_eq!(ok.status, ExtensionStatus::Success);
        assert_eq!(ok.model_version.as_deref(), Some("m1"));

        let skipped = ExtensionResult::skipped("disabled");
        assert_eq!(skipped.status, ExtensionStatus::Skipped);
        assert_eq!(skipped.payload, json!({}));
        assert_eq!(skipped.warning.as_deref(), Some("disabled"));

        let failed = ExtensionResult::failed("boom");
        assert_eq!(failed.status, ExtensionStatus::Failed);
    }

    #[test]
    fn test_malformed_reason() {
        assert!(ExtensionResult::success(json!({})).malformed_reason().is_none());

        let bad_payload = ExtensionResult::success(json!([1, 2]));
        assert_eq!(
            bad_payload.malformed_reason().as_deref(),
            Some("payload must be an object, got array")
        );

        let reserved = ExtensionResult::new(ExtensionStatus::Timeout);
        assert!(reserved.malformed_reason().is_some());
    }

    #[test]
    fn test_result_deserialize_defaults() {
        let result: ExtensionResult = serde_json::from_str(r#"{"status":"failed"}"#).unwrap();
        assert_eq!(result.payload, json!({}));
        assert!(result.warning.is_none());
    }
}
