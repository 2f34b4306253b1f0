//! Error types for persistence and configuration handling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while persisting run artifacts.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The target path has no usable parent directory.
    #[error("cannot persist to '{path}': path has no parent directory")]
    NoParent { path: PathBuf },

    /// Creating, writing, or syncing a file failed.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The final rename onto the target path failed.
    #[error("failed to replace '{path}': {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading a persisted artifact failed.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A payload could not be serialized or a stored artifact could not be parsed.
    #[error("JSON error for '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be converted to its canonical JSON form.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised while loading or interpreting a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not a JSON object.
    #[error("run configuration must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// The configuration file could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON.
    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Names the JSON type of a value for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_error_display_names_path() {
        let err = PersistError::NoParent {
            path: PathBuf::from("manifest.json"),
        };
        assert!(err.to_string().contains("manifest.json"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::NotAnObject { found: "array" };
        assert_eq!(
            err.to_string(),
            "run configuration must be a JSON object, got array"
        );
    }

    #[test]
    fn test_json_type_name() {
        assert_eq!(json_type_name(&serde_json::json!([])), "array");
        assert_eq!(json_type_name(&serde_json::json!({})), "object");
        assert_eq!(json_type_name(&serde_json::json!(1.5)), "number");
    }
}
