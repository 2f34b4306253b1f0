//! Run-state record and store.
//!
//! Exactly one record exists per run. It lives in a single file that is
//! overwritten, never appended, at every lifecycle transition.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::atomic::{read_json, write_json_atomic};
use crate::error::PersistError;
use crate::status::RunState;

/// Contents of the run-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStateRecord {
    /// Current lifecycle state.
    pub run_state: RunState,
    /// UTC time of the transition.
    pub timestamp: String,
    /// Input image path.
    pub input_path: String,
    /// Output directory.
    pub output_dir: String,
    /// Sanitized configuration snapshot.
    pub config_snapshot: serde_json::Value,
    /// Human-readable cause, set only for `failed`.
    pub error: Option<String>,
}

impl RunStateRecord {
    /// Returns true if the record shows a run that never reached a terminal
    /// state, i.e. the writing process terminated uncleanly.
    pub fn is_unclean(&self) -> bool {
        self.run_state == RunState::Running
    }
}

/// Persists run lifecycle transitions to one file.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    /// Creates a store writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the run-state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically records a transition, replacing any previous record.
    pub fn write(
        &self,
        state: RunState,
        input_path: &Path,
        output_dir: &Path,
        config_snapshot: &serde_json::Value,
        error: Option<&str>,
    ) -> Result<RunStateRecord, PersistError> {
        let record = RunStateRecord {
            run_state: state,
            timestamp: crate::utc_now_iso(),
            input_path: input_path.display().to_string(),
            output_dir: output_dir.display().to_string(),
            config_snapshot: config_snapshot.clone(),
            error: error.map(str::to_string),
        };
        write_json_atomic(&self.path, &record)?;
        Ok(record)
    }

    /// Reads the current record, or `None` if no run has written one yet.
    pub fn read(&self) -> Result<Option<RunStateRecord>, PersistError> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_json(&self.path).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_overwrites_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path().join("session_state.json"));
        let snapshot = json!({"output_dir": "out"});

        assert!(store.read().unwrap().is_none());

        store
            .write(RunState::Queued, Path::new("in.png"), dir.path(), &snapshot, None)
            .unwrap();
        store
            .write(RunState::Running, Path::new("in.png"), dir.path(), &snapshot, None)
            .unwrap();

        let record = store.read().unwrap().unwrap();
        assert_eq!(record.run_state, RunState::Running);
        assert!(record.is_unclean());
        assert_eq!(record.config_snapshot, snapshot);

        store
            .write(
                RunState::Failed,
                Path::new("in.png"),
                dir.path(),
                &snapshot,
                Some("Unexpected labels found in segmentation output"),
            )
            .unwrap();
        let record = store.read().unwrap().unwrap();
        assert_eq!(record.run_state, RunState::Failed);
        assert!(!record.is_unclean());
        assert_eq!(
            record.error.as_deref(),
            Some("Unexpected labels found in segmentation output")
        );

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path().join("state.json"));
        store
            .write(RunState::Completed, Path::new("a.png"), Path::new("out"), &json!({}), None)
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let mut keys: Vec<&str> = raw.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["config_snapshot", "error", "input_path", "output_dir", "run_state", "timestamp"]
        );
        assert_eq!(raw["run_state"], "completed");
        assert!(raw["error"].is_null());
    }
}
