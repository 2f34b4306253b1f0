//! Crash-safe file replacement.
//!
//! Every persisted artifact goes through the same sequence:
//!
//! 1. write the full payload to a temporary file next to the target
//! 2. flush it to durable storage (`fsync`)
//! 3. rename it onto the target path
//!
//! The rename is atomic within a directory, so readers of the target see
//! either the complete old content or the complete new content, never a
//! partial write, wherever the process dies in the sequence.
//!
//! # Example
//!
//! ```
//! use irisatlas_spec::atomic::write_json_atomic;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("results.json");
//! write_json_atomic(&path, &serde_json::json!({"b": 1, "a": 2})).unwrap();
//!
//! let text = std::fs::read_to_string(&path).unwrap();
//! assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::PersistError;

/// A payload written and synced to a sibling temporary file, not yet
/// visible at its target path.
///
/// Dropping a `StagedWrite` without calling [`StagedWrite::commit`] removes
/// the temporary file and leaves the target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Writes `bytes` to a temporary file in the target's directory and
    /// syncs it to disk.
    pub fn prepare(path: &Path, bytes: &[u8]) -> Result<Self, PersistError> {
        let parent = parent_dir(path)?;
        std::fs::create_dir_all(&parent).map_err(|source| PersistError::Write {
            path: parent.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let write_err = |source| PersistError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(write_err)?;
        temp.write_all(bytes).map_err(write_err)?;
        temp.flush().map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;

        Ok(Self {
            temp,
            target: path.to_path_buf(),
        })
    }

    /// Path of the temporary file holding the staged payload.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Path the payload will be published to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically renames the staged file onto the target path.
    pub fn commit(self) -> Result<(), PersistError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|err| PersistError::Rename {
                path: target.clone(),
                source: err.error,
            })?;
        sync_parent_dir(&target);
        Ok(())
    }
}

/// Atomically replaces `path` with `bytes`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    StagedWrite::prepare(path, bytes)?.commit()
}

/// Serializes `value` canonically and atomically replaces `path` with it.
///
/// Keys are emitted in sorted order with two-space indentation and a trailing
/// newline, so equal values always produce byte-identical files.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = to_canonical_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

/// Reads and parses a JSON artifact.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let text = std::fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Renders a value as sorted-key, indented JSON.
pub fn to_canonical_pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    // Going through `Value` sorts struct fields as well as map keys.
    let value = serde_json::to_value(value)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn parent_dir(path: &Path) -> Result<PathBuf, PersistError> {
    match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Ok(PathBuf::from(".")),
        Some(p) => Ok(p.to_path_buf()),
        None => Err(PersistError::NoParent {
            path: path.to_path_buf(),
        }),
    }
}

/// Makes the rename itself durable. Best effort: not every platform lets a
/// directory be opened for syncing.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = std::fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
