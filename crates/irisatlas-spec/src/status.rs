//! Run lifecycle and stage outcome enums.

use serde::{Deserialize, Serialize};

/// Lifecycle marker of an entire analysis run.
///
/// Transitions written by the engine:
/// - `Queued` -> `Running`
/// - `Running` -> `Completed`
/// - `Queued` | `Running` -> `Failed`
///
/// A record left in `Running` means the process terminated uncleanly. Such a
/// run is never resumed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Accepted, no work started yet.
    Queued,
    /// Work in progress.
    Running,
    /// Manifest persisted, run finished.
    Completed,
    /// An unrecovered, run-fatal error occurred.
    Failed,
    /// Stopped on request before completion.
    Cancelled,
}

impl RunState {
    /// Returns the wire name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    /// Returns true if no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStatus {
    /// The stage produced a payload that was merged into the run outputs.
    Success,
    /// The stage did not run, or chose not to produce a result.
    Skipped,
    /// The stage exceeded its time budget; its result was discarded.
    Timeout,
    /// The stage raised a fault or returned a malformed result.
    Failed,
}

impl ExtensionStatus {
    /// Returns the wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Success => "success",
            ExtensionStatus::Skipped => "skipped",
            ExtensionStatus::Timeout => "timeout",
            ExtensionStatus::Failed => "failed",
        }
    }

    /// Returns true for the only status whose payload is kept.
    pub fn is_success(&self) -> bool {
        matches!(self, ExtensionStatus::Success)
    }
}

impl std::fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
