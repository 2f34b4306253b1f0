//! Status command implementation
//!
//! Reads a run-state file and reports the lifecycle state of the run. A
//! record still marked `running` means the writing process died.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use irisatlas_spec::{RunState, RunStateRecord, RunStateStore};
use serde::Serialize;

/// JSON output for the status command.
#[derive(Debug, Serialize)]
pub struct StatusOutput<'a> {
    #[serde(flatten)]
    pub record: &'a RunStateRecord,
    pub unclean: bool,
}

/// Run the status command.
///
/// # Returns
/// Exit code: 0 for `completed`, 2 for an unclean termination, 1 otherwise
pub fn run(state_path: &str, json_output: bool) -> Result<ExitCode> {
    let store = RunStateStore::new(state_path);
    let Some(record) = store
        .read()
        .with_context(|| format!("Failed to read run state: {}", state_path))?
    else {
        bail!("No run state found at {}", state_path);
    };

    if json_output {
        super::print_json(&StatusOutput {
            record: &record,
            unclean: record.is_unclean(),
        })?;
    } else {
        print_human(store.path(), &record);
    }

    Ok(exit_code_for(&record))
}

fn print_human(path: &Path, record: &RunStateRecord) {
    let state = match record.run_state {
        RunState::Completed => record.run_state.as_str().green().bold(),
        RunState::Failed | RunState::Cancelled => record.run_state.as_str().red().bold(),
        RunState::Queued | RunState::Running => record.run_state.as_str().yellow().bold(),
    };
    println!("{} {}", "State file:".cyan().bold(), path.display());
    println!("{} {}", "Run state:".cyan().bold(), state);
    println!("{} {}", "Updated:".dimmed(), record.timestamp);
    println!("{} {}", "Input:".dimmed(), record.input_path);
    println!("{} {}", "Output:".dimmed(), record.output_dir);
    if let Some(error) = &record.error {
        println!("{} {}", "Error:".red(), error);
    }
    if record.is_unclean() {
        println!(
            "\n{} run never reached a terminal state; the process terminated uncleanly",
            "WARNING".yellow().bold()
        );
    }
}

fn exit_code_for(record: &RunStateRecord) -> ExitCode {
    match record.run_state {
        RunState::Completed => ExitCode::SUCCESS,
        _ if record.is_unclean() => ExitCode::from(2),
        _ => ExitCode::from(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_output_flattens_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStateStore::new(dir.path().join("session_state.json"));
        let record = store
            .write(
                RunState::Running,
                Path::new("/in/eye.png"),
                Path::new("/out"),
                &json!({}),
                None,
            )
            .unwrap();

        let value = serde_json::to_value(StatusOutput {
            record: &record,
            unclean: record.is_unclean(),
        })
        .unwrap();
        assert_eq!(value["run_state"], "running");
        assert_eq!(value["unclean"], true);
        assert!(value["error"].is_null());
    }

    #[test]
    fn test_missing_state_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(run(path.to_str().unwrap(), true).is_err());
    }
}
