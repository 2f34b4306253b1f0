//! Verify command implementation
//!
//! Recomputes `manifest_sha256` over a stored manifest and compares it with
//! the recorded value.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use irisatlas_spec::hash::manifest_hash;
use irisatlas_spec::MANIFEST_HASH_FIELD;
use serde::Serialize;
use serde_json::Value;

/// JSON output for the verify command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOutput {
    pub success: bool,
    pub manifest: String,
    pub stored: Option<String>,
    pub computed: String,
}

/// Checks the integrity hash of the manifest at `manifest_path`.
pub fn check(manifest_path: &Path) -> Result<VerifyOutput> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse manifest: {}", manifest_path.display()))?;

    let stored = value
        .get(MANIFEST_HASH_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);
    let computed = manifest_hash(&value);
    Ok(VerifyOutput {
        success: stored.as_deref() == Some(computed.as_str()),
        manifest: manifest_path.display().to_string(),
        stored,
        computed,
    })
}

/// Run the verify command.
///
/// # Returns
/// Exit code: 0 if the hash matches, 1 otherwise
pub fn run(manifest_path: &str, json_output: bool) -> Result<ExitCode> {
    let output = check(Path::new(manifest_path))?;

    if json_output {
        super::print_json(&output)?;
    } else {
        println!("{} {}", "Manifest:".cyan().bold(), output.manifest);
        println!(
            "{} {}",
            "Stored:".dimmed(),
            output.stored.as_deref().unwrap_or("<missing>")
        );
        println!("{} {}", "Computed:".dimmed(), output.computed);
        if output.success {
            println!("\n{} manifest hash matches", "PASSED".green().bold());
        } else {
            println!("\n{} manifest hash mismatch", "FAILED".red().bold());
        }
    }

    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use irisatlas_spec::write_json_atomic;
    use serde_json::json;

    #[test]
    fn test_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = json!({"device": "cpu", "extensions": []});
        manifest[MANIFEST_HASH_FIELD] = json!(manifest_hash(&manifest));
        write_json_atomic(&path, &manifest).unwrap();

        assert!(check(&path).unwrap().success);

        manifest["device"] = json!("cuda");
        write_json_atomic(&path, &manifest).unwrap();
        let output = check(&path).unwrap();
        assert!(!output.success);
        assert_ne!(output.stored.as_deref(), Some(output.computed.as_str()));
    }

    #[test]
    fn test_missing_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{}").unwrap();
        let output = check(&path).unwrap();
        assert!(!output.success);
        assert!(output.stored.is_none());
    }
}
