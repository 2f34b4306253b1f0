//! Build script for irisatlas-engine.
//!
//! Captures the compiler version, the target triple, and the resolved
//! versions of the crates the engine depends on, and generates Rust code
//! with them so manifests can record the build environment.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// Crates whose resolved versions end up in the environment snapshot.
const TRACKED_CRATES: &[&str] = &[
    "chrono",
    "image",
    "rand",
    "rand_pcg",
    "regex",
    "serde",
    "serde_json",
    "sha2",
    "tempfile",
    "thiserror",
    "tracing",
];

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    let lock_path = PathBuf::from(&manifest_dir)
        .join("..")
        .join("..")
        .join("Cargo.lock");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}", lock_path.display());
    println!("cargo:rerun-if-env-changed=RUSTC");

    let rustc_version = detect_rustc_version();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    let lock = fs::read_to_string(&lock_path).unwrap_or_default();
    let versions = resolved_versions(&lock, TRACKED_CRATES);

    let rust_code = generate_rust_code(&rustc_version, &target, &profile, &versions);

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let out_path = PathBuf::from(&out_dir).join("build_info.rs");
    fs::write(&out_path, rust_code)
        .unwrap_or_else(|e| panic!("Failed to write build_info.rs to {:?}: {}", out_path, e));
}

/// Runs `$RUSTC --version`, e.g. "rustc 1.80.0 (051478957 2024-07-21)".
fn detect_rustc_version() -> String {
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    Command::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Pulls `name`/`version` pairs out of the `[[package]]` tables of a lock
/// file. A crate locked at several versions reports the first one listed;
/// a crate missing from the lock file reports "unknown".
fn resolved_versions(lock: &str, crates: &[&str]) -> Vec<(String, String)> {
    let mut found: Vec<(String, String)> = Vec::new();
    let mut name: Option<String> = None;

    for line in lock.lines() {
        let line = line.trim();
        if line == "[[package]]" {
            name = None;
        } else if let Some(value) = quoted_value(line, "name") {
            name = Some(value);
        } else if let Some(version) = quoted_value(line, "version") {
            if let Some(current) = name.take() {
                let tracked = crates.contains(&current.as_str());
                if tracked && !found.iter().any(|(n, _)| *n == current) {
                    found.push((current, version));
                }
            }
        }
    }

    crates
        .iter()
        .map(|krate| {
            let version = found
                .iter()
                .find(|(n, _)| n == krate)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| "unknown".to_string());
            (krate.to_string(), version)
        })
        .collect()
}

/// Parses `key = "value"`.
fn quoted_value(line: &str, key: &str) -> Option<String> {
    let rest = line.strip_prefix(key)?.trim_start().strip_prefix('=')?.trim();
    Some(rest.trim_matches('"').to_string())
}

fn generate_rust_code(rustc: &str, target: &str, profile: &str, versions: &[(String, String)]) -> String {
    let mut code = String::new();

    code.push_str("// Auto-generated by build.rs\n");
    code.push_str("// Do not edit manually!\n\n");

    code.push_str(&format!("pub const RUSTC_VERSION: &str = {:?};\n", rustc));
    code.push_str(&format!("pub const TARGET_TRIPLE: &str = {:?};\n", target));
    code.push_str(&format!("pub const PROFILE: &str = {:?};\n\n", profile));

    code.push_str("pub static DEPENDENCY_VERSIONS: &[(&str, &str)] = &[\n");
    for (name, version) in versions {
        code.push_str(&format!("    ({:?}, {:?}),\n", name, version));
    }
    code.push_str("];\n");

    code
}
