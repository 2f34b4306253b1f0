//! Run command implementation
//!
//! Runs the full analysis pipeline on one input image, using a precomputed
//! label mask as the segmentation step.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use irisatlas_engine::{Runtime, RuntimeOutput};
use irisatlas_spec::{ExtensionStatus, RunConfig};
use serde::Serialize;

use crate::mask_segmenter::MaskFileSegmenter;

/// JSON output for the run command.
#[derive(Debug, Serialize)]
pub struct RunOutput<'a> {
    pub success: bool,
    pub results_path: String,
    pub manifest_path: String,
    pub manifest_sha256: &'a str,
    pub telemetry: &'a [irisatlas_spec::TelemetryRecord],
    pub warnings: &'a [String],
}

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunArgs<'a> {
    pub input: &'a str,
    pub mask: &'a str,
    pub config: Option<&'a str>,
    pub output: Option<&'a str>,
    pub device: &'a str,
    pub json: bool,
}

/// Loads the run configuration, applying the `--output` override.
pub fn load_config(config_path: Option<&str>, output: Option<&str>) -> Result<RunConfig> {
    let mut config = match config_path {
        Some(path) => RunConfig::from_path(Path::new(path))
            .with_context(|| format!("Failed to load config: {}", path))?,
        None => RunConfig::new(),
    };
    if let Some(output) = output {
        config.set("output_dir", output.into());
    }
    Ok(config)
}

/// Run the analysis pipeline.
///
/// # Returns
/// Exit code: 0 when the run completed. Stage failures do not change it.
pub fn run(args: RunArgs<'_>) -> Result<ExitCode> {
    let config = load_config(args.config, args.output)?;

    let runtime = Runtime::new(MaskFileSegmenter::new(args.mask)).with_progress(|event, payload| {
        tracing::debug!(event, payload = %payload, "progress");
    });
    let output = runtime
        .run(Path::new(args.input), args.device, &config)
        .with_context(|| format!("Analysis failed for {}", args.input))?;

    if args.json {
        super::print_json(&RunOutput {
            success: true,
            results_path: output.results_path.display().to_string(),
            manifest_path: output.manifest_path.display().to_string(),
            manifest_sha256: &output.manifest.manifest_sha256,
            telemetry: &output.extension_telemetry,
            warnings: &output.analysis_result.warnings,
        })?;
    } else {
        print_human(&output);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_human(output: &RuntimeOutput) {
    let result = &output.analysis_result;
    println!("{} {}", "Input:".cyan().bold(), result.input_filename);
    println!("{} {}", "Device:".cyan().bold(), result.device);
    println!("{} {}", "Model:".cyan().bold(), result.model_version);

    let m = &result.metrics;
    println!(
        "\n{} pupil/iris {:.4}  collarette/iris {:.4}  furrow/iris {:.4}  scurf/iris {:.4}",
        "Metrics:".bold(),
        m.pupil_to_iris,
        m.collarette_to_iris,
        m.furrow_to_iris,
        m.scurf_to_iris
    );

    println!("\n{}", "Stages:".bold());
    for record in &output.extension_telemetry {
        let status = match record.status {
            ExtensionStatus::Success => record.status.as_str().green(),
            ExtensionStatus::Skipped => record.status.as_str().yellow(),
            ExtensionStatus::Timeout | ExtensionStatus::Failed => record.status.as_str().red(),
        };
        println!(
            "  {:<16} v{:<4} {:<8} {:>6} ms",
            record.name, record.version, status, record.duration_ms
        );
    }

    if !result.warnings.is_empty() {
        println!("\n{}", "Warnings:".yellow().bold());
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }

    println!("\n{} {}", "Results:".dimmed(), output.results_path.display());
    println!("{} {}", "Manifest:".dimmed(), output.manifest_path.display());
    println!(
        "{} {}",
        "manifest_sha256:".dimmed(),
        output.manifest.manifest_sha256
    );
    println!("\n{}", "COMPLETED".green().bold());
}
