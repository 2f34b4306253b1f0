//! IrisAtlas CLI - reproducible iris structure analysis runs
//!
//! This binary runs the analysis pipeline, verifies manifests, and inspects
//! run-state files.

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use irisatlas_cli::commands;
use irisatlas_cli::logging;

/// IrisAtlas - Reproducible iris structure analysis
#[derive(Parser)]
#[command(name = "irisatlas")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis pipeline on one image
    Run {
        /// Path to the input image
        #[arg(short, long)]
        input: String,

        /// Path to the precomputed label mask (PNG, one label per pixel)
        #[arg(short, long)]
        mask: String,

        /// Path to the run configuration (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Output directory (overrides `output_dir` in the config)
        #[arg(short, long)]
        output: Option<String>,

        /// Requested device
        #[arg(long, default_value = "auto", value_parser = ["auto", "cpu", "cuda"])]
        device: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Verify the integrity hash of a manifest
    Verify {
        /// Path to manifest.json
        #[arg(short, long)]
        manifest: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Show the lifecycle state of a run
    Status {
        /// Path to the run-state file (session_state.json)
        #[arg(short, long)]
        state: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            input,
            mask,
            config,
            output,
            device,
            json,
        } => commands::run::run(commands::run::RunArgs {
            input: &input,
            mask: &mask,
            config: config.as_deref(),
            output: output.as_deref(),
            device: &device,
            json,
        }),
        Commands::Verify { manifest, json } => commands::verify::run(&manifest, json),
        Commands::Status { state, json } => commands::status::run(&state, json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
