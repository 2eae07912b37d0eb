//! Binary entry point for plantdoc.
//!
//! This binary runs the terrarium monitoring service: the scheduled
//! capture-analyze-fuse pipeline plus the HTTP read API, and a few
//! one-shot maintenance commands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print output in the main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use plantdoc::config::PlantdocConfig;
use plantdoc::observability::{self, InitOptions};
use plantdoc::pipeline;
use plantdoc::server::{self, AppState};
use std::process::ExitCode;
use std::sync::Arc;

/// Plantdoc - terrarium health monitor for carnivorous plants.
#[derive(Parser)]
#[command(name = "plantdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP read API (the default).
    Serve {
        /// Socket address to bind, overriding the config.
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run one capture-analyze-fuse cycle and print the outcome.
    Check,

    /// Test the telemetry queries and print the window summary.
    Telemetry,

    /// Show the effective configuration.
    Config,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    observability::init_logging(InitOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
    });

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run_command(cli.command.unwrap_or(Commands::Serve { bind: None }), config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads configuration from `--config`, `PLANTDOC_CONFIG_PATH`, or the
/// default locations.
fn load_config(path: Option<&str>) -> Result<PlantdocConfig, Box<dyn std::error::Error>> {
    if let Some(config_path) = path {
        return PlantdocConfig::load_from_file(std::path::Path::new(config_path))
            .map_err(std::convert::Into::into);
    }

    if let Ok(config_path) = std::env::var("PLANTDOC_CONFIG_PATH") {
        if !config_path.trim().is_empty() {
            return PlantdocConfig::load_from_file(std::path::Path::new(&config_path))
                .map_err(std::convert::Into::into);
        }
    }

    Ok(PlantdocConfig::load_default())
}

/// Runs the selected command.
async fn run_command(
    command: Commands,
    config: PlantdocConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve { bind } => cmd_serve(config, bind).await,
        Commands::Check => cmd_check(&config).await,
        Commands::Telemetry => cmd_telemetry(&config).await,
        Commands::Config => cmd_config(&config),
    }
}

/// Serve command: startup capture if needed, scheduler, HTTP API.
async fn cmd_serve(
    config: PlantdocConfig,
    bind: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = pipeline::build(&config)?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    // First boot with no frame on disk: run an initial cycle in the
    // background so the API comes up immediately.
    if !orchestrator.store().current_frame_path().exists() {
        let initial = Arc::clone(&orchestrator);
        tokio::task::spawn_blocking(move || {
            if let Err(failure) = initial.run_cycle() {
                tracing::warn!(stage = failure.stage.as_str(), reason = %failure.reason,
                    "initial startup cycle failed");
            }
        });
    }

    tokio::spawn(plantdoc::scheduler::run(
        Arc::clone(&orchestrator),
        config.schedule.hours.clone(),
    ));

    server::serve(AppState::new(orchestrator), &bind)
        .await
        .map_err(std::convert::Into::into)
}

/// Check command: one cycle, printed outcome.
async fn cmd_check(config: &PlantdocConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = pipeline::build(config)?;

    let outcome = tokio::task::spawn_blocking(move || orchestrator.run_cycle()).await?;
    match outcome {
        Ok(outcome) => {
            println!("Cycle completed:");
            println!("  Plants diagnosed: {}", outcome.plants);
            println!("  Tank verdict fused: {}", outcome.fused);
            println!("  Duration: {}ms", outcome.duration_ms);
            Ok(())
        }
        Err(failure) => Err(failure.into()),
    }
}

/// Telemetry command: fetch the window and print it.
async fn cmd_telemetry(config: &PlantdocConfig) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = pipeline::build(config)?;

    let summary = tokio::task::spawn_blocking(move || orchestrator.fetch_telemetry()).await?;
    match summary {
        Some(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        None => Err("telemetry window absent (a query failed or returned no data)".into()),
    }
}

/// Config command: print the effective configuration.
fn cmd_config(config: &PlantdocConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Plantdoc Configuration");
    println!("======================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Data Directory: {}", config.data_dir.display());
    println!();
    println!("Camera:");
    println!("  Endpoint: {}", config.camera.endpoint);
    println!(
        "  Resolution: {}x{}",
        config.camera.settings.width, config.camera.settings.height
    );
    println!("  Exposure: {}", config.camera.settings.exposure);
    println!();
    println!("Capture:");
    println!("  Warm-up frames: {}", config.capture.warmup_frames);
    println!("  Burst size: {}", config.capture.burst_size);
    println!("  Enhancement: {}", config.capture.enhance);
    println!("  Retention limit: {}", config.capture.retention_limit);
    println!();
    println!("Inference:");
    println!("  Model: {}", config.inference.model);
    println!(
        "  Base URL: {}",
        config.inference.base_url.as_deref().unwrap_or("(default)")
    );
    println!();
    println!("Telemetry:");
    println!("  Base URL: {}", config.telemetry.base_url);
    println!("  Look-back: {}h", config.telemetry.lookback_hours);
    println!();
    println!("Schedule hours: {:?}", config.schedule.hours);
    println!("Bind: {}", config.server.bind);

    Ok(())
}
