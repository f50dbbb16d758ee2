//! CIFAR-10 CNN CLI
//!
//! Runs one training or validation pass as described by a TOML config file.
//! Every setting has a default, so the config file is optional.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use cifar10_cnn::backend::{select_backend, SelectedBackend};
use cifar10_cnn::utils::logging::{init_logging, LogConfig, LogLevel};
use cifar10_cnn::{run, RunConfig, RunOutcome};

/// Train and evaluate a convolutional classifier on CIFAR-10
#[derive(Parser, Debug)]
#[command(name = "cifar10-cnn")]
#[command(version)]
#[command(about = "CIFAR-10 convolutional classifier with Burn", long_about = None)]
struct Cli {
    /// Path to a TOML run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` still wins
    #[arg(long)]
    log_level: Option<LogLevel>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    init_logging(&log_config)?;

    let config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Could not load {}", path.display()))?,
        None => RunConfig::default(),
    };

    let backend = select_backend(config.device);
    info!("Using backend: {}", backend);
    println!("{} {}", "Backend:".green().bold(), backend);

    let outcome = match backend {
        SelectedBackend::Cpu => {
            use cifar10_cnn::backend::CpuTrainingBackend;
            run::<CpuTrainingBackend>(&config, Default::default())?
        }
        #[cfg(feature = "cuda")]
        SelectedBackend::Gpu => {
            use cifar10_cnn::backend::GpuTrainingBackend;
            run::<GpuTrainingBackend>(&config, Default::default())?
        }
    };

    match outcome {
        RunOutcome::Validated(_) => info!("Validation finished"),
        RunOutcome::Trained { epochs, .. } => info!("Training finished after {} epochs", epochs.len()),
    }

    Ok(())
}
