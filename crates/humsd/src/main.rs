//! humsd - HUMS vehicle monitor daemon
//!
//! Usage:
//!   humsd [--config hums.toml] [-v] run [--no-can] [--no-imu]
//!   humsd [--config hums.toml] [-v] process
//!
//! `run` keeps the CAN and IMU/GPS acquisition services running until
//! Ctrl-C (or SIGTERM). `process` decodes every pending capture log once.
//! Without `--config`, defaults under `~/hums_data` are used.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hums_can::{create_driver, AcquisitionConfig, BusAcquisitionService};
use hums_core::HumsConfig;
use hums_decode::{LogProcessor, PipelineConfig};
use hums_imu::{ImuAcquisitionService, ImuConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str =
    "humsd=info,hums_can=info,hums_decode=info,hums_imu=info,hums_core=info";

#[derive(Parser)]
#[command(name = "humsd")]
#[command(author, version, about = "HUMS vehicle monitor daemon")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HUMS_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition services until interrupted
    Run {
        /// Do not start CAN bus acquisition
        #[arg(long)]
        no_can: bool,

        /// Do not start IMU/GPS acquisition
        #[arg(long)]
        no_imu: bool,
    },

    /// Decode every pending capture log and exit
    Process,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let fallback = if cli.verbose { "debug" } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(fmt::layer())
        .init();

    let config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            HumsConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => {
            tracing::info!("No config file provided, using defaults");
            HumsConfig::default()
        }
    };
    config
        .paths
        .ensure_directories()
        .context("Failed to create data directories")?;

    match cli.command {
        Commands::Run { no_can, no_imu } => run(&config, !no_can, !no_imu).await,
        Commands::Process => process(&config),
    }
}

/// Start the selected services, wait for a shutdown signal, then stop them
async fn run(config: &HumsConfig, with_can: bool, with_imu: bool) -> Result<()> {
    tracing::info!("Starting humsd");

    let can = if with_can {
        match create_driver(&config.can) {
            Ok(driver) => {
                let service =
                    BusAcquisitionService::new(AcquisitionConfig::from_settings(config), driver);
                service.start().await;
                Some(service)
            }
            Err(e) => {
                tracing::error!(error = %e, "CAN acquisition unavailable");
                None
            }
        }
    } else {
        None
    };

    let imu = with_imu.then(|| {
        let service = ImuAcquisitionService::new(ImuConfig::from_settings(config));
        service.start();
        service
    });

    if can.is_none() && imu.is_none() {
        anyhow::bail!("No acquisition service started");
    }

    shutdown_signal().await?;
    tracing::info!("Shutdown requested");

    if let Some(service) = &can {
        service.stop().await;
    }
    if let Some(service) = &imu {
        service.stop().await;
    }

    tracing::info!("humsd stopped");
    Ok(())
}

fn process(config: &HumsConfig) -> Result<()> {
    let processor = LogProcessor::new(PipelineConfig::from_settings(config));
    let summary = processor
        .process_pending_logs()
        .context("Capture log processing aborted")?;

    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Done"
    );
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::try_parse_from(["humsd", "-c", "hums.toml", "run", "--no-imu"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("hums.toml")));
        assert!(matches!(
            cli.command,
            Commands::Run {
                no_can: false,
                no_imu: true
            }
        ));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["humsd"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["humsd", "process"]).unwrap().command,
            Commands::Process
        ));
    }
}
