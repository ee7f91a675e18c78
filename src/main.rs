//! healthgate: wait for dependencies before starting a service.
//!
//! ```text
//! healthgate wait --config deps.toml && exec ./my-service
//! ```
//!
//! Exit codes: 0 all healthy, 1 deadline elapsed, 2 bad configuration,
//! 130 interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde_json::json;

use healthgate::config::{load_config, GateConfig};
use healthgate::lifecycle::{build_manager, shutdown_signal};
use healthgate::observability::{logging, metrics};
use healthgate::HealthError;

#[derive(Parser)]
#[command(name = "healthgate")]
#[command(about = "Block until service dependencies are reachable", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run probes until all pass or the deadline elapses
    Wait {
        #[arg(short, long, default_value = "healthgate.toml")]
        config: PathBuf,

        /// Print a JSON report on stdout
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file and exit
    Check {
        #[arg(short, long, default_value = "healthgate.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => match load_config(&config) {
            Ok(cfg) => {
                println!("{}: ok ({} probes)", config.display(), cfg.probes.len());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", config.display(), e);
                ExitCode::from(2)
            }
        },
        Commands::Wait { config, json } => {
            let cfg = match load_config(&config) {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("{}: {}", config.display(), e);
                    return ExitCode::from(2);
                }
            };
            match wait(cfg, json).await {
                Ok(code) => code,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::from(2)
                }
            }
        }
    }
}

async fn wait(config: GateConfig, json: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    logging::init(&config.observability);
    tracing::info!("healthgate v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &config.observability.metrics_address {
        metrics::init_metrics(addr.parse()?)?;
    }

    let manager = build_manager(&config).await?;
    let started = Instant::now();

    let outcome = tokio::select! {
        result = manager.run() => Some(result),
        _ = shutdown_signal() => None,
    };
    manager.cleanup().await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let code = match outcome {
        Some(Ok(())) => {
            if json {
                println!("{}", json!({ "healthy": true, "elapsed_ms": elapsed_ms }));
            }
            ExitCode::SUCCESS
        }
        Some(Err(HealthError::Timeout(timeout))) => {
            if json {
                let report = json!({ "healthy": false, "timeout": timeout.report() });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                eprintln!("{}", timeout);
            }
            ExitCode::from(1)
        }
        Some(Err(e)) => return Err(e.into()),
        None => {
            tracing::warn!(elapsed_ms, "Interrupted before dependencies became healthy");
            ExitCode::from(130)
        }
    };

    tracing::info!("Shutdown complete");
    Ok(code)
}
