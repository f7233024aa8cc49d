//! Agent Relay command line
//!
//! - `run`: execute one pipeline over the given input files
//! - `check-config`: load and validate configuration, then print it

use agent_relay_cli::{logging, run_pipeline};
use agent_relay_coordinator::CoordinatorConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "agent-relay")]
#[command(about = "Coordinate agents through a test automation pipeline")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once and print the summary as JSON
    Run {
        /// Name recorded on the run
        #[arg(long, default_value = "agent-relay")]
        name: String,

        /// Input scenario files
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Validate configuration and print the effective values
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = CoordinatorConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;

    logging::init(&config.logging)?;
    info!("Configuration loaded successfully");

    match cli.command {
        Command::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { name, files } => {
            let summary = run_pipeline(config, &name, files).await.map_err(|e| {
                error!("Pipeline could not run: {:#}", e);
                e
            })?;
            println!("{}", serde_json::to_string_pretty(&summary)?);

            if summary.success {
                info!(run_id = %summary.run_id, "Pipeline finished");
                Ok(ExitCode::SUCCESS)
            } else {
                error!(
                    run_id = %summary.run_id,
                    error = summary.error.as_deref().unwrap_or_default(),
                    "Pipeline finished unsuccessfully"
                );
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
