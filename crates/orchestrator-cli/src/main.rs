// SPDX-License-Identifier: Apache-2.0

//! Workflow orchestrator CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use orchestrator_core::{CancellationToken, ProcessEnvSource, WorkflowConfig, WorkflowStatus};
use std::fs;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(version, about = "Declarative REST API workflow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a workflow definition without running it
    Validate {
        /// Path to a YAML or JSON workflow file
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Run a workflow
    Run {
        /// Path to a YAML or JSON workflow file
        #[arg(value_name = "FILE")]
        file: String,
    },
}

/// Process exit codes: 0 success, 2 one or more steps failed,
/// 3 invalid configuration, 130 cancelled (SIGINT convention: 128 + SIGINT).
const EXIT_SUCCESS: i32 = 0;
const EXIT_STEP_FAILURE: i32 = 2;
const EXIT_INVALID_CONFIG: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("orchestrator={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let exit_code = match cli.command {
        Commands::Validate { file } => match validate_workflow(&file) {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                error!("{e}");
                eprintln!("{} {e}", "Error:".red().bold());
                EXIT_INVALID_CONFIG
            }
        },
        Commands::Run { file } => run_workflow(&file).await,
    };

    std::process::exit(exit_code);
}

fn load_config(file_path: &str) -> Result<WorkflowConfig> {
    let content = fs::read_to_string(file_path)
        .with_context(|| format!("failed to read workflow file: {file_path}"))?;

    let is_json = Path::new(file_path).extension().and_then(|e| e.to_str()) == Some("json");
    if is_json {
        serde_json::from_str(&content).with_context(|| format!("failed to parse workflow JSON: {file_path}"))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("failed to parse workflow YAML: {file_path}"))
    }
}

fn validate_workflow(file_path: &str) -> Result<()> {
    info!("validating workflow: {file_path}");
    println!("{} {file_path}", "Validating workflow:".cyan().bold());

    let config = load_config(file_path)?;
    config.validate().with_context(|| "workflow validation failed")?;

    println!("{}", "\u{2713} Workflow is valid".green().bold());
    println!("  Name: {}", config.name);
    println!("  Steps: {}", config.steps.len());
    Ok(())
}

async fn run_workflow(file_path: &str) -> i32 {
    info!("running workflow: {file_path}");
    println!("{} {file_path}", "Running workflow:".cyan().bold());

    let config = match load_config(file_path) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            eprintln!("{} {e}", "Error:".red().bold());
            return EXIT_INVALID_CONFIG;
        }
    };

    let env = ProcessEnvSource;
    let token = CancellationToken::new();
    let shutdown_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling workflow");
            shutdown_token.cancel();
        }
    });

    let report = match orchestrator_core::execute(&config, &env, &token).await {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            eprintln!("{} {e}", "Error:".red().bold());
            return EXIT_INVALID_CONFIG;
        }
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| format!("{report:?}"))
    );

    match report.status {
        WorkflowStatus::Success => {
            println!("{}", "\u{2713} Workflow completed successfully".green().bold());
            EXIT_SUCCESS
        }
        WorkflowStatus::Failed => {
            println!("{}", "\u{2717} Workflow completed with step failures".red().bold());
            EXIT_STEP_FAILURE
        }
        WorkflowStatus::Cancelled => {
            println!("{}", "Workflow cancelled".yellow().bold());
            EXIT_CANCELLED
        }
    }
}
