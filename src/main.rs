//! Binary entry point for hookrelay.
//!
//! This binary provides the CLI interface for the hookrelay webhook
//! delivery service.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use hookrelay::cli::{self, OutputFormat};
use hookrelay::config::HookrelayConfig;
use hookrelay::observability;
use hookrelay::{HookEventType, HookId, TaskId, WebhookService};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Hookrelay - outbound webhook delivery.
#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "HOOKRELAY_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Recover pending tasks and deliver webhooks until interrupted.
    Serve,

    /// Fan out one event from a JSON payload file.
    Notify {
        /// Event type (push, create, issues, pull_request, release, ...).
        #[arg(short, long)]
        event: HookEventType,

        /// Owner ID used when the payload has no repository.
        #[arg(long)]
        owner: Option<i64>,

        /// Payload file.
        payload: PathBuf,
    },

    /// Re-deliver a previous task.
    Replay {
        /// Registration ID.
        hook_id: i64,

        /// Task to replay.
        task_id: i64,
    },

    /// Send a sample push to a registration.
    Test {
        /// Registration ID.
        hook_id: i64,
    },

    /// Show delivery history for a registration.
    Tasks {
        /// Registration ID.
        hook_id: i64,

        /// Maximum number of tasks.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format: table or json.
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete delivered tasks older than a number of days.
    Prune {
        /// Age threshold in days.
        #[arg(long, default_value = "30")]
        older_than_days: u32,
    },
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, rejected) = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = config.logging.clone().with_verbose(cli.verbose);
    if let Err(e) = observability::init_logging(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }
    if let Some((path, e)) = rejected {
        tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
    }

    match run_command(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
async fn run_command(command: Commands, config: &HookrelayConfig) -> anyhow::Result<()> {
    let service = WebhookService::open(config).context("failed to open webhook service")?;

    match command {
        Commands::Serve => cli::cmd_serve(&service).await?,
        Commands::Notify {
            event,
            owner,
            payload,
        } => cli::cmd_notify(&service, event, &payload, owner).await?,
        Commands::Replay { hook_id, task_id } => {
            cli::cmd_replay(&service, HookId::new(hook_id), TaskId::new(task_id)).await?;
        },
        Commands::Test { hook_id } => cli::cmd_test(&service, HookId::new(hook_id)).await?,
        Commands::Tasks {
            hook_id,
            limit,
            format,
        } => cli::cmd_tasks(&service, HookId::new(hook_id), limit, format)?,
        Commands::Prune { older_than_days } => cli::cmd_prune(&service, older_than_days)?,
    }
    Ok(())
}

/// A default config file that failed to load, reported once logging is up.
type RejectedConfig = Option<(PathBuf, hookrelay::Error)>;

/// Loads configuration from `path`, or the default location.
fn load_config(path: Option<&Path>) -> anyhow::Result<(HookrelayConfig, RejectedConfig)> {
    let Some(path) = path else {
        return Ok(HookrelayConfig::load_default_checked());
    };
    let _ = dotenvy::dotenv();
    let config = HookrelayConfig::load_from_file(path)
        .with_context(|| format!("cannot load {}", path.display()))?;
    Ok((config, None))
}
