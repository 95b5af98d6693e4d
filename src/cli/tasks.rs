//! Task history commands: `tasks` and `prune`.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use crate::models::{DeliveryTask, HookId};
use crate::{Error, Result, WebhookService, current_timestamp};
use std::fmt::Write as _;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 86_400;

/// Output format for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Pretty-printed JSON array.
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!(
                "Unknown output format '{other}', expected 'table' or 'json'"
            ))),
        }
    }
}

/// Shows a registration's recent tasks, newest first.
///
/// # Errors
///
/// Returns an error if the task store cannot be read.
pub fn cmd_tasks(
    service: &WebhookService,
    hook_id: HookId,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let tasks = service.tasks(hook_id, limit)?;

    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&tasks).map_err(|e| Error::OperationFailed {
                    operation: "serialize_tasks".to_string(),
                    cause: e.to_string(),
                })?;
            println!("{json}");
        },
        OutputFormat::Table if tasks.is_empty() => {
            println!("No delivery history found for webhook {hook_id}.");
        },
        OutputFormat::Table => print!("{}", render_table(&tasks)),
    }
    Ok(())
}

/// Renders tasks as a fixed-width table.
#[must_use]
pub fn render_table(tasks: &[DeliveryTask]) -> String {
    let rule = "-".repeat(80);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "{:<8} {:<22} {:<10} {:<8} {:<10} {:<10}",
        "TASK", "EVENT", "STATE", "STATUS", "DURATION", "REPLAY OF"
    );
    let _ = writeln!(out, "{rule}");

    for task in tasks {
        let state = match (task.delivered, task.succeeded) {
            (false, _) => "pending",
            (true, true) => "ok",
            (true, false) => "failed",
        };
        let status = task
            .status_code
            .map_or_else(|| "-".to_string(), |code| code.to_string());
        let duration = task
            .duration_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
        let replay_of = task
            .replay_of
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let _ = writeln!(
            out,
            "{:<8} {:<22} {:<10} {:<8} {:<10} {:<10}",
            task.id,
            task.event_type.as_str(),
            state,
            status,
            duration,
            replay_of
        );
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Total: {} task(s)", tasks.len());
    out
}

/// Deletes delivered tasks older than `older_than_days`.
///
/// # Errors
///
/// Returns an error if the task store cannot be written.
pub fn cmd_prune(service: &WebhookService, older_than_days: u32) -> Result<()> {
    let before = current_timestamp() - i64::from(older_than_days) * SECONDS_PER_DAY;
    let pruned = service.prune(before)?;
    println!("Pruned {pruned} delivered task(s) older than {older_than_days} day(s).");
    Ok(())
}
