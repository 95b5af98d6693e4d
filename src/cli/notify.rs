//! One-shot delivery commands: `notify`, `replay` and `test`.
//!
//! Each command starts a worker pool, enqueues its tasks, waits until the
//! queue is idle and prints the recorded outcome.

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use crate::models::{DeliveryTask, EventSource, HookEventType, HookId, HookPayload, OwnerRef, TaskId};
use crate::{Error, Result, WebhookService};
use std::path::Path;

/// Reads an event payload from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not match the shape
/// of `event`.
pub fn load_payload(path: &Path, event: HookEventType) -> Result<HookPayload> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_payload_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| Error::InvalidInput(format!("{} is not valid JSON: {e}", path.display())))?;
    HookPayload::parse(event, value)
}

/// Fans out one event and waits for its deliveries.
///
/// The event source is the payload's repository. `owner` is used when the
/// payload has no repository.
///
/// # Errors
///
/// Returns an error if the payload cannot be loaded or the fan-out fails.
pub async fn cmd_notify(
    service: &WebhookService,
    event: HookEventType,
    path: &Path,
    owner: Option<i64>,
) -> Result<()> {
    let payload = load_payload(path, event)?;
    let source = match (payload.repository(), owner) {
        (Some(repository), _) => EventSource::repository(repository.clone()),
        (None, Some(id)) => EventSource::owner(OwnerRef {
            id,
            login: String::new(),
        }),
        (None, None) => EventSource::default(),
    };

    let pool = service.start();
    let result = service.notify(&source, event, &payload).await;
    pool.drain().await;
    pool.shutdown().await;
    let report = result?;

    println!(
        "{event}: {} task(s) created, {} skipped, {} rejected",
        report.created.len(),
        report.skipped,
        report.failed
    );
    for task_id in report.created {
        print_outcome(&service.task(task_id)?);
    }
    Ok(())
}

/// Replays a task and waits for the new delivery.
///
/// # Errors
///
/// Returns an error if the task does not exist for the registration.
pub async fn cmd_replay(service: &WebhookService, hook_id: HookId, task_id: TaskId) -> Result<()> {
    let pool = service.start();
    let result = service.replay(hook_id, task_id).await;
    pool.drain().await;
    pool.shutdown().await;

    let replay_id = result?;
    println!("Replayed task {task_id} as task {replay_id}");
    print_outcome(&service.task(replay_id)?);
    Ok(())
}

/// Sends a sample push to a registration and waits for the delivery.
///
/// # Errors
///
/// Returns an error if the registration does not exist or its payload
/// cannot be shaped.
pub async fn cmd_test(service: &WebhookService, hook_id: HookId) -> Result<()> {
    println!("Testing webhook {hook_id}...");
    let pool = service.start();
    let result = service.send_test(hook_id).await;
    pool.drain().await;
    pool.shutdown().await;

    let task = service.task(result?)?;
    if task.succeeded {
        println!("✓ Webhook test successful!");
    } else {
        println!("✗ Webhook test failed!");
    }
    print_outcome(&task);
    Ok(())
}

fn print_outcome(task: &DeliveryTask) {
    let status = task
        .status_code
        .map_or_else(|| "-".to_string(), |code| code.to_string());
    println!(
        "  task {} -> hook {}: {} (status {status}, {}ms)",
        task.id,
        task.hook_id,
        if task.succeeded { "ok" } else { "failed" },
        task.duration_ms.unwrap_or(0)
    );
    if !task.succeeded {
        if let Some(snippet) = task.response_snippet.as_deref().filter(|s| !s.is_empty()) {
            println!("    {snippet}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_push_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "ref": "refs/heads/main",
                "before": "a",
                "after": "b",
                "compare_url": "",
                "commits": [],
                "total_commits": 0,
                "repository": {{"id": 1, "owner_id": 2, "name": "w", "full_name": "acme/w", "html_url": ""}},
                "pusher": {{"id": 3, "login": "alice"}}
            }}"#
        )
        .unwrap();

        let payload = load_payload(file.path(), HookEventType::Push).unwrap();
        assert_eq!(payload.branch(), Some("main"));
        assert_eq!(payload.repository().map(|r| r.id), Some(1));
    }

    #[test]
    fn test_load_payload_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            load_payload(file.path(), HookEventType::Push),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_payload_missing_file() {
        let result = load_payload(Path::new("/nonexistent/push.json"), HookEventType::Push);
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }
}
