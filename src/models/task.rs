//! Delivery tasks and outcomes.

use super::{HookEventType, HookId};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Unique, store-assigned identifier for a delivery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    /// Creates a new task ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Result of one HTTP delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// `true` for a 2xx response.
    pub succeeded: bool,
    /// Response status, `None` if no response arrived.
    pub status_code: Option<u16>,
    /// Wall time of the attempt.
    pub duration_ms: u64,
    /// Truncated response body, or the error text.
    pub response_snippet: String,
}

impl DeliveryOutcome {
    /// Outcome for a received response.
    #[must_use]
    pub fn from_response(status_code: u16, duration_ms: u64, snippet: String) -> Self {
        Self {
            succeeded: (200..300).contains(&status_code),
            status_code: Some(status_code),
            duration_ms,
            response_snippet: snippet,
        }
    }

    /// Outcome for an attempt that produced no response.
    #[must_use]
    pub fn failure(duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            status_code: None,
            duration_ms,
            response_snippet: error.into(),
        }
    }
}

/// Fields needed to create a task; the store assigns the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Registration the task delivers to.
    pub hook_id: HookId,
    /// Event type.
    pub event_type: HookEventType,
    /// Shaped payload bytes.
    pub payload: Vec<u8>,
    /// Task this one replays, if any.
    pub replay_of: Option<TaskId>,
}

impl NewTask {
    /// Creates a task for a fresh event.
    #[must_use]
    pub const fn new(hook_id: HookId, event_type: HookEventType, payload: Vec<u8>) -> Self {
        Self {
            hook_id,
            event_type,
            payload,
            replay_of: None,
        }
    }
}

/// One attempt to deliver one event to one registration.
///
/// Payload bytes never change after creation. Once `delivered` is set the
/// outcome fields are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryTask {
    /// Task ID.
    pub id: TaskId,
    /// Registration ID.
    pub hook_id: HookId,
    /// Event type.
    pub event_type: HookEventType,
    /// Shaped payload bytes.
    #[serde(serialize_with = "serialize_lossy")]
    pub payload: Vec<u8>,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Whether an attempt has been recorded.
    pub delivered: bool,
    /// Whether the attempt succeeded.
    pub succeeded: bool,
    /// Completion time, Unix seconds.
    pub delivered_at: Option<i64>,
    /// Response status.
    pub status_code: Option<u16>,
    /// Attempt duration.
    pub duration_ms: Option<u64>,
    /// Truncated response body or error text.
    pub response_snippet: Option<String>,
    /// Task this one replays.
    pub replay_of: Option<TaskId>,
}

impl DeliveryTask {
    /// Builds an undelivered task from its creation fields.
    #[must_use]
    pub fn pending(id: TaskId, new: NewTask, created_at: i64) -> Self {
        Self {
            id,
            hook_id: new.hook_id,
            event_type: new.event_type,
            payload: new.payload,
            created_at,
            delivered: false,
            succeeded: false,
            delivered_at: None,
            status_code: None,
            duration_ms: None,
            response_snippet: None,
            replay_of: new.replay_of,
        }
    }

    /// Records the outcome of the delivery attempt.
    pub fn record(&mut self, outcome: &DeliveryOutcome, delivered_at: i64) {
        self.delivered = true;
        self.succeeded = outcome.succeeded;
        self.delivered_at = Some(delivered_at);
        self.status_code = outcome.status_code;
        self.duration_ms = Some(outcome.duration_ms);
        self.response_snippet = Some(outcome.response_snippet.clone());
    }
}

fn serialize_lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success_is_2xx() {
        assert!(DeliveryOutcome::from_response(200, 5, String::new()).succeeded);
        assert!(DeliveryOutcome::from_response(204, 5, String::new()).succeeded);
        assert!(!DeliveryOutcome::from_response(302, 5, String::new()).succeeded);
        assert!(!DeliveryOutcome::from_response(500, 5, String::new()).succeeded);
    }

    #[test]
    fn test_failure_has_no_status() {
        let outcome = DeliveryOutcome::failure(5000, "timed out");
        assert!(!outcome.succeeded);
        assert_eq!(outcome.status_code, None);
        assert_eq!(outcome.response_snippet, "timed out");
    }

    #[test]
    fn test_record_sets_final_fields() {
        let new = NewTask::new(HookId::new(1), HookEventType::Push, b"{}".to_vec());
        let mut task = DeliveryTask::pending(TaskId::new(9), new, 100);
        assert!(!task.delivered);

        task.record(&DeliveryOutcome::from_response(201, 12, "ok".into()), 105);
        assert!(task.delivered);
        assert!(task.succeeded);
        assert_eq!(task.delivered_at, Some(105));
        assert_eq!(task.status_code, Some(201));
        assert_eq!(task.duration_ms, Some(12));
    }

    #[test]
    fn test_task_serialises_payload_as_text() {
        let new = NewTask::new(HookId::new(1), HookEventType::Push, br#"{"a":1}"#.to_vec());
        let task = DeliveryTask::pending(TaskId::new(3), new, 0);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["payload"], r#"{"a":1}"#);
        assert_eq!(value["event_type"], "push");
        assert_eq!(value["id"], 3);
    }
}
