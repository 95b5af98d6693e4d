//! Delivery task store trait.

use crate::models::{DeliveryOutcome, DeliveryTask, HookId, NewTask, TaskId};
use crate::{Error, Result};

/// Durable record of delivery tasks.
///
/// Implementations assign unique task IDs and must reject a second
/// `mark_delivered` for the same task, so that concurrent workers can never
/// both record an outcome.
pub trait TaskStore: Send + Sync {
    /// Persists a new undelivered task and returns it with its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the task cannot be stored.
    fn create(&self, task: NewTask) -> Result<DeliveryTask>;

    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task has this ID.
    fn get(&self, id: TaskId) -> Result<DeliveryTask>;

    /// Records the outcome of the task's delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the task is already delivered and
    /// [`Error::NotFound`] if it does not exist.
    fn mark_delivered(&self, id: TaskId, outcome: &DeliveryOutcome) -> Result<()>;

    /// Lists a registration's tasks, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn list_for_registration(&self, hook_id: HookId, limit: usize) -> Result<Vec<DeliveryTask>>;

    /// Lists every task not yet delivered, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn undelivered(&self) -> Result<Vec<DeliveryTask>>;

    /// Deletes delivered tasks completed before `before` (Unix seconds).
    ///
    /// Returns the number of deleted tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn prune_delivered(&self, before: i64) -> Result<usize>;

    /// Creates a fresh undelivered copy of a registration's task.
    ///
    /// The copy has a new ID, the original's payload and event type, and
    /// records which task it replays. The original is not modified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task does not exist or belongs to
    /// another registration.
    fn replay(&self, hook_id: HookId, task_id: TaskId) -> Result<DeliveryTask> {
        let original = self.get(task_id)?;
        if original.hook_id != hook_id {
            return Err(Error::NotFound(format!(
                "task {task_id} for registration {hook_id}"
            )));
        }
        self.create(NewTask {
            hook_id,
            event_type: original.event_type,
            payload: original.payload,
            replay_of: Some(task_id),
        })
    }
}
