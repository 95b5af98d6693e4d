//! Durable queue backing trait.

use crate::Result;
use crate::models::TaskId;

/// Durable set of queued task IDs.
///
/// Lets pending entries of the delivery queue survive a restart. Only task
/// IDs are stored; payloads always come from the task store.
pub trait QueueStore: Send + Sync {
    /// Adds an ID. Adding an ID that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn persist(&self, id: TaskId) -> Result<()>;

    /// Removes an ID. Removing an absent ID is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn remove(&self, id: TaskId) -> Result<()>;

    /// Returns every stored ID in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn load(&self) -> Result<Vec<TaskId>>;
}
