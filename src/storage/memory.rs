//! In-memory stores.
//!
//! Registrations loaded from configuration live here. The task and queue
//! stores are used when no data directory is configured and in tests.

use super::sqlite::acquire_lock;
use super::{QueueStore, RegistrationStore, TaskStore};
use crate::current_timestamp;
use crate::models::{
    DeliveryOutcome, DeliveryTask, HookId, NewTask, Registration, RegistrationScope, TaskId,
};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// In-memory [`RegistrationStore`].
#[derive(Default)]
pub struct MemoryRegistrationStore {
    registrations: Mutex<Vec<Registration>>,
}

impl MemoryRegistrationStore {
    /// Creates a store holding `registrations`.
    #[must_use]
    pub const fn new(registrations: Vec<Registration>) -> Self {
        Self {
            registrations: Mutex::new(registrations),
        }
    }
}

impl RegistrationStore for MemoryRegistrationStore {
    fn find_active(&self, scope: &RegistrationScope) -> Result<Vec<Registration>> {
        Ok(acquire_lock(&self.registrations)
            .iter()
            .filter(|r| r.active && r.scope == *scope)
            .cloned()
            .collect())
    }

    fn get(&self, id: HookId) -> Result<Option<Registration>> {
        Ok(acquire_lock(&self.registrations)
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
}

#[derive(Default)]
struct TaskTable {
    next_id: i64,
    tasks: BTreeMap<TaskId, DeliveryTask>,
}

/// In-memory [`TaskStore`].
#[derive(Default)]
pub struct MemoryTaskStore {
    table: Mutex<TaskTable>,
}

impl MemoryTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(&self, task: NewTask) -> Result<DeliveryTask> {
        let mut table = acquire_lock(&self.table);
        table.next_id += 1;
        let id = TaskId::new(table.next_id);
        let created = DeliveryTask::pending(id, task, current_timestamp());
        table.tasks.insert(id, created.clone());
        Ok(created)
    }

    fn get(&self, id: TaskId) -> Result<DeliveryTask> {
        acquire_lock(&self.table)
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    fn mark_delivered(&self, id: TaskId, outcome: &DeliveryOutcome) -> Result<()> {
        let mut table = acquire_lock(&self.table);
        let task = table
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        if task.delivered {
            return Err(Error::InvalidState(format!("task {id} is already delivered")));
        }
        task.record(outcome, current_timestamp());
        Ok(())
    }

    fn list_for_registration(&self, hook_id: HookId, limit: usize) -> Result<Vec<DeliveryTask>> {
        Ok(acquire_lock(&self.table)
            .tasks
            .values()
            .rev()
            .filter(|t| t.hook_id == hook_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn undelivered(&self) -> Result<Vec<DeliveryTask>> {
        Ok(acquire_lock(&self.table)
            .tasks
            .values()
            .filter(|t| !t.delivered)
            .cloned()
            .collect())
    }

    fn prune_delivered(&self, before: i64) -> Result<usize> {
        let mut table = acquire_lock(&self.table);
        let count = table.tasks.len();
        table
            .tasks
            .retain(|_, t| !(t.delivered && t.delivered_at.is_some_and(|at| at < before)));
        Ok(count - table.tasks.len())
    }
}

/// In-memory [`QueueStore`]. Entries do not survive a restart.
#[derive(Default)]
pub struct MemoryQueueStore {
    ids: Mutex<Vec<TaskId>>,
}

impl MemoryQueueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for MemoryQueueStore {
    fn persist(&self, id: TaskId) -> Result<()> {
        let mut ids = acquire_lock(&self.ids);
        if !ids.contains(&id) {
            ids.push(id);
        }
        Ok(())
    }

    fn remove(&self, id: TaskId) -> Result<()> {
        acquire_lock(&self.ids).retain(|existing| *existing != id);
        Ok(())
    }

    fn load(&self) -> Result<Vec<TaskId>> {
        Ok(acquire_lock(&self.ids).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HookEventType;

    #[test]
    fn test_find_active_matches_scope_exactly() {
        let store = MemoryRegistrationStore::new(vec![
            Registration::new(1, "https://a", RegistrationScope::Repository { repo_id: 1 }),
            Registration::new(2, "https://b", RegistrationScope::Repository { repo_id: 2 }),
            Registration::new(3, "https://c", RegistrationScope::Repository { repo_id: 1 })
                .with_active(false),
            Registration::new(4, "https://d", RegistrationScope::System),
        ]);

        let found = store
            .find_active(&RegistrationScope::Repository { repo_id: 1 })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, HookId::new(1));

        // inactive registrations are still retrievable by ID
        assert!(store.get(HookId::new(3)).unwrap().is_some());
        assert!(store.get(HookId::new(9)).unwrap().is_none());
    }

    #[test]
    fn test_memory_task_store_guards_double_delivery() {
        let store = MemoryTaskStore::new();
        let task = store
            .create(NewTask::new(HookId::new(1), HookEventType::Push, vec![]))
            .unwrap();
        let outcome = DeliveryOutcome::from_response(200, 1, String::new());

        store.mark_delivered(task.id, &outcome).unwrap();
        assert!(matches!(
            store.mark_delivered(task.id, &outcome),
            Err(Error::InvalidState(_))
        ));
        assert!(store.undelivered().unwrap().is_empty());
    }

    #[test]
    fn test_memory_queue_store_dedups() {
        let store = MemoryQueueStore::new();
        store.persist(TaskId::new(1)).unwrap();
        store.persist(TaskId::new(1)).unwrap();
        store.persist(TaskId::new(2)).unwrap();
        assert_eq!(store.load().unwrap(), vec![TaskId::new(1), TaskId::new(2)]);
        store.remove(TaskId::new(1)).unwrap();
        assert_eq!(store.load().unwrap(), vec![TaskId::new(2)]);
    }
}
