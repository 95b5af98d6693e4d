//! `SQLite` task store.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE hook_tasks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     hook_id INTEGER NOT NULL,
//!     event_type TEXT NOT NULL,
//!     payload BLOB NOT NULL,
//!     created_at INTEGER NOT NULL,
//!     is_delivered INTEGER NOT NULL DEFAULT 0,
//!     is_succeeded INTEGER NOT NULL DEFAULT 0,
//!     delivered_at INTEGER,
//!     status_code INTEGER,
//!     duration_ms INTEGER,
//!     response_snippet TEXT,
//!     replay_of INTEGER
//! );
//! ```
//!
//! `AUTOINCREMENT` keeps IDs unique even after the newest tasks are pruned.

use super::connection::{acquire_lock, db_error, open_database, open_in_memory};
use super::record_operation;
use crate::current_timestamp;
use crate::models::{DeliveryOutcome, DeliveryTask, HookEventType, HookId, NewTask, TaskId};
use crate::storage::TaskStore;
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

const TASK_COLUMNS: &str = "id, hook_id, event_type, payload, created_at, is_delivered, \
     is_succeeded, delivered_at, status_code, duration_ms, response_snippet, replay_of";

/// `SQLite`-backed [`TaskStore`].
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

/// A task row before domain conversion.
struct TaskRow {
    id: i64,
    hook_id: i64,
    event_type: String,
    payload: Vec<u8>,
    created_at: i64,
    delivered: bool,
    succeeded: bool,
    delivered_at: Option<i64>,
    status_code: Option<i64>,
    duration_ms: Option<i64>,
    response_snippet: Option<String>,
    replay_of: Option<i64>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            hook_id: row.get(1)?,
            event_type: row.get(2)?,
            payload: row.get(3)?,
            created_at: row.get(4)?,
            delivered: row.get(5)?,
            succeeded: row.get(6)?,
            delivered_at: row.get(7)?,
            status_code: row.get(8)?,
            duration_ms: row.get(9)?,
            response_snippet: row.get(10)?,
            replay_of: row.get(11)?,
        })
    }

    fn into_task(self) -> Result<DeliveryTask> {
        let event_type: HookEventType = self.event_type.parse()?;
        Ok(DeliveryTask {
            id: TaskId::new(self.id),
            hook_id: HookId::new(self.hook_id),
            event_type,
            payload: self.payload,
            created_at: self.created_at,
            delivered: self.delivered,
            succeeded: self.succeeded,
            delivered_at: self.delivered_at,
            status_code: self.status_code.and_then(|c| u16::try_from(c).ok()),
            duration_ms: self.duration_ms.and_then(|d| u64::try_from(d).ok()),
            response_snippet: self.response_snippet,
            replay_of: self.replay_of.map(TaskId::new),
        })
    }
}

// Mutex guards are held for the duration of database operations
#[allow(clippy::significant_drop_tightening)]
impl SqliteTaskStore {
    /// Opens (or creates) the task table in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the database cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(open_database(path)?)
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS hook_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hook_id INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                is_delivered INTEGER NOT NULL DEFAULT 0,
                is_succeeded INTEGER NOT NULL DEFAULT 0,
                delivered_at INTEGER,
                status_code INTEGER,
                duration_ms INTEGER,
                response_snippet TEXT,
                replay_of INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_hook_tasks_hook_id ON hook_tasks(hook_id);
            CREATE INDEX IF NOT EXISTS idx_hook_tasks_is_delivered ON hook_tasks(is_delivered);
            ",
        )
        .map_err(|e| db_error("create_task_schema", &e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_tasks(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DeliveryTask>> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| db_error("prepare_task_query", &e))?;
        let rows = stmt
            .query_map(params, TaskRow::from_row)
            .map_err(|e| db_error("query_tasks", &e))?;

        rows.map(|row| row.map_err(|e| db_error("read_task_row", &e))?.into_task())
            .collect()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl TaskStore for SqliteTaskStore {
    fn create(&self, task: NewTask) -> Result<DeliveryTask> {
        let start = Instant::now();
        let created_at = current_timestamp();
        let conn = acquire_lock(&self.conn);

        let result = conn
            .execute(
                "INSERT INTO hook_tasks (hook_id, event_type, payload, created_at, replay_of)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    task.hook_id.get(),
                    task.event_type.as_str(),
                    &task.payload,
                    created_at,
                    task.replay_of.map(|id| id.get()),
                ],
            )
            .map(|_| TaskId::new(conn.last_insert_rowid()))
            .map_err(|e| db_error("create_hook_task", &e));
        record_operation("create", start, result.is_ok());

        Ok(DeliveryTask::pending(result?, task, created_at))
    }

    fn get(&self, id: TaskId) -> Result<DeliveryTask> {
        let conn = acquire_lock(&self.conn);
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM hook_tasks WHERE id = ?1"),
                params![id.get()],
                TaskRow::from_row,
            )
            .optional()
            .map_err(|e| db_error("get_hook_task", &e))?;

        row.ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .into_task()
    }

    fn mark_delivered(&self, id: TaskId, outcome: &DeliveryOutcome) -> Result<()> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);

        // The is_delivered guard makes the transition single-shot across connections.
        let updated = conn
            .execute(
                "UPDATE hook_tasks
                 SET is_delivered = 1, is_succeeded = ?2, delivered_at = ?3,
                     status_code = ?4, duration_ms = ?5, response_snippet = ?6
                 WHERE id = ?1 AND is_delivered = 0",
                params![
                    id.get(),
                    outcome.succeeded,
                    current_timestamp(),
                    outcome.status_code,
                    i64::try_from(outcome.duration_ms).unwrap_or(i64::MAX),
                    outcome.response_snippet,
                ],
            )
            .map_err(|e| db_error("mark_task_delivered", &e));
        record_operation("mark_delivered", start, updated.is_ok());

        if updated? == 1 {
            return Ok(());
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM hook_tasks WHERE id = ?1)",
                params![id.get()],
                |row| row.get(0),
            )
            .map_err(|e| db_error("get_hook_task", &e))?;
        if exists {
            Err(Error::InvalidState(format!("task {id} is already delivered")))
        } else {
            Err(Error::NotFound(format!("task {id}")))
        }
    }

    fn list_for_registration(&self, hook_id: HookId, limit: usize) -> Result<Vec<DeliveryTask>> {
        let conn = acquire_lock(&self.conn);
        Self::query_tasks(
            &conn,
            &format!(
                "SELECT {TASK_COLUMNS} FROM hook_tasks WHERE hook_id = ?1 ORDER BY id DESC LIMIT ?2"
            ),
            params![hook_id.get(), i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    fn undelivered(&self) -> Result<Vec<DeliveryTask>> {
        let conn = acquire_lock(&self.conn);
        Self::query_tasks(
            &conn,
            &format!("SELECT {TASK_COLUMNS} FROM hook_tasks WHERE is_delivered = 0 ORDER BY id"),
            [],
        )
    }

    fn prune_delivered(&self, before: i64) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "DELETE FROM hook_tasks WHERE is_delivered = 1 AND delivered_at < ?1",
            params![before],
        )
        .map_err(|e| db_error("prune_hook_tasks", &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(hook: i64) -> NewTask {
        NewTask::new(HookId::new(hook), HookEventType::Push, br#"{"ref":"main"}"#.to_vec())
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let a = store.create(new_task(1)).unwrap();
        let b = store.create(new_task(1)).unwrap();

        assert_ne!(a.id, b.id);
        assert!(!a.delivered);
        assert_eq!(store.get(a.id).unwrap().payload, br#"{"ref":"main"}"#);
    }

    #[test]
    fn test_get_missing_task_is_not_found() {
        let store = SqliteTaskStore::in_memory().unwrap();
        assert!(matches!(store.get(TaskId::new(404)), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_mark_delivered_is_single_shot() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = store.create(new_task(1)).unwrap();
        let outcome = DeliveryOutcome::from_response(200, 15, "ok".to_string());

        store.mark_delivered(task.id, &outcome).unwrap();
        let second = store.mark_delivered(task.id, &DeliveryOutcome::failure(1, "late"));
        assert!(matches!(second, Err(Error::InvalidState(_))));

        let stored = store.get(task.id).unwrap();
        assert!(stored.delivered);
        assert!(stored.succeeded);
        assert_eq!(stored.status_code, Some(200));
        assert_eq!(stored.duration_ms, Some(15));
        assert_eq!(stored.response_snippet.as_deref(), Some("ok"));
        assert!(stored.delivered_at.is_some());
    }

    #[test]
    fn test_mark_delivered_missing_task() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let result = store.mark_delivered(TaskId::new(1), &DeliveryOutcome::failure(0, "x"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_replay_copies_payload_and_leaves_original() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let original = store.create(new_task(1)).unwrap();
        store
            .mark_delivered(original.id, &DeliveryOutcome::from_response(500, 3, String::new()))
            .unwrap();

        let replay = store.replay(HookId::new(1), original.id).unwrap();
        assert_ne!(replay.id, original.id);
        assert_eq!(replay.payload, original.payload);
        assert_eq!(replay.replay_of, Some(original.id));
        assert!(!replay.delivered);

        let unchanged = store.get(original.id).unwrap();
        assert_eq!(unchanged.status_code, Some(500));
    }

    #[test]
    fn test_replay_rejects_foreign_task() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let task = store.create(new_task(1)).unwrap();
        assert!(matches!(
            store.replay(HookId::new(2), task.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_undelivered_and_listing() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let a = store.create(new_task(1)).unwrap();
        let b = store.create(new_task(1)).unwrap();
        let c = store.create(new_task(2)).unwrap();
        store
            .mark_delivered(b.id, &DeliveryOutcome::from_response(200, 1, String::new()))
            .unwrap();

        let pending: Vec<TaskId> = store.undelivered().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(pending, vec![a.id, c.id]);

        let listed: Vec<TaskId> = store
            .list_for_registration(HookId::new(1), 10)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(listed, vec![b.id, a.id]);
    }

    #[test]
    fn test_prune_only_removes_old_delivered_tasks() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let delivered = store.create(new_task(1)).unwrap();
        let pending = store.create(new_task(1)).unwrap();
        store
            .mark_delivered(delivered.id, &DeliveryOutcome::from_response(200, 1, String::new()))
            .unwrap();

        assert_eq!(store.prune_delivered(0).unwrap(), 0);
        assert_eq!(store.prune_delivered(current_timestamp() + 10).unwrap(), 1);
        assert!(store.get(pending.id).is_ok());
        assert!(matches!(store.get(delivered.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_tasks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hookrelay.db");
        let id = {
            let store = SqliteTaskStore::open(&path).unwrap();
            store.create(new_task(5)).unwrap().id
        };

        let reopened = SqliteTaskStore::open(&path).unwrap();
        let task = reopened.get(id).unwrap();
        assert_eq!(task.hook_id, HookId::new(5));
        assert_eq!(reopened.undelivered().unwrap().len(), 1);
    }
}
