//! `SQLite` backing for the delivery queue.

use super::connection::{acquire_lock, db_error, open_database, open_in_memory};
use crate::Result;
use crate::models::TaskId;
use crate::storage::QueueStore;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// `SQLite`-backed [`QueueStore`].
///
/// Entries live in the `hook_queue` table of the same database file as the
/// task store, on a separate connection.
pub struct SqliteQueueStore {
    conn: Mutex<Connection>,
}

#[allow(clippy::significant_drop_tightening)]
impl SqliteQueueStore {
    /// Opens (or creates) the queue table in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the database cannot be
    /// opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(open_database(path)?)
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS hook_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL UNIQUE
            );
            ",
        )
        .map_err(|e| db_error("create_queue_schema", &e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[allow(clippy::significant_drop_tightening)]
impl QueueStore for SqliteQueueStore {
    fn persist(&self, id: TaskId) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT OR IGNORE INTO hook_queue (task_id) VALUES (?1)",
            params![id.get()],
        )
        .map_err(|e| db_error("persist_queue_entry", &e))?;
        Ok(())
    }

    fn remove(&self, id: TaskId) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute("DELETE FROM hook_queue WHERE task_id = ?1", params![id.get()])
            .map_err(|e| db_error("remove_queue_entry", &e))?;
        Ok(())
    }

    fn load(&self) -> Result<Vec<TaskId>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT task_id FROM hook_queue ORDER BY seq")
            .map_err(|e| db_error("prepare_queue_load", &e))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| db_error("load_queue", &e))?
            .map(|id| id.map(TaskId::new).map_err(|e| db_error("read_queue_row", &e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(ids)
    }
}
