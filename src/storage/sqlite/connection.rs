//! Shared connection handling for `SQLite` stores.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex, recovering from poisoning.
///
/// A panic inside another critical section leaves the guarded value usable,
/// so the inner value is taken and a warning logged instead of failing every
/// later operation.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mutex was poisoned, recovering");
            metrics::counter!("mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies the pragmas every store connection uses.
///
/// - **WAL mode**: readers do not block the writer
/// - **NORMAL synchronous**: durable across application crashes
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention
///
/// The task store and queue store open separate connections to the same file,
/// which WAL mode and the busy timeout make safe.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, and in-memory databases refuse WAL; neither is fatal
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| db_error("configure_connection", &e))
}

/// Opens and configures a database file, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory or database cannot be
/// created.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_data_dir".to_string(),
            cause: e.to_string(),
        })?;
    }
    let conn = Connection::open(path).map_err(|e| db_error("open_database", &e))?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Opens a private in-memory database.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if `SQLite` cannot allocate it.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| db_error("open_memory_db", &e))?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Maps a `rusqlite` error to [`Error::OperationFailed`].
pub fn db_error(operation: &str, err: &rusqlite::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: err.to_string(),
    }
}
