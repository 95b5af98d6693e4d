//! `SQLite` stores.
//!
//! The task store and queue store share one database file and each keep
//! their own `Mutex<Connection>`.

mod connection;
mod queue;
mod tasks;

pub use connection::{acquire_lock, configure_connection};
pub use queue::SqliteQueueStore;
pub use tasks::SqliteTaskStore;

use std::time::Instant;

/// Records `storage_operations_total` and `storage_operation_duration_ms`.
fn record_operation(operation: &'static str, start: Instant, ok: bool) {
    let status = if ok { "success" } else { "error" };
    metrics::counter!(
        "storage_operations_total",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
