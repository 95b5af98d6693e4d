//! Storage layer.
//!
//! Three seams, each a `Send + Sync` trait:
//! - [`RegistrationStore`]: read access to webhook registrations
//! - [`TaskStore`]: durable delivery task history
//! - [`QueueStore`]: durable backing of the delivery queue
//!
//! `SQLite` implementations back production use; in-memory ones back
//! configuration-defined registrations and tests.

#![allow(clippy::significant_drop_tightening)]

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::{MemoryQueueStore, MemoryRegistrationStore, MemoryTaskStore};
pub use sqlite::{SqliteQueueStore, SqliteTaskStore, acquire_lock};
pub use traits::{QueueStore, RegistrationStore, TaskStore};
