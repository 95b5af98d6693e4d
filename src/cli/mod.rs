//! CLI command implementations.
//!
//! Each submodule implements one `hookrelay` subcommand on top of
//! [`WebhookService`](crate::WebhookService).
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serve` | Recover pending tasks and deliver until Ctrl-C |
//! | `notify` | Fan out one event from a JSON file and wait for delivery |
//! | `replay` | Re-deliver a previous task |
//! | `test` | Send a sample push to a registration |
//! | `tasks` | Show a registration's delivery history |
//! | `prune` | Delete old delivered tasks |
//!
//! # Example Usage
//!
//! ```bash
//! # Deliver webhooks until interrupted
//! hookrelay serve
//!
//! # Fan out a push event
//! hookrelay notify --event push push.json
//!
//! # Inspect and replay
//! hookrelay tasks 3 --limit 20
//! hookrelay replay 3 118
//! ```

mod notify;
mod serve;
mod tasks;

pub use notify::{cmd_notify, cmd_replay, cmd_test, load_payload};
pub use serve::cmd_serve;
pub use tasks::{OutputFormat, cmd_prune, cmd_tasks, render_table};
