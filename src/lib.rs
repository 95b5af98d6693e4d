//! # Hookrelay
//!
//! Outbound webhook delivery for a code-hosting platform.
//!
//! Domain events (pushes, issue and pull request changes, releases, ...) are
//! fanned out to every active webhook registration whose scope matches the
//! event source, filtered by subscribed event type and branch, shaped into the
//! provider's wire format, persisted as delivery tasks and delivered by a
//! bounded worker pool over signed HTTP requests.
//!
//! ## Features
//!
//! - Repository, owner and system-wide registration scopes
//! - Branch filter globs and per-registration event subscriptions
//! - Native pass-through plus Slack, Discord, Microsoft Teams, Telegram,
//!   Matrix, `DingTalk`, Feishu, `WeChat` Work and Packagist payloads
//! - Deduplicating, restart-tolerant delivery queue (at most one in-flight
//!   delivery per task)
//! - HMAC-SHA256 payload signatures and delivery-id headers
//! - `SQLite`-backed task history with operator replay
//!
//! ## Example
//!
//! ```rust,ignore
//! use hookrelay::{HookrelayConfig, WebhookService};
//!
//! let config = HookrelayConfig::load_default();
//! let service = WebhookService::open(&config)?;
//! service.recover().await?;
//! let pool = service.start();
//! service.notify(&source, HookEventType::Push, &payload).await?;
//! pool.shutdown().await;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod storage;
pub mod webhooks;

// Re-exports for convenience
pub use config::{HookrelayConfig, WebhookSettings};
pub use models::{
    DeliveryOutcome, DeliveryTask, EventSource, HookEventType, HookId, HookPayload, ProviderKind,
    Registration, RegistrationScope, TaskId,
};
pub use storage::{QueueStore, RegistrationStore, TaskStore};
pub use webhooks::{NotifyReport, WebhookService};

/// Error type for hookrelay operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed config, unknown event names, bad CLI arguments |
/// | `OperationFailed` | `SQLite` queries fail, I/O errors, HTTP client construction fails |
/// | `NotFound` | A task or registration does not exist |
/// | `UnsupportedProvider` | A registration names a provider with no payload transform |
/// | `InvalidBranchFilter` | A branch filter glob cannot be compiled |
/// | `PayloadShaping` | Provider metadata is missing or malformed |
/// | `InvalidState` | A delivered task is marked delivered a second time |
/// | `QueueClosed` | A push arrives after the delivery queue began shutting down |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The registration's provider has no payload transform.
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// A branch filter could not be compiled.
    #[error("invalid branch filter '{pattern}': {cause}")]
    InvalidBranchFilter {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        cause: String,
    },

    /// A provider payload could not be built.
    #[error("cannot shape {provider} payload: {cause}")]
    PayloadShaping {
        /// Provider name.
        provider: String,
        /// Why shaping failed.
        cause: String,
    },

    /// A state transition was requested that the record does not allow.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The delivery queue no longer accepts pushes.
    #[error("delivery queue is closed")]
    QueueClosed,
}

impl Error {
    /// Returns `true` for errors caused by one registration's configuration.
    ///
    /// These skip the affected registration only and never fail the fan-out
    /// of the event that triggered them.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedProvider(_)
                | Self::InvalidBranchFilter { .. }
                | Self::PayloadShaping { .. }
        )
    }
}

/// Result type alias for hookrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "create_hook_task".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'create_hook_task' failed: disk full"
        );

        let err = Error::InvalidBranchFilter {
            pattern: "[main".to_string(),
            cause: "unclosed character class".to_string(),
        };
        assert!(err.to_string().contains("[main"));
    }

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(Error::UnsupportedProvider("x".into()).is_configuration());
        assert!(
            Error::PayloadShaping {
                provider: "slack".into(),
                cause: "no channel".into()
            }
            .is_configuration()
        );
        assert!(!Error::QueueClosed.is_configuration());
        assert!(
            !Error::OperationFailed {
                operation: "x".into(),
                cause: "y".into()
            }
            .is_configuration()
        );
    }
}
