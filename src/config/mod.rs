//! Configuration management.
//!
//! Configuration is read from `<config_dir>/hookrelay/config.toml`:
//!
//! ```toml
//! data_dir = "/var/lib/hookrelay"
//!
//! [webhook]
//! enabled = true
//! queue_capacity = 256
//! workers = 4
//! delivery_timeout_secs = 5
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [[registrations]]
//! id = 1
//! url = "https://ci.example.com/hooks/push"
//! secret = "${CI_WEBHOOK_SECRET}"
//! events = ["push"]
//! branch_filter = "main"
//! scope = { type = "repository", repo_id = 42 }
//! ```
//!
//! Environment variables override file values:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `HOOKRELAY_DATA_DIR` | `data_dir` |
//! | `HOOKRELAY_WORKERS` | `webhook.workers` |
//! | `HOOKRELAY_DISABLE_WEBHOOKS` | `webhook.enabled` (set to `true`/`1` to disable) |

mod registrations;

pub use registrations::{ConfigFileRegistration, EventsField, expand_env_vars};

use crate::models::Registration;
use crate::observability::{LogFormat, LoggingConfig};
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name of the `SQLite` database inside the data directory.
pub const DATABASE_FILE: &str = "hookrelay.db";

/// Main configuration for hookrelay.
#[derive(Debug, Clone, Default)]
pub struct HookrelayConfig {
    /// Directory holding the `SQLite` database. `None` keeps tasks in memory.
    pub data_dir: Option<PathBuf>,
    /// Delivery settings.
    pub webhook: WebhookSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Statically configured registrations.
    pub registrations: Vec<Registration>,
}

/// Delivery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Global switch; when `false` events are accepted and dropped.
    pub enabled: bool,
    /// Size of the in-memory queue buffer; pushes block when it is full.
    pub queue_capacity: usize,
    /// Number of delivery workers.
    pub workers: usize,
    /// Per-request timeout.
    pub delivery_timeout_secs: u64,
    /// Maximum bytes of response body kept on a task.
    pub response_snippet_limit: usize,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,
    /// Outbound proxy for every delivery.
    pub proxy_url: Option<String>,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 256,
            workers: 4,
            delivery_timeout_secs: 5,
            response_snippet_limit: 4096,
            skip_tls_verify: false,
            proxy_url: None,
            user_agent: format!("hookrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Webhook section.
    pub webhook: Option<ConfigFileWebhook>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Registrations.
    #[serde(default)]
    pub registrations: Vec<ConfigFileRegistration>,
}

/// `[webhook]` section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWebhook {
    /// Global switch.
    pub enabled: Option<bool>,
    /// Queue buffer size.
    pub queue_capacity: Option<usize>,
    /// Worker count.
    pub workers: Option<usize>,
    /// Request timeout.
    pub delivery_timeout_secs: Option<u64>,
    /// Response snippet limit.
    pub response_snippet_limit: Option<usize>,
    /// Skip TLS verification.
    pub skip_tls_verify: Option<bool>,
    /// Outbound proxy.
    pub proxy_url: Option<String>,
    /// User agent.
    pub user_agent: Option<String>,
}

/// `[logging]` section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Default level filter.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl HookrelayConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path and applies environment overrides.
    ///
    /// A file without `data_dir` gets the platform data directory, the same
    /// as [`load_default`](Self::load_default).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a value is
    /// out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.finalize(Self::default_data_dir());
        Ok(config)
    }

    /// Parses configuration from TOML text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file, |name| std::env::var(name).ok())
    }

    /// Loads configuration from the default location.
    ///
    /// Reads `.env` first, then `<config_dir>/hookrelay/config.toml` if it
    /// exists. Falls back to defaults (with environment overrides) when no
    /// file is present or it cannot be loaded; the load error is logged.
    #[must_use]
    pub fn load_default() -> Self {
        let (config, rejected) = Self::load_default_checked();
        if let Some((path, e)) = rejected {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
        }
        config
    }

    /// Like [`load_default`](Self::load_default), but returns the rejected
    /// config file and its error instead of logging them.
    ///
    /// For callers that install logging from the loaded configuration.
    #[must_use]
    pub fn load_default_checked() -> (Self, Option<(PathBuf, Error)>) {
        let _ = dotenvy::dotenv();

        let mut rejected = None;
        let mut config = match Self::default_path().filter(|path| path.exists()) {
            Some(path) => match Self::load_from_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    rejected = Some((path, e));
                    Self::default()
                },
            },
            None => Self::default(),
        };
        config.finalize(Self::default_data_dir());
        (config, rejected)
    }

    /// Platform data directory: `<data_local_dir>/hookrelay`.
    #[must_use]
    pub fn default_data_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.data_local_dir().join("hookrelay"))
    }

    /// Fills an unset data directory and applies environment overrides.
    fn finalize(&mut self, default_data_dir: Option<PathBuf>) {
        self.fill_data_dir(default_data_dir);
        self.apply_env_overrides();
    }

    fn fill_data_dir(&mut self, default_data_dir: Option<PathBuf>) {
        if self.data_dir.is_none() {
            self.data_dir = default_data_dir;
        }
    }

    /// Platform config path: `<config_dir>/hookrelay/config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("hookrelay").join("config.toml"))
    }

    /// Path of the `SQLite` database, if a data directory is set.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(DATABASE_FILE))
    }

    /// Applies `HOOKRELAY_*` environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|name| std::env::var(name).ok());
    }

    /// Applies `HOOKRELAY_*` overrides from `lookup`.
    pub fn apply_env_overrides_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("HOOKRELAY_DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(workers) = lookup("HOOKRELAY_WORKERS") {
            match workers.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.webhook.workers = n,
                _ => tracing::warn!(value = %workers, "Ignoring invalid HOOKRELAY_WORKERS"),
            }
        }
        if let Some(disable) = lookup("HOOKRELAY_DISABLE_WEBHOOKS") {
            if matches!(disable.trim().to_lowercase().as_str(), "1" | "true" | "yes") {
                self.webhook.enabled = false;
            }
        }
    }

    /// Converts a `ConfigFile`, resolving `${VAR}` references with `lookup`.
    fn from_config_file(file: ConfigFile, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = Some(PathBuf::from(expand_env_vars(&data_dir, &lookup)));
        }
        if let Some(webhook) = file.webhook {
            config.webhook.apply(webhook)?;
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = format.parse::<LogFormat>()?;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }

        let mut seen = std::collections::HashSet::new();
        for entry in file.registrations {
            let id = entry.id;
            if !seen.insert(id) {
                return Err(Error::InvalidInput(format!("Duplicate registration id: {id}")));
            }
            match entry.into_registration(&lookup) {
                Ok(registration) => config.registrations.push(registration),
                // Skipping keeps every other registration deliverable
                Err(e) => tracing::warn!(hook_id = id, error = %e, "Skipping invalid registration"),
            }
        }

        Ok(config)
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Adds a registration.
    #[must_use]
    pub fn with_registration(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }
}

impl WebhookSettings {
    fn apply(&mut self, file: ConfigFileWebhook) -> Result<()> {
        if let Some(enabled) = file.enabled {
            self.enabled = enabled;
        }
        if let Some(capacity) = file.queue_capacity {
            if capacity == 0 {
                return Err(Error::InvalidInput(
                    "webhook.queue_capacity must be at least 1".to_string(),
                ));
            }
            self.queue_capacity = capacity;
        }
        if let Some(workers) = file.workers {
            if workers == 0 {
                return Err(Error::InvalidInput(
                    "webhook.workers must be at least 1".to_string(),
                ));
            }
            self.workers = workers;
        }
        if let Some(timeout) = file.delivery_timeout_secs {
            self.delivery_timeout_secs = timeout.max(1);
        }
        if let Some(limit) = file.response_snippet_limit {
            self.response_snippet_limit = limit;
        }
        if let Some(skip) = file.skip_tls_verify {
            self.skip_tls_verify = skip;
        }
        self.proxy_url = file.proxy_url.filter(|url| !url.is_empty());
        if let Some(user_agent) = file.user_agent {
            self.user_agent = user_agent;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventSubscription, HookEventType, ProviderKind, RegistrationScope};
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn parse_with_env(toml_text: &str, env: &[(&str, &str)]) -> Result<HookrelayConfig> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let file: ConfigFile = toml::from_str(toml_text).unwrap();
        HookrelayConfig::from_config_file(file, |name| env.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = HookrelayConfig::default();
        assert!(config.webhook.enabled);
        assert_eq!(config.webhook.queue_capacity, 256);
        assert_eq!(config.webhook.workers, 4);
        assert_eq!(config.webhook.delivery_timeout_secs, 5);
        assert!(config.webhook.user_agent.starts_with("hookrelay/"));
        assert!(config.database_path().is_none());
    }

    #[test]
    fn test_full_file() {
        let config = parse_with_env(
            r##"
            data_dir = "/tmp/hookrelay"

            [webhook]
            enabled = false
            queue_capacity = 8
            workers = 2
            delivery_timeout_secs = 10
            proxy_url = "http://proxy:3128"

            [logging]
            level = "debug"
            format = "json"

            [[registrations]]
            id = 7
            url = "https://hooks.slack.com/services/x"
            provider = "slack"
            secret = "${HOOK_SECRET}"
            events = ["push", "release"]
            branch_filter = "release/*"
            scope = { type = "owner", owner_id = 3 }
            meta = { channel = "#ci" }
            "##,
            &[("HOOK_SECRET", "s3cret")],
        )
        .unwrap();

        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/tmp/hookrelay/hookrelay.db"))
        );
        assert!(!config.webhook.enabled);
        assert_eq!(config.webhook.queue_capacity, 8);
        assert_eq!(config.webhook.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);

        let reg = &config.registrations[0];
        assert_eq!(reg.provider, ProviderKind::Slack);
        assert_eq!(reg.scope, RegistrationScope::Owner { owner_id: 3 });
        assert_eq!(reg.secret.as_ref().unwrap().expose_secret(), "s3cret");
        assert!(reg.events.has(HookEventType::Release));
        assert!(!reg.events.has(HookEventType::Issues));
        assert_eq!(reg.meta_str("channel"), Some("#ci"));
    }

    #[test]
    fn test_event_modes() {
        let config = parse_with_env(
            r#"
            [[registrations]]
            id = 1
            url = "https://a.example.com"
            events = "push_only"
            scope = { type = "system" }

            [[registrations]]
            id = 2
            url = "https://b.example.com"
            scope = { type = "repository", repo_id = 5 }
            "#,
            &[],
        )
        .unwrap();

        assert_eq!(config.registrations[0].events, EventSubscription::PushOnly);
        assert_eq!(config.registrations[1].events, EventSubscription::All);
    }

    #[test]
    fn test_invalid_registration_is_skipped() {
        let config = parse_with_env(
            r#"
            [[registrations]]
            id = 1
            url = "ftp://nope"
            scope = { type = "system" }

            [[registrations]]
            id = 2
            url = "https://ok.example.com"
            scope = { type = "system" }
            "#,
            &[],
        )
        .unwrap();
        assert_eq!(config.registrations.len(), 1);
        assert_eq!(config.registrations[0].id.get(), 2);
    }

    #[test]
    fn test_duplicate_registration_ids_are_rejected() {
        let result = parse_with_env(
            r#"
            [[registrations]]
            id = 1
            url = "https://a.example.com"
            scope = { type = "system" }

            [[registrations]]
            id = 1
            url = "https://b.example.com"
            scope = { type = "system" }
            "#,
            &[],
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = parse_with_env("[webhook]\nworkers = 0\n", &[]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = HookrelayConfig::default();
        let env: HashMap<&str, &str> = [
            ("HOOKRELAY_DATA_DIR", "/srv/hooks"),
            ("HOOKRELAY_WORKERS", "9"),
            ("HOOKRELAY_DISABLE_WEBHOOKS", "true"),
        ]
        .into_iter()
        .collect();
        config.apply_env_overrides_with(|name| env.get(name).map(|v| (*v).to_string()));

        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/hooks")));
        assert_eq!(config.webhook.workers, 9);
        assert!(!config.webhook.enabled);
    }

    #[test]
    fn test_invalid_worker_override_is_ignored() {
        let mut config = HookrelayConfig::default();
        config.apply_env_overrides_with(|name| {
            (name == "HOOKRELAY_WORKERS").then(|| "zero".to_string())
        });
        assert_eq!(config.webhook.workers, 4);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[webhook]\nqueue_capacity = 3\n").unwrap();

        let config = HookrelayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.webhook.queue_capacity, 3);

        let missing = HookrelayConfig::load_from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_load_from_file_without_data_dir_uses_platform_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[webhook]\nworkers = 2\n").unwrap();

        let config = HookrelayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.webhook.workers, 2);
        let expected = std::env::var("HOOKRELAY_DATA_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(HookrelayConfig::default_data_dir);
        assert_eq!(config.data_dir, expected);
    }

    #[test]
    fn test_explicit_data_dir_is_kept() {
        let mut config = parse_with_env("data_dir = \"/srv/hooks\"\n", &[]).unwrap();
        let mut defaulted = parse_with_env("", &[]).unwrap();

        config.fill_data_dir(Some(PathBuf::from("/fallback")));
        defaulted.fill_data_dir(Some(PathBuf::from("/fallback")));

        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/hooks")));
        assert_eq!(
            defaulted.database_path(),
            Some(PathBuf::from("/fallback").join(DATABASE_FILE))
        );
    }
}
