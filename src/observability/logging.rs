//! Logging configuration.

use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a full filter directive.
pub const LOG_ENV: &str = "HOOKRELAY_LOG";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("Unknown log format: {other}"))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level directive, used when no filter environment variable is set.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Raises the level to `debug` when `verbose` is set.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = "debug".to_string();
        }
        self
    }

    /// Builds the filter: `HOOKRELAY_LOG`, then `RUST_LOG`, then `level`.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        self.filter_with(|name| std::env::var(name).ok())
    }

    pub(crate) fn filter_with(&self, lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
        let directive = lookup(LOG_ENV)
            .or_else(|| lookup("RUST_LOG"))
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| self.level.clone());
        EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("invalid log filter {directive:?}: {e}; falling back to info");
            EnvFilter::new("info")
        })
    }
}
