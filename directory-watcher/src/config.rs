//! Configuration types for directory watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default interval for the polling backend.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default quiet period that closes a batch.
pub const DEFAULT_SETTLE_MS: u64 = 20;

/// Configuration for a watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Path to the directory.
    pub path: PathBuf,

    /// Which notification mechanism to use.
    #[serde(default)]
    pub backend: Backend,

    /// Scan interval for the polling backend, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Compare file contents when polling instead of only metadata.
    #[serde(default)]
    pub compare_contents: bool,

    /// How long the event queue must stay quiet, in milliseconds, before
    /// the events collected so far are delivered as one batch.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

impl WatchConfig {
    /// Create a new watch config using the native backend.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backend: Backend::Native,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            compare_contents: false,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the polling interval. Implies nothing about the backend.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable content comparison for the polling backend.
    pub fn compare_contents(mut self) -> Self {
        self.compare_contents = true;
        self
    }

    /// Set the quiet period that closes a batch.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle_ms = u64::try_from(settle.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Batch settle window as a `Duration`.
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Polling interval as a `Duration`. Zero is bumped to one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The notify configuration this watch config maps to.
    pub(crate) fn notify_config(&self) -> notify::Config {
        notify::Config::default()
            .with_poll_interval(self.poll_interval())
            .with_compare_contents(self.compare_contents)
    }
}

/// Which notification mechanism to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The platform's native facility (inotify, FSEvents, kqueue,
    /// ReadDirectoryChangesW). Lowest latency.
    #[default]
    Native,

    /// Periodic metadata scans. Works everywhere, including network mounts.
    Poll,
}
