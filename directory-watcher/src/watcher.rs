//! Directory watcher handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::WatchConfig;
use crate::error::Result;
use crate::watch_loop::{self, Shared};

/// Handle to a running watch on one directory.
///
/// The notification loop runs on its own thread. Callers block in
/// [`WatcherHandle::wait_for_event`] until the loop reports that something
/// changed; several changes delivered together by the platform produce a
/// single wakeup.
///
/// Dropping the handle stops the loop.
pub struct WatcherHandle {
    /// Watched directory.
    directory: PathBuf,

    /// State shared with the loop thread.
    shared: Arc<Shared>,

    /// Cancels the loop.
    cancel: CancellationToken,

    /// Loop thread. Never joined; only inspected.
    thread: JoinHandle<()>,
}

impl WatcherHandle {
    /// Start watching the directory described by `config`.
    ///
    /// Blocks until the platform watch is registered. Fails if the
    /// directory is missing, is not a directory, or the platform facility
    /// cannot be initialized.
    pub fn start(config: WatchConfig) -> Result<Self> {
        let directory = config.path.clone();
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();

        let thread = watch_loop::spawn(config, shared.clone(), cancel.clone())?;
        debug!("watch loop started for {}", directory.display());

        Ok(Self {
            directory,
            shared,
            cancel,
            thread,
        })
    }

    /// Start watching `path` with the default configuration.
    pub fn watch(path: impl Into<PathBuf>) -> Result<Self> {
        Self::start(WatchConfig::new(path))
    }

    /// The watched directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether the platform watch has been registered. Never goes back to
    /// `false`.
    pub fn is_ready(&self) -> bool {
        self.shared.readiness.is_ready()
    }

    /// Block until at least one change has been reported since the last
    /// call, then consume it.
    ///
    /// Returns [`crate::WatcherError::Closed`] once the loop has exited
    /// (stopped, or terminated by a failure) and nothing is left pending.
    pub fn wait_for_event(&self) -> Result<()> {
        self.shared.signal.wait()
    }

    /// Like [`WatcherHandle::wait_for_event`] with an upper bound. Returns
    /// `Ok(false)` on timeout.
    pub fn wait_for_event_timeout(&self, timeout: Duration) -> Result<bool> {
        self.shared.signal.wait_timeout(timeout)
    }

    /// Whether a change is waiting to be consumed.
    pub fn has_pending_event(&self) -> bool {
        self.shared.signal.is_pending()
    }

    /// Ask the loop to stop. Returns without waiting for it to exit and is
    /// safe to call more than once.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping watch on [{}]", self.directory.display());
            self.cancel.cancel();
        }
    }

    /// Whether the loop thread is still running.
    pub fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Current lifecycle state of the loop.
    pub fn state(&self) -> WatchState {
        self.shared.state()
    }

    /// Delivery counters.
    pub fn stats(&self) -> WatcherStats {
        self.shared.stats()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("directory", &self.directory)
            .field("state", &self.state())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Lifecycle of a watch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    /// Registering the platform watch.
    #[default]
    Starting,

    /// Listening for changes.
    Watching,

    /// Exited after a stop request.
    Stopped,

    /// Exited because the target disappeared or the platform failed. No
    /// further events will be delivered.
    Terminated,
}

impl WatchState {
    /// Whether the loop has exited.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Stopped | Self::Terminated)
    }
}

/// Statistics about delivered changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStats {
    /// Batches that produced a wakeup.
    pub batches: u64,

    /// Change events translated across all batches.
    pub events: u64,

    /// When the last batch arrived.
    pub last_batch_at: Option<DateTime<Utc>>,
}
