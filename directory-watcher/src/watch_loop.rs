//! The background notification loop.
//!
//! One loop owns one platform watch. It runs on its own thread inside a
//! single-threaded tokio runtime so that waiting for the next platform event
//! is a future that can be raced against cancellation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Backend, WatchConfig};
use crate::error::{Result, WatcherError};
use crate::event::EventBatch;
use crate::signal::{EventSignal, Readiness};
use crate::watcher::{WatchState, WatcherStats};

/// Name given to loop threads.
pub(crate) const LOOP_THREAD_NAME: &str = "dirwatch-loop";

/// Upper bound on how long one batch keeps collecting under a steady
/// stream of events.
const MAX_BATCH_SPAN: Duration = Duration::from_secs(1);

type RawEvent = notify::Result<notify::Event>;

/// State shared between the loop thread and the handle.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) signal: EventSignal,
    pub(crate) readiness: Readiness,
    status: Mutex<LoopStatus>,
}

#[derive(Debug, Default)]
struct LoopStatus {
    state: WatchState,
    stats: WatcherStats,
}

impl Shared {
    pub(crate) fn state(&self) -> WatchState {
        self.status().state
    }

    pub(crate) fn stats(&self) -> WatcherStats {
        self.status().stats.clone()
    }

    fn set_state(&self, state: WatchState) {
        self.status().state = state;
    }

    fn record_batch(&self, batch: &EventBatch) {
        let mut status = self.status();
        status.stats.batches += 1;
        status.stats.events += batch.len() as u64;
        status.stats.last_batch_at = Some(batch.received_at);
    }

    /// Record the final state and release anyone blocked on the signal.
    fn finish(&self, state: WatchState) {
        self.set_state(state);
        self.signal.close();
    }

    fn status(&self) -> MutexGuard<'_, LoopStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why the loop stopped.
#[derive(Debug)]
enum LoopExit {
    Cancelled,
    TargetLost,
    Disconnected,
    Failed(WatcherError),
}

/// Spawn a loop thread for `config` and block until its watch is registered.
///
/// Registration errors are returned here; once this returns `Ok` the loop is
/// ready and listening.
pub(crate) fn spawn(
    config: WatchConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);
    let path = config.path.clone();

    let thread = std::thread::Builder::new()
        .name(LOOP_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(registration_error(&config.path, e)));
                    shared.finish(WatchState::Terminated);
                    return;
                }
            };

            let mut watch_loop = match WatchLoop::register(&config, shared.clone(), cancel) {
                Ok(watch_loop) => watch_loop,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    shared.finish(WatchState::Terminated);
                    return;
                }
            };

            shared.set_state(WatchState::Watching);
            shared.readiness.mark_ready();
            let _ = ready_tx.send(Ok(()));

            let exit = runtime.block_on(watch_loop.listen());
            watch_loop.shutdown(exit);
        })
        .map_err(|e| registration_error(&path, e))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(thread),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(registration_error(
            &path,
            "watch loop exited before registration completed",
        )),
    }
}

fn registration_error(path: &Path, reason: impl fmt::Display) -> WatcherError {
    WatcherError::Registration {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Owns the platform watch for one directory.
struct WatchLoop {
    directory: PathBuf,
    canonical: Option<PathBuf>,
    watcher: Box<dyn Watcher>,
    raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    settle: Duration,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl WatchLoop {
    fn register(
        config: &WatchConfig,
        shared: Arc<Shared>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let directory = config.path.clone();

        if !directory.exists() {
            return Err(WatcherError::DirectoryNotFound(directory));
        }
        if !directory.is_dir() {
            return Err(WatcherError::NotADirectory(directory));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let handler = move |res: RawEvent| {
            // Fails only once the loop is gone, when nobody is listening.
            let _ = raw_tx.send(res);
        };

        let mut watcher: Box<dyn Watcher> = match config.backend {
            Backend::Native => Box::new(
                RecommendedWatcher::new(handler, config.notify_config())
                    .map_err(|e| registration_error(&directory, e))?,
            ),
            Backend::Poll => Box::new(
                PollWatcher::new(handler, config.notify_config())
                    .map_err(|e| registration_error(&directory, e))?,
            ),
        };

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| registration_error(&directory, e))?;

        let canonical = std::fs::canonicalize(&directory)
            .ok()
            .filter(|canonical| canonical != &directory);

        info!(
            "Watching directory [{}] for changes ({:?} backend)",
            directory.display(),
            config.backend
        );

        Ok(Self {
            directory,
            canonical,
            watcher,
            raw_rx,
            settle: config.settle(),
            shared,
            cancel,
        })
    }

    /// Wait for and deliver batches until something ends the loop.
    async fn listen(&mut self) -> LoopExit {
        loop {
            let first = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return LoopExit::Cancelled,
                next = self.raw_rx.recv() => next,
            };
            let Some(first) = first else {
                return LoopExit::Disconnected;
            };

            let mut raw = vec![first];
            if !self.collect(&mut raw).await || self.cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }

            let (batch, failure) = self.translate(raw);
            self.deliver(&batch);

            if let Some(e) = failure {
                return LoopExit::Failed(WatcherError::PlatformIo(e));
            }
            if !self.rearm(&batch) {
                return LoopExit::TargetLost;
            }
        }
    }

    /// Keep adding events to `raw` until the queue has been quiet for the
    /// settle window. Returns `false` if cancelled meanwhile.
    async fn collect(&mut self, raw: &mut Vec<RawEvent>) -> bool {
        let deadline = Instant::now() + MAX_BATCH_SPAN;
        loop {
            let quiet = self.settle.min(deadline.saturating_duration_since(Instant::now()));
            if quiet.is_zero() {
                while let Ok(next) = self.raw_rx.try_recv() {
                    raw.push(next);
                }
                return true;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                next = tokio::time::timeout(quiet, self.raw_rx.recv()) => match next {
                    Ok(Some(event)) => raw.push(event),
                    // Quiet long enough, or the backend hung up.
                    Ok(None) | Err(_) => return true,
                },
            }
        }
    }

    fn translate(&self, raw: Vec<RawEvent>) -> (EventBatch, Option<notify::Error>) {
        let mut roots = vec![self.directory.as_path()];
        if let Some(canonical) = &self.canonical {
            roots.push(canonical.as_path());
        }

        let mut batch = EventBatch::new();
        let mut failure = None;
        for result in raw {
            match result {
                Ok(event) => {
                    debug!("raw event: {event:?}");
                    batch.push_raw(&event, &roots);
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        (batch, failure)
    }

    fn deliver(&self, batch: &EventBatch) {
        if batch.rescan {
            warn!(
                "Backend overflowed while watching [{}]; some changes were not reported individually",
                self.directory.display()
            );
        }
        if !batch.needs_wakeup() {
            return;
        }

        for event in &batch.events {
            info!("Received {event}");
        }
        debug!("batch of {} event(s) delivered", batch.len());

        self.shared.record_batch(batch);
        self.shared.signal.signal();
    }

    /// Check the watch target is still usable. Returns `false` once it is
    /// gone for good.
    fn rearm(&self, batch: &EventBatch) -> bool {
        !batch.target_removed() && self.directory.is_dir()
    }

    fn shutdown(mut self, exit: LoopExit) {
        let state = match exit {
            LoopExit::Cancelled => {
                info!("Received stop request, exiting watch on [{}]", self.directory.display());
                WatchState::Stopped
            }
            LoopExit::TargetLost => {
                warn!(
                    "Watched directory [{}] is no longer available, exiting",
                    self.directory.display()
                );
                WatchState::Terminated
            }
            LoopExit::Disconnected => {
                warn!("Platform watcher for [{}] went away", self.directory.display());
                WatchState::Terminated
            }
            LoopExit::Failed(e) => {
                error!("Watch on [{}] failed: {e}", self.directory.display());
                WatchState::Terminated
            }
        };

        if let Err(e) = self.watcher.unwatch(&self.directory) {
            debug!("unwatch {}: {e}", self.directory.display());
        }
        drop(self.watcher);

        self.shared.finish(state);
    }
}
