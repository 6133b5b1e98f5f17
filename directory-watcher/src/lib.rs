//! # Directory Watcher
//!
//! Change notification for a single directory with a blocking
//! "wait for the next change" contract.
//!
//! ## Features
//!
//! - **Background loop**: the platform watch runs on its own thread
//! - **Native backends**: inotify, FSEvents, kqueue and ReadDirectoryChangesW,
//!   with a polling fallback
//! - **Coalesced wakeups**: one wakeup per batch the platform delivers
//! - **Prompt shutdown**: `stop()` interrupts the loop even while it waits
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Directory Watcher                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchConfig ──► WatchLoop ──► ChangeEvent / EventBatch        │
//! │                      │                                         │
//! │                      ▼                                         │
//! │  WatcherHandle ◄── EventSignal                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use dirwatch::WatcherHandle;
//!
//! # fn main() -> dirwatch::Result<()> {
//! let handle = WatcherHandle::watch("/tmp/inbox")?;
//! std::fs::write("/tmp/inbox/new.txt", "hello")?;
//! handle.wait_for_event()?;
//! handle.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod signal;
mod watch_loop;
pub mod watcher;

pub use config::{Backend, WatchConfig};
pub use error::{Result, WatcherError};
pub use event::{ChangeEvent, ChangeKind, EventBatch};
pub use signal::{EventSignal, Readiness};
pub use watcher::{WatchState, WatcherHandle, WatcherStats};
