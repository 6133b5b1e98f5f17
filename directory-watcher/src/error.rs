//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Watch target does not exist.
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Watch target exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The platform facility could not be initialized or the watch could
    /// not be registered.
    #[error("failed to register watch on {}: {reason}", path.display())]
    Registration { path: PathBuf, reason: String },

    /// The notification mechanism failed after the watch was running.
    #[error("platform error while watching: {0}")]
    PlatformIo(#[source] notify::Error),

    /// The watch loop has exited and no event is pending.
    #[error("watch loop has exited")]
    Closed,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl WatcherError {
    /// Whether this error came out of watch setup.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Self::DirectoryNotFound(_) | Self::NotADirectory(_) | Self::Registration { .. }
        )
    }
}
