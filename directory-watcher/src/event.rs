//! Change events produced by the watch loop.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use serde::{Deserialize, Serialize};

/// A normalized change inside the watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The kind of change.
    pub kind: ChangeKind,

    /// Path of the affected entry relative to the watched directory.
    /// Empty when the event concerns the directory itself.
    pub name: PathBuf,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(kind: ChangeKind, name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Whether this event concerns the watched directory itself.
    pub fn is_target(&self) -> bool {
        self.name.as_os_str().is_empty()
    }

    /// Translate a raw notify event into zero or more change events.
    ///
    /// Paths are made relative to whichever of `roots` prefixes them; the
    /// caller passes both the configured and the canonical directory because
    /// some backends report resolved paths.
    pub fn from_notify(event: &notify::Event, roots: &[&Path]) -> Vec<Self> {
        let name = |path: &Path| relative_name(path, roots);

        if let EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
            if let [from, to] = event.paths.as_slice() {
                return vec![
                    Self::new(ChangeKind::Deleted, name(from)),
                    Self::new(ChangeKind::Created, name(to)),
                ];
            }
        }

        event
            .paths
            .iter()
            .filter_map(|path| {
                ChangeKind::classify(event.kind, path).map(|kind| Self::new(kind, name(path)))
            })
            .collect()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_target() {
            write!(f, "{} .", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.name.display())
        }
    }
}

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entry was created (or renamed into place).
    Created,

    /// Entry contents or metadata changed.
    Modified,

    /// Entry was deleted (or renamed away).
    Deleted,
}

impl ChangeKind {
    /// Classify a raw notify kind for one of its paths. Access
    /// notifications carry no change and yield `None`.
    pub fn classify(kind: EventKind, path: &Path) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Modify(ModifyKind::Name(rename)) => Some(match rename {
                RenameMode::From => Self::Deleted,
                RenameMode::To => Self::Created,
                // Direction unknown: whatever is at the path now decides.
                _ if path.exists() => Self::Created,
                _ => Self::Deleted,
            }),
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => Some(Self::Modified),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "CREATE",
            Self::Modified => "MODIFY",
            Self::Deleted => "DELETE",
        };
        f.write_str(label)
    }
}

fn relative_name(path: &Path, roots: &[&Path]) -> PathBuf {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
        .to_path_buf()
}

/// Events delivered together in one wakeup of the notification loop.
#[derive(Debug, Clone)]
pub struct EventBatch {
    /// Events in this batch, in delivery order.
    pub events: Vec<ChangeEvent>,

    /// When the batch was received.
    pub received_at: DateTime<Utc>,

    /// The backend asked for a rescan (its queue overflowed).
    pub rescan: bool,
}

impl EventBatch {
    /// Create a new empty batch.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            received_at: Utc::now(),
            rescan: false,
        }
    }

    /// Translate and append a raw notify event.
    pub fn push_raw(&mut self, event: &notify::Event, roots: &[&Path]) {
        self.rescan |= event.need_rescan();
        self.events.extend(ChangeEvent::from_notify(event, roots));
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether the batch should wake waiters: it carries changes, or the
    /// backend lost track of them.
    pub fn needs_wakeup(&self) -> bool {
        self.rescan || !self.events.is_empty()
    }

    /// Get the number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether any event in the batch says the watched directory itself
    /// went away.
    pub fn target_removed(&self) -> bool {
        self.events
            .iter()
            .any(|e| e.is_target() && e.kind == ChangeKind::Deleted)
    }
}

impl Default for EventBatch {
    fn default() -> Self {
        Self::new()
    }
}
