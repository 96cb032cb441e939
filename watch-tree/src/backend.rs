//! The single-directory watch primitive the tree is built from.
//!
//! A backend watches individual directories non-recursively and reports
//! `(directory, entry name)` pairs. It carries no information about what kind
//! of change happened or whether the entry is a file or a directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::error::Result;

/// Something changed for `name` inside `directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    /// The watched directory the notification came from.
    pub directory: PathBuf,

    /// Name of the changed entry within `directory`.
    pub name: OsString,
}

impl RawNotification {
    /// Create a notification for an entry in a directory.
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<OsString>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// Split a full path into its parent directory and entry name.
    pub fn from_path(path: &Path) -> Option<Self> {
        Some(Self::new(path.parent()?, path.file_name()?))
    }

    /// The full path of the changed entry.
    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }
}

/// What a backend reports to the tree.
#[derive(Debug)]
pub enum BackendEvent {
    /// An entry changed.
    Changed(RawNotification),

    /// The backend hit an error while waiting for changes.
    Failed(notify::Error),
}

/// Delivery end handed to a backend when it is opened.
///
/// Sending never blocks, so it is safe from the backend's own threads.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<BackendEvent>,
}

impl NotificationSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a change. Returns `false` once the receiving side is gone.
    pub fn notify(&self, notification: RawNotification) -> bool {
        self.tx.send(BackendEvent::Changed(notification)).is_ok()
    }

    /// Report a backend failure. Returns `false` once the receiving side is gone.
    pub fn fail(&self, error: notify::Error) -> bool {
        self.tx.send(BackendEvent::Failed(error)).is_ok()
    }
}

/// A primitive that watches one directory at a time, non-recursively.
///
/// Dropping the backend must release every OS handle it holds and stop any
/// thread it uses to wait for events.
pub trait WatchBackend: Send {
    /// Start watching a single directory.
    fn watch(&mut self, dir: &Path) -> std::result::Result<(), notify::Error>;

    /// Stop watching a single directory.
    fn unwatch(&mut self, dir: &Path) -> std::result::Result<(), notify::Error>;
}

/// Opens a backend that reports into the given sink.
pub type BackendFactory =
    Box<dyn Fn(NotificationSink) -> Result<Box<dyn WatchBackend>> + Send + Sync>;

/// Backend built on the platform's recommended `notify` watcher.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Open the platform watcher.
    pub fn open(sink: NotificationSink) -> Result<Self> {
        let watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    // Reads and closes are not changes.
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }

                    for path in &event.paths {
                        let Some(notification) = RawNotification::from_path(path) else {
                            continue;
                        };
                        if !sink.notify(notification) {
                            trace!("Notification receiver closed, dropping {}", path.display());
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("Watch error: {e}");
                    sink.fail(e);
                }
            },
        )?;

        Ok(Self { watcher })
    }

    /// Factory that opens a [`NotifyBackend`].
    pub fn factory() -> BackendFactory {
        Box::new(|sink: NotificationSink| Ok(Box::new(Self::open(sink)?) as Box<dyn WatchBackend>))
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&mut self, dir: &Path) -> std::result::Result<(), notify::Error> {
        self.watcher.watch(dir, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, dir: &Path) -> std::result::Result<(), notify::Error> {
        self.watcher.unwatch(dir)
    }
}
