//! Error types for the watch tree.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for watch tree operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Side channel for errors raised while handling notifications.
pub type ErrorHandler = Arc<dyn Fn(&WatcherError) + Send + Sync>;

/// Errors that can occur in the watch tree.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// A root path does not exist.
    #[error("directory '{}' does not exist", .0.display())]
    RootNotFound(PathBuf),

    /// A root path exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A filter pattern failed to compile.
    #[error("invalid {field} pattern: {source}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex_lite::Error,
    },

    /// A notification named an entry that was gone by the time it was inspected.
    ///
    /// Never returned to callers; the notification is dropped.
    #[error("entry vanished before inspection: {}", .0.display())]
    TransientNotificationMismatch(PathBuf),

    /// The backend refused to watch a directory.
    #[error("failed to watch {}: {source}", path.display())]
    WatchRegistration {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The watch backend could not be created.
    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),

    /// The watcher was already disposed.
    #[error("watcher has been disposed")]
    Disposed,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
