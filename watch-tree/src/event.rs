//! Change events delivered to consumers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A file was created or modified.
///
/// Creation and modification are not distinguished, and a single write may
/// produce several events depending on the platform. Consumers that need one
/// event per logical change should debounce on their side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// File name suffix without the leading dot, empty if there is none.
    pub extension: String,

    /// Path of the file, starting with the root as it was given.
    pub filepath: PathBuf,
}

impl ChangeEvent {
    /// Create an event for a file path, deriving the extension from it.
    pub fn new(filepath: impl Into<PathBuf>) -> Self {
        let filepath = filepath.into();
        Self {
            extension: extension_of(&filepath),
            filepath,
        }
    }
}

/// Consumer callback invoked once per accepted event.
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}
