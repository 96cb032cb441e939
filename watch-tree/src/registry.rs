//! The live set of per-directory watches.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::WatchBackend;
use crate::error::{Result, WatcherError};

/// Lifecycle of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// No backend yet.
    Uninitialized,

    /// Watches can be added.
    Running,

    /// Every watch was closed. Terminal.
    Disposed,
}

/// A directory currently under observation.
#[derive(Debug, Clone)]
pub struct WatchedDirectory {
    /// Absolute path of the directory.
    pub path: PathBuf,

    /// When the watch was opened.
    pub since: Instant,
}

struct RegistryInner {
    state: RegistryState,
    backend: Option<Box<dyn WatchBackend>>,
    watched: HashMap<PathBuf, WatchedDirectory>,
}

/// Owns the backend and every directory it watches.
///
/// The map and lifecycle state share one lock, so a watch added during
/// discovery can never race with disposal.
pub struct WatchRegistry {
    inner: Mutex<RegistryInner>,
}

impl WatchRegistry {
    /// Create an empty, uninitialized registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                state: RegistryState::Uninitialized,
                backend: None,
                watched: HashMap::new(),
            }),
        }
    }

    /// Install the backend and move to `Running`.
    ///
    /// Returns `false` without touching the backend if the registry already
    /// left `Uninitialized`.
    pub async fn activate(&self, backend: Box<dyn WatchBackend>) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            RegistryState::Uninitialized => {
                inner.backend = Some(backend);
                inner.state = RegistryState::Running;
                Ok(true)
            }
            RegistryState::Running => Ok(false),
            RegistryState::Disposed => Err(WatcherError::Disposed),
        }
    }

    /// Watch a directory. Idempotent per path.
    ///
    /// Returns `true` when a new watch was opened, `false` if the directory was
    /// already watched or the registry is not running.
    pub async fn watch(&self, dir: &Path) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.state != RegistryState::Running || inner.watched.contains_key(dir) {
            return Ok(false);
        }

        let Some(backend) = inner.backend.as_mut() else {
            return Ok(false);
        };
        backend
            .watch(dir)
            .map_err(|source| WatcherError::WatchRegistration {
                path: dir.to_path_buf(),
                source,
            })?;

        debug!("Started watching: {}", dir.display());
        inner.watched.insert(
            dir.to_path_buf(),
            WatchedDirectory {
                path: dir.to_path_buf(),
                since: Instant::now(),
            },
        );
        Ok(true)
    }

    /// Run `f` only while the registry is running.
    ///
    /// The registry stays locked for the duration of `f`, so a concurrent
    /// [`dispose_all`](Self::dispose_all) waits for it and nothing runs after
    /// disposal completes.
    pub async fn while_running<F: FnOnce()>(&self, f: F) -> bool {
        let inner = self.inner.lock().await;
        if inner.state != RegistryState::Running {
            return false;
        }
        f();
        true
    }

    /// Close every watch and move to `Disposed`.
    ///
    /// Safe to call in any state and any number of times.
    pub async fn dispose_all(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == RegistryState::Disposed {
            return;
        }

        let watched = std::mem::take(&mut inner.watched);
        if let Some(mut backend) = inner.backend.take() {
            for path in watched.keys() {
                if let Err(e) = backend.unwatch(path) {
                    warn!("Failed to unwatch {}: {e}", path.display());
                }
            }
            // Dropping the backend closes its handle and ends its wait.
            drop(backend);
        }

        inner.state = RegistryState::Disposed;
        info!("Closed {} directory watches", watched.len());
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> RegistryState {
        self.inner.lock().await.state
    }

    /// Whether a directory is watched.
    pub async fn is_watched(&self, dir: &Path) -> bool {
        self.inner.lock().await.watched.contains_key(dir)
    }

    /// Number of watched directories.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.watched.len()
    }

    /// Whether nothing is watched.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.watched.is_empty()
    }

    /// Snapshot of every watch, sorted by path.
    pub async fn watched(&self) -> Vec<WatchedDirectory> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<WatchedDirectory> = inner.watched.values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Sorted snapshot of the watched directories.
    pub async fn watched_directories(&self) -> Vec<PathBuf> {
        self.watched()
            .await
            .into_iter()
            .map(|entry| entry.path)
            .collect()
    }
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}
