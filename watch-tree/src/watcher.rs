//! Recursive directory watcher built from single-directory watches.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::backend::{BackendEvent, BackendFactory, NotificationSink, NotifyBackend};
use crate::config::WatchConfig;
use crate::enumerator::{RootPath, validate_root};
use crate::error::{ErrorHandler, Result, WatcherError};
use crate::event::{ChangeEvent, ChangeHandler};
use crate::filter::FilterOptions;
use crate::normalizer::{EventNormalizer, Outcome};
use crate::registry::{RegistryState, WatchRegistry, WatchedDirectory};

/// Watches a set of root directories and every directory below them.
///
/// Construction validates the roots; nothing is watched until
/// [`start`](Self::start). Directories created later are picked up as their
/// creation is observed. Removals are never reported.
pub struct DirectoryWatcher {
    /// Validated roots.
    roots: Vec<RootPath>,

    /// Shared with the processing task.
    normalizer: Arc<EventNormalizer>,

    /// Live watches and lifecycle state.
    registry: Arc<WatchRegistry>,

    /// Consumer callback.
    on_change: ChangeHandler,

    /// Optional side channel for runtime errors.
    on_error: Option<ErrorHandler>,

    /// Opens the watch primitive on start.
    backend: BackendFactory,

    /// Task draining backend notifications.
    task: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    /// Create a watcher for the given roots.
    ///
    /// Fails with [`WatcherError::RootNotFound`] if any root does not exist.
    pub fn new<P, F>(
        roots: impl IntoIterator<Item = P>,
        on_change: F,
        options: FilterOptions,
    ) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        Self::builder()
            .roots(roots)
            .on_change(on_change)
            .options(options)
            .build()
    }

    /// Create a watcher from a config.
    pub fn from_config<F>(config: &WatchConfig, on_change: F) -> Result<Self>
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        Self::new(&config.roots, on_change, config.filter_options()?)
    }

    /// Start configuring a watcher.
    pub fn builder() -> DirectoryWatcherBuilder {
        DirectoryWatcherBuilder::new()
    }

    /// Open a watch on every directory under every root.
    ///
    /// Calling this again while running does nothing. A directory the backend
    /// refuses to watch is logged and reported to the error handler; the rest
    /// of the tree is still watched.
    pub async fn start(&mut self) -> Result<()> {
        match self.registry.state().await {
            RegistryState::Running => return Ok(()),
            RegistryState::Disposed => return Err(WatcherError::Disposed),
            RegistryState::Uninitialized => {}
        }

        let (sink, rx) = NotificationSink::channel();
        let backend = (self.backend)(sink)?;
        if !self.registry.activate(backend).await? {
            return Ok(());
        }

        self.task = Some(tokio::spawn(process_notifications(
            rx,
            self.normalizer.clone(),
            self.registry.clone(),
            self.on_change.clone(),
            self.on_error.clone(),
        )));

        for root in &self.roots {
            if self
                .normalizer
                .grow(&root.absolute, &self.registry, self.on_error.as_ref())
                .await
                .is_none()
            {
                warn!(
                    "Root disappeared before it could be watched: {}",
                    root.given.display()
                );
            }
        }

        info!(
            "Directory watcher started: {} roots, {} directories",
            self.roots.len(),
            self.registry.len().await
        );
        Ok(())
    }

    /// Close every watch.
    ///
    /// Once this returns the callback is never invoked again, even for
    /// notifications that were already in flight. Calling it more than once,
    /// or before [`start`](Self::start), is harmless.
    pub async fn dispose(&mut self) {
        self.registry.dispose_all().await;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        info!("Directory watcher disposed");
    }

    /// Check if the watcher is running.
    pub async fn is_running(&self) -> bool {
        self.registry.state().await == RegistryState::Running
    }

    /// The roots, as given.
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|r| r.given.as_path())
    }

    /// Absolute paths of every watched directory, sorted.
    pub async fn watched_directories(&self) -> Vec<PathBuf> {
        self.registry.watched_directories().await
    }

    /// Every watch with the instant it was opened, sorted by path.
    pub async fn watched(&self) -> Vec<WatchedDirectory> {
        self.registry.watched().await
    }

    /// Get statistics about the watcher.
    pub async fn stats(&self) -> WatcherStats {
        WatcherStats {
            roots: self.roots.len(),
            watched_directories: self.registry.len().await,
            state: self.registry.state().await,
        }
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn process_notifications(
    mut rx: mpsc::UnboundedReceiver<BackendEvent>,
    normalizer: Arc<EventNormalizer>,
    registry: Arc<WatchRegistry>,
    on_change: ChangeHandler,
    on_error: Option<ErrorHandler>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            BackendEvent::Changed(raw) => {
                let outcome = normalizer
                    .handle(&raw, &registry, &on_change, on_error.as_ref())
                    .await;
                trace!("{}: {outcome:?}", raw.full_path().display());
                if outcome == Outcome::Suppressed {
                    break;
                }
            }
            BackendEvent::Failed(e) => {
                let error = WatcherError::Backend(e);
                if let Some(on_error) = &on_error {
                    registry.while_running(|| on_error(&error)).await;
                }
            }
        }
    }
    debug!("Notification processing stopped");
}

/// Statistics about a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherStats {
    /// Number of roots.
    pub roots: usize,

    /// Number of watched directories, roots included.
    pub watched_directories: usize,

    /// Lifecycle state.
    pub state: RegistryState,
}

/// Builder for [`DirectoryWatcher`].
pub struct DirectoryWatcherBuilder {
    roots: Vec<PathBuf>,
    on_change: Option<ChangeHandler>,
    on_error: Option<ErrorHandler>,
    options: FilterOptions,
    backend: Option<BackendFactory>,
}

impl DirectoryWatcherBuilder {
    /// Create a builder with no roots.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            on_change: None,
            on_error: None,
            options: FilterOptions::default(),
            backend: None,
        }
    }

    /// Add a root directory.
    pub fn root(mut self, root: impl AsRef<Path>) -> Self {
        self.roots.push(root.as_ref().to_path_buf());
        self
    }

    /// Add several root directories.
    pub fn roots<P: AsRef<Path>>(mut self, roots: impl IntoIterator<Item = P>) -> Self {
        self.roots
            .extend(roots.into_iter().map(|r| r.as_ref().to_path_buf()));
        self
    }

    /// Set the change callback.
    pub fn on_change<F>(mut self, on_change: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(on_change));
        self
    }

    /// Set the callback for errors raised while watching.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&WatcherError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Set the filter patterns.
    pub fn options(mut self, options: FilterOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the watch primitive.
    pub fn backend(mut self, backend: BackendFactory) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Validate the roots and build the watcher.
    pub fn build(self) -> Result<DirectoryWatcher> {
        let on_change = self
            .on_change
            .ok_or_else(|| WatcherError::Config("a change handler is required".to_string()))?;

        let roots = self
            .roots
            .iter()
            .map(validate_root)
            .collect::<Result<Vec<_>>>()?;
        if roots.is_empty() {
            warn!("Directory watcher created without roots");
        }

        let filters = Arc::new(self.options);
        Ok(DirectoryWatcher {
            normalizer: Arc::new(EventNormalizer::new(roots.clone(), filters)),
            roots,
            registry: Arc::new(WatchRegistry::new()),
            on_change,
            on_error: self.on_error,
            backend: self.backend.unwrap_or_else(NotifyBackend::factory),
            task: None,
        })
    }
}

impl Default for DirectoryWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
