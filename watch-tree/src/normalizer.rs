//! Turns raw notifications into change events and grows the watch tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::backend::RawNotification;
use crate::enumerator::{DirectoryEnumerator, RootPath};
use crate::error::{ErrorHandler, WatcherError};
use crate::event::{ChangeEvent, ChangeHandler};
use crate::filter::FilterOptions;
use crate::registry::WatchRegistry;

/// What a raw notification refers to, after a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// An accepted file changed.
    File(ChangeEvent),

    /// An accepted directory appeared or changed.
    Directory(PathBuf),

    /// The entry's name is filtered out.
    Filtered,

    /// The entry no longer exists.
    Vanished,
}

/// What handling a notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event was delivered to the consumer.
    Delivered(ChangeEvent),

    /// The event was accepted but the watcher was disposed first.
    Suppressed,

    /// A directory was enumerated; `registered` new watches were opened.
    Discovered { registered: usize },

    /// Filtered by name.
    Filtered,

    /// The entry was gone before it could be inspected.
    Vanished,
}

/// Normalizes notifications for one watcher.
pub struct EventNormalizer {
    roots: Vec<RootPath>,
    filters: Arc<FilterOptions>,
    enumerator: DirectoryEnumerator,
}

impl EventNormalizer {
    /// Create a normalizer for a set of validated roots.
    pub fn new(roots: Vec<RootPath>, filters: Arc<FilterOptions>) -> Self {
        Self {
            enumerator: DirectoryEnumerator::new(filters.clone()),
            roots,
            filters,
        }
    }

    /// Decide what a notification refers to.
    ///
    /// The notification carries no type information, so this stats the entry.
    /// Deleted entries fail the lookup and classify as [`Classification::Vanished`].
    /// Symbolic links are not followed, so a link to a directory is treated as
    /// a plain entry, the same as during enumeration.
    pub async fn classify(&self, raw: &RawNotification) -> Classification {
        let full_path = raw.full_path();
        let name = raw.name.to_string_lossy();

        let metadata = match tokio::fs::symlink_metadata(&full_path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                let mismatch = WatcherError::TransientNotificationMismatch(full_path);
                trace!("{mismatch}");
                return Classification::Vanished;
            }
        };

        if metadata.is_dir() {
            if self.filters.accepts_directory(&name) {
                Classification::Directory(full_path)
            } else {
                Classification::Filtered
            }
        } else if self.filters.accepts_file(&name) {
            Classification::File(ChangeEvent::new(self.report_path(&full_path)))
        } else {
            Classification::Filtered
        }
    }

    /// Handle one notification end to end.
    ///
    /// Accepted files go to `on_change` unless the registry has been disposed.
    /// Accepted directories are enumerated in full and every directory found is
    /// registered, so subdirectories created in the same burst are not missed.
    pub async fn handle(
        &self,
        raw: &RawNotification,
        registry: &WatchRegistry,
        on_change: &ChangeHandler,
        on_error: Option<&ErrorHandler>,
    ) -> Outcome {
        match self.classify(raw).await {
            Classification::File(event) => {
                let delivered = event.clone();
                if registry.while_running(|| on_change(event)).await {
                    Outcome::Delivered(delivered)
                } else {
                    Outcome::Suppressed
                }
            }
            Classification::Directory(dir) => {
                match self.grow(&dir, registry, on_error).await {
                    Some(registered) => Outcome::Discovered { registered },
                    None => Outcome::Vanished,
                }
            }
            Classification::Filtered => Outcome::Filtered,
            Classification::Vanished => Outcome::Vanished,
        }
    }

    /// Enumerate a directory and watch everything under it.
    ///
    /// Returns the number of new watches, or `None` if the directory vanished.
    pub async fn grow(
        &self,
        dir: &Path,
        registry: &WatchRegistry,
        on_error: Option<&ErrorHandler>,
    ) -> Option<usize> {
        let enumerator = self.enumerator.clone();
        let start = dir.to_path_buf();
        let found = match tokio::task::spawn_blocking(move || enumerator.enumerate(&start)).await
        {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                trace!("Directory gone before enumeration: {e}");
                return None;
            }
            Err(e) => {
                warn!("Enumeration of {} did not complete: {e}", dir.display());
                return None;
            }
        };

        let mut registered = 0;
        for path in &found {
            match registry.watch(path).await {
                Ok(true) => registered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("{e}");
                    if let Some(on_error) = on_error {
                        on_error(&e);
                    }
                }
            }
        }

        if registered > 0 {
            debug!(
                "Watching {registered} new directories under {}",
                dir.display()
            );
        }
        Some(registered)
    }

    /// Express an absolute path relative to the root it belongs to.
    ///
    /// Nested roots resolve to the innermost one.
    fn report_path(&self, full_path: &Path) -> PathBuf {
        self.roots
            .iter()
            .filter(|root| full_path.starts_with(&root.absolute))
            .max_by_key(|root| root.absolute.components().count())
            .and_then(|root| root.relativize(full_path))
            .unwrap_or_else(|| full_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerator::validate_root;
    use crate::registry::tests::RecordingBackend;
    use pretty_assertions::assert_eq;
    use regex_lite::Regex;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        root: RootPath,
        normalizer: EventNormalizer,
        registry: WatchRegistry,
        backend: RecordingBackend,
        events: Arc<Mutex<Vec<ChangeEvent>>>,
        on_change: ChangeHandler,
    }

    async fn fixture(filters: FilterOptions) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let root = validate_root(temp_dir.path()).unwrap();
        let normalizer = EventNormalizer::new(vec![root.clone()], Arc::new(filters));

        let backend = RecordingBackend::default();
        let registry = WatchRegistry::new();
        registry.activate(Box::new(backend.clone())).await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let on_change: ChangeHandler =
            Arc::new(move |e: ChangeEvent| sink.lock().unwrap().push(e));

        Fixture {
            _temp_dir: temp_dir,
            root,
            normalizer,
            registry,
            backend,
            events,
            on_change,
        }
    }

    impl Fixture {
        async fn handle(&self, dir: &Path, name: &str) -> Outcome {
            let raw = RawNotification::new(dir, name);
            self.normalizer
                .handle(&raw, &self.registry, &self.on_change, None)
                .await
        }
    }

    #[tokio::test]
    async fn test_file_notification_emits_event() {
        let f = fixture(FilterOptions::new()).await;
        fs::write(f.root.absolute.join("file.txt"), "foo").unwrap();

        let outcome = f.handle(&f.root.absolute, "file.txt").await;

        let expected = ChangeEvent {
            extension: "txt".to_string(),
            filepath: f.root.given.join("file.txt"),
        };
        assert_eq!(outcome, Outcome::Delivered(expected.clone()));
        assert_eq!(*f.events.lock().unwrap(), vec![expected]);
    }

    #[tokio::test]
    async fn test_repeated_notifications_are_not_coalesced() {
        let f = fixture(FilterOptions::new()).await;
        fs::write(f.root.absolute.join("file.txt"), "foo").unwrap();

        f.handle(&f.root.absolute, "file.txt").await;
        f.handle(&f.root.absolute, "file.txt").await;

        assert_eq!(f.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_vanished_entry_is_dropped() {
        let f = fixture(FilterOptions::new()).await;

        let outcome = f.handle(&f.root.absolute, "deleted.txt").await;

        assert_eq!(outcome, Outcome::Vanished);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filtered_file_is_dropped() {
        let filters = FilterOptions::new().with_filter(Regex::new(r"\.include$").unwrap());
        let f = fixture(filters).await;
        fs::write(f.root.absolute.join("test.exclude"), "bar").unwrap();

        let outcome = f.handle(&f.root.absolute, "test.exclude").await;

        assert_eq!(outcome, Outcome::Filtered);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_directory_is_watched_with_its_subtree() {
        let f = fixture(FilterOptions::new()).await;
        let dir = f.root.absolute.join("a");
        fs::create_dir_all(dir.join("b/c")).unwrap();

        let outcome = f.handle(&f.root.absolute, "a").await;

        assert_eq!(outcome, Outcome::Discovered { registered: 3 });
        assert_eq!(
            f.registry.watched_directories().await,
            vec![dir.clone(), dir.join("b"), dir.join("b/c")]
        );
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_known_directory_registers_nothing_new() {
        let f = fixture(FilterOptions::new()).await;
        fs::create_dir(f.root.absolute.join("a")).unwrap();

        f.handle(&f.root.absolute, "a").await;
        let outcome = f.handle(&f.root.absolute, "a").await;

        assert_eq!(outcome, Outcome::Discovered { registered: 0 });
        assert_eq!(f.backend.watched.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignored_directory_is_not_watched() {
        let filters = FilterOptions::new().with_ignore_directories(Regex::new("exclude").unwrap());
        let f = fixture(filters).await;
        fs::create_dir(f.root.absolute.join("exclude")).unwrap();

        let outcome = f.handle(&f.root.absolute, "exclude").await;

        assert_eq!(outcome, Outcome::Filtered);
        assert!(f.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_refused_directory_goes_to_error_handler() {
        let f = fixture(FilterOptions::new()).await;
        let locked = f.root.absolute.join("locked");
        fs::create_dir_all(locked.join("inner")).unwrap();
        f.backend.refuse.lock().unwrap().push(locked.clone());

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let on_error: ErrorHandler =
            Arc::new(move |e: &WatcherError| sink.lock().unwrap().push(e.to_string()));

        let raw = RawNotification::new(&f.root.absolute, "locked");
        let outcome = f
            .normalizer
            .handle(&raw, &f.registry, &f.on_change, Some(&on_error))
            .await;

        // The refused directory is skipped but its child is still watched.
        assert_eq!(outcome, Outcome::Discovered { registered: 1 });
        assert!(f.registry.is_watched(&locked.join("inner")).await);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_symlink_is_not_followed() {
        let f = fixture(FilterOptions::new()).await;
        let outside = TempDir::new().unwrap();
        fs::create_dir_all(outside.path().join("x/y")).unwrap();
        f.registry.watch(&f.root.absolute).await.unwrap();

        std::os::unix::fs::symlink(outside.path(), f.root.absolute.join("late")).unwrap();
        let outcome = f.handle(&f.root.absolute, "late").await;

        // The link itself is reported like any other file entry.
        assert_eq!(
            outcome,
            Outcome::Delivered(ChangeEvent::new(f.root.given.join("late")))
        );
        assert_eq!(
            f.registry.watched_directories().await,
            vec![f.root.absolute.clone()]
        );
    }

    #[tokio::test]
    async fn test_disposed_registry_suppresses_delivery() {
        let f = fixture(FilterOptions::new()).await;
        fs::write(f.root.absolute.join("late.txt"), "foo").unwrap();
        f.registry.dispose_all().await;

        let outcome = f.handle(&f.root.absolute, "late.txt").await;

        assert_eq!(outcome, Outcome::Suppressed);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_report_path_prefers_innermost_root() {
        let outer = RootPath {
            given: PathBuf::from("project"),
            absolute: PathBuf::from("/work/project"),
        };
        let inner = RootPath {
            given: PathBuf::from("../vendor"),
            absolute: PathBuf::from("/work/project/vendor"),
        };
        let normalizer = EventNormalizer::new(vec![outer, inner], Arc::new(FilterOptions::new()));

        assert_eq!(
            normalizer.report_path(Path::new("/work/project/vendor/lib.rs")),
            PathBuf::from("../vendor/lib.rs")
        );
        assert_eq!(
            normalizer.report_path(Path::new("/work/project/main.rs")),
            PathBuf::from("project/main.rs")
        );
    }
}
