//! Directory discovery for building the watch tree.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use path_absolutize::Absolutize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, WatcherError};
use crate::filter::FilterOptions;

/// A validated root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPath {
    /// The path as the caller supplied it, lexically normalized. Event paths
    /// are reported relative to this.
    pub given: PathBuf,

    /// The normalized absolute form used for watching.
    pub absolute: PathBuf,
}

impl RootPath {
    /// Rewrite an absolute path under this root so it starts with the root as given.
    ///
    /// Returns `None` for paths outside the root.
    pub fn relativize(&self, path: &Path) -> Option<PathBuf> {
        let rest = path.strip_prefix(&self.absolute).ok()?;
        if rest.as_os_str().is_empty() {
            Some(self.given.clone())
        } else if self.given == Path::new(".") {
            Some(rest.to_path_buf())
        } else {
            Some(self.given.join(rest))
        }
    }
}

/// Drop `.` components and resolve `..` against preceding names without
/// touching the filesystem. A path that reduces to nothing becomes `.`.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

/// Check that a root exists and is a directory.
///
/// This is the only place existence is validated; it runs at construction so
/// a bad root fails before anything is watched.
pub fn validate_root(path: impl AsRef<Path>) -> Result<RootPath> {
    let given = path.as_ref().to_path_buf();

    let metadata = match std::fs::metadata(&given) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WatcherError::RootNotFound(given));
        }
        Err(e) => return Err(WatcherError::Io(e)),
    };

    if !metadata.is_dir() {
        return Err(WatcherError::NotADirectory(given));
    }

    let absolute = given.absolutize()?.into_owned();
    Ok(RootPath {
        given: normalize_lexically(&given),
        absolute,
    })
}

/// Walks a directory and collects every subdirectory that should be watched.
#[derive(Debug, Clone)]
pub struct DirectoryEnumerator {
    filters: Arc<FilterOptions>,
}

impl DirectoryEnumerator {
    /// Create an enumerator that prunes with the given filters.
    pub fn new(filters: Arc<FilterOptions>) -> Self {
        Self { filters }
    }

    /// Collect `dir` and all non-ignored directories below it.
    ///
    /// `dir` itself is always included, whatever its name. Files are skipped;
    /// they only become known through notifications. Symbolic links are not
    /// followed.
    pub fn enumerate(&self, dir: &Path) -> Result<BTreeSet<PathBuf>> {
        if !dir.is_dir() {
            return Err(WatcherError::RootNotFound(dir.to_path_buf()));
        }

        let mut found = BTreeSet::new();
        let walker = WalkDir::new(dir).follow_links(false).into_iter();

        for entry in walker.filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || self
                    .filters
                    .accepts_directory(&e.file_name().to_string_lossy())
        }) {
            match entry {
                Ok(entry) if entry.file_type().is_dir() => {
                    found.insert(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => {
                    // Unreadable or vanished subtree; keep what we can reach.
                    warn!("Skipping entry while enumerating {}: {e}", dir.display());
                }
            }
        }

        debug!("Enumerated {} directories under {}", found.len(), dir.display());
        Ok(found)
    }
}
