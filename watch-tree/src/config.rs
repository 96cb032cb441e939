//! Configuration for a watch tree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};
use crate::filter::FilterOptions;

/// Roots and filter patterns for a watcher, as read from a file or flags.
///
/// Patterns are kept as strings here and compiled by
/// [`filter_options`](Self::filter_options).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Directories to watch recursively.
    pub roots: Vec<PathBuf>,

    /// Only files whose name matches this pattern are reported.
    pub filter: Option<String>,

    /// Files whose name matches this pattern are never reported.
    pub ignore_files: Option<String>,

    /// Directories whose name matches this pattern are not watched.
    pub ignore_directories: Option<String>,
}

impl WatchConfig {
    /// Create a config with no roots and no patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Set the inclusion filter.
    pub fn with_filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Set the file ignore pattern.
    pub fn with_ignore_files(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_files = Some(pattern.into());
        self
    }

    /// Set the directory ignore pattern.
    pub fn with_ignore_directories(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_directories = Some(pattern.into());
        self
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| WatcherError::Config(e.to_string()))
    }

    /// Load a config from a TOML file.
    ///
    /// Relative roots in the file are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            for root in &mut config.roots {
                if root.is_relative() {
                    *root = base.join(&*root);
                }
            }
        }

        Ok(config)
    }

    /// Overlay another config: its roots are appended and its patterns win.
    pub fn merge(mut self, other: WatchConfig) -> Self {
        self.roots.extend(other.roots);
        self.filter = other.filter.or(self.filter);
        self.ignore_files = other.ignore_files.or(self.ignore_files);
        self.ignore_directories = other.ignore_directories.or(self.ignore_directories);
        self
    }

    /// Compile the patterns.
    pub fn filter_options(&self) -> Result<FilterOptions> {
        FilterOptions::compile(
            self.filter.as_deref(),
            self.ignore_files.as_deref(),
            self.ignore_directories.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_config_builder() {
        let config = WatchConfig::new()
            .with_root("src")
            .with_filter(r"\.rs$")
            .with_ignore_directories("target");

        assert_eq!(config.roots, vec![PathBuf::from("src")]);
        assert_eq!(config.filter.as_deref(), Some(r"\.rs$"));
        assert_eq!(config.ignore_files, None);
        assert_eq!(config.ignore_directories.as_deref(), Some("target"));
    }

    #[test]
    fn test_config_from_toml() {
        let config = WatchConfig::from_toml_str(
            r#"
roots = ["src", "tests"]
ignore_files = '\.swp$'
ignore_directories = "^(target|\\.git)$"
"#,
        )
        .unwrap();

        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.filter, None);

        let options = config.filter_options().unwrap();
        assert!(!options.accepts_file("main.rs.swp"));
        assert!(!options.accepts_directory(".git"));
        assert!(options.accepts_directory("gitlab"));
    }

    #[test]
    fn test_config_rejects_unknown_keys() {
        let result = WatchConfig::from_toml_str("recursive = true");
        assert!(matches!(result, Err(WatcherError::Config(_))));
    }

    #[test]
    fn test_load_resolves_roots_against_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("watch.toml");
        std::fs::write(&path, "roots = [\"src\", \"/abs\"]\n").unwrap();

        let config = WatchConfig::load(&path).unwrap();

        assert_eq!(
            config.roots,
            vec![temp_dir.path().join("src"), PathBuf::from("/abs")]
        );
    }

    #[test]
    fn test_merge_prefers_overlay_patterns() {
        let base = WatchConfig::new()
            .with_root("a")
            .with_filter("base")
            .with_ignore_files("keep");
        let overlay = WatchConfig::new().with_root("b").with_filter("overlay");

        let merged = base.merge(overlay);

        assert_eq!(merged.roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert_eq!(merged.filter.as_deref(), Some("overlay"));
        assert_eq!(merged.ignore_files.as_deref(), Some("keep"));
    }
}
