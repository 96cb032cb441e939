//! Name-based filtering of files and directories.
//!
//! Patterns are tested against the bare entry name, never the full path,
//! because a notification only carries the name of the entry that changed
//! inside its parent directory.

use regex_lite::Regex;

use crate::error::{Result, WatcherError};

/// Precompiled filter patterns, fixed for the lifetime of a watcher.
///
/// An absent pattern places no constraint.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Only files whose name matches are reported.
    pub filter: Option<Regex>,

    /// Files whose name matches are never reported.
    pub ignore_files: Option<Regex>,

    /// Directories whose name matches are neither watched nor descended into.
    pub ignore_directories: Option<Regex>,
}

impl FilterOptions {
    /// Create options with no constraints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile options from optional pattern strings.
    pub fn compile(
        filter: Option<&str>,
        ignore_files: Option<&str>,
        ignore_directories: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            filter: compile_pattern("filter", filter)?,
            ignore_files: compile_pattern("ignore_files", ignore_files)?,
            ignore_directories: compile_pattern("ignore_directories", ignore_directories)?,
        })
    }

    /// Set the inclusion filter.
    pub fn with_filter(mut self, pattern: Regex) -> Self {
        self.filter = Some(pattern);
        self
    }

    /// Set the file ignore pattern.
    pub fn with_ignore_files(mut self, pattern: Regex) -> Self {
        self.ignore_files = Some(pattern);
        self
    }

    /// Set the directory ignore pattern.
    pub fn with_ignore_directories(mut self, pattern: Regex) -> Self {
        self.ignore_directories = Some(pattern);
        self
    }

    /// Whether a file with this name should produce an event.
    pub fn accepts_file(&self, name: &str) -> bool {
        self.filter.as_ref().is_none_or(|re| re.is_match(name))
            && !self.ignore_files.as_ref().is_some_and(|re| re.is_match(name))
    }

    /// Whether a directory with this name should be watched and descended into.
    pub fn accepts_directory(&self, name: &str) -> bool {
        !self
            .ignore_directories
            .as_ref()
            .is_some_and(|re| re.is_match(name))
    }
}

fn compile_pattern(field: &'static str, pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .map(|p| Regex::new(p).map_err(|source| WatcherError::InvalidPattern { field, source }))
        .transpose()
}
