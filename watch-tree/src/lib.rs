//! # Watch Tree
//!
//! Recursive directory watching built only from single-directory,
//! non-recursive watches. Every directory under the given roots gets its own
//! watch, directories created later are discovered from the notifications of
//! their parent, and raw notifications are turned into filtered
//! [`ChangeEvent`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DirectoryWatcher                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DirectoryEnumerator ──► WatchRegistry ──► WatchBackend         │
//! │          ▲                                      │               │
//! │          │ new directory                        ▼               │
//! │          └────────────── EventNormalizer ◄── RawNotification   │
//! │                                 │                               │
//! │                                 ▼                               │
//! │                  FilterOptions ─► ChangeEvent ─► callback       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Semantics
//!
//! - Creations and modifications are reported alike; removals never are.
//! - One logical change may produce several events. Nothing is debounced.
//! - Patterns match the bare entry name, not the full path.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use watch_tree::{DirectoryWatcher, FilterOptions};
//!
//! let mut watcher = DirectoryWatcher::new(
//!     ["src"],
//!     |event| println!("{}", event.filepath.display()),
//!     FilterOptions::compile(Some(r"\.rs$"), None, Some("^target$"))?,
//! )?;
//! watcher.start().await?;
//! // ...
//! watcher.dispose().await;
//! ```

pub mod backend;
pub mod config;
pub mod enumerator;
pub mod error;
pub mod event;
pub mod filter;
pub mod normalizer;
pub mod registry;
pub mod watcher;

pub use backend::{
    BackendEvent, BackendFactory, NotificationSink, NotifyBackend, RawNotification, WatchBackend,
};
pub use config::WatchConfig;
pub use enumerator::{DirectoryEnumerator, RootPath, validate_root};
pub use error::{ErrorHandler, Result, WatcherError};
pub use event::{ChangeEvent, ChangeHandler};
pub use filter::FilterOptions;
pub use normalizer::{Classification, EventNormalizer, Outcome};
pub use registry::{RegistryState, WatchRegistry, WatchedDirectory};
pub use watcher::{DirectoryWatcher, DirectoryWatcherBuilder, WatcherStats};
