//! Recursive directory-tree watching over plain inotify.
//!
//! inotify watches a single directory, non-recursively. This crate keeps a
//! deduplicated set of per-directory watches covering whole trees, extends
//! and shrinks that set as the trees mutate, and emits one normalized
//! change stream.

pub mod config;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use watcher::{
    FsEvent, InotifyService, NotificationService, TreeWalker, WatchError, WatchManager,
    WatchRegistry, WatchSyncer,
};
