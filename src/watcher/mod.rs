//! Watch-set management for recursive directory monitoring.
//!
//! inotify watches one directory at a time; this module keeps a whole
//! mutating tree covered through a single channel.
//!
//! # Architecture
//!
//! ```text
//! WatchSyncer (consumer loop)
//!   - reads raw records from the NotificationService
//!   - re-walks created subtrees (TreeWalker)
//!   - prefix-removes deleted ones, rewrites paths across renames
//!   - emits normalized FsEvents downstream
//!         |
//! WatchManager
//!   - owns the NotificationService + WatchRegistry
//!   - registration is idempotent by canonical path
//!   - releases every handle exactly once at shutdown
//! ```

mod error;
mod event;
mod inotify;
mod manager;
mod notification;
mod registry;
mod syncer;
mod walker;

pub use error::WatchError;
pub use event::FsEvent;
pub use inotify::InotifyService;
pub use manager::WatchManager;
pub use notification::{NotificationService, RawEvent, RawEventKind, WatchHandle};
pub use registry::{WatchEntry, WatchRegistry};
pub use syncer::WatchSyncer;
pub use walker::{DEFAULT_MAX_DEPTH, TreeWalker};
