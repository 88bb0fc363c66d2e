//! Contract between the watch set and the notification primitive.
//!
//! The primitive watches one directory at a time, non-recursively, and
//! hands back opaque handles. Everything above this seam is backend
//! agnostic; the production backend lives in [`super::inotify`].

use std::ffi::OsString;
use std::path::Path;

use super::error::WatchError;

/// Opaque identifier for one registered directory watch.
///
/// Allocated by the notification service and released exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(pub(crate) u64);

/// Kind of a raw notification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// An entry appeared inside the watched directory.
    ChildCreated,
    /// An entry inside the watched directory was deleted.
    ChildDeleted,
    /// The watched directory itself was deleted.
    SelfDeleted,
    /// File contents changed inside the watched directory.
    Modified,
    /// The watched directory itself was moved.
    SelfMoved,
    /// An entry was moved into the watched directory.
    MovedIn,
    /// An entry was moved out of the watched directory.
    MovedOut,
    /// The primitive dropped events; coverage can no longer be trusted.
    QueueOverflow,
}

/// One record read from the notification primitive.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Watch the record was issued against. Overflow records carry none.
    pub handle: Option<WatchHandle>,
    pub kind: RawEventKind,
    /// Child name, for records about a directory member.
    pub name: Option<OsString>,
    /// Correlates the two halves of a single move.
    pub cookie: Option<u32>,
    /// Whether the subject of the record is a directory.
    pub is_dir: bool,
}

/// Per-directory, non-recursive watch primitive.
///
/// `read` blocks until at least one record is queued. Implementations may
/// return an empty batch when the wait was interrupted by a signal, so the
/// caller can re-check its shutdown condition before blocking again.
pub trait NotificationService {
    fn add_watch(&mut self, path: &Path) -> Result<WatchHandle, WatchError>;

    /// Failure to release is reported but callers treat it as non-fatal.
    fn remove_watch(&mut self, handle: WatchHandle) -> Result<(), WatchError>;

    fn read(&mut self) -> Result<Vec<RawEvent>, WatchError>;

    fn close(self) -> Result<(), WatchError>;
}
