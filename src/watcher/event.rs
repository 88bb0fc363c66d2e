//! Normalized events emitted to downstream consumers.

use std::path::PathBuf;

/// A change observed somewhere under the watched roots.
///
/// Paths are canonical for directories the watch set tracks; for plain
/// files they are the tracked parent directory joined with the child name
/// the notification carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// A file or directory appeared.
    Created(PathBuf),
    /// File contents changed.
    Modified(PathBuf),
    /// A file or directory went away (deleted or moved out of coverage).
    Removed(PathBuf),
    /// A directory or file was renamed within the watched trees.
    Renamed { from: PathBuf, to: PathBuf },
    /// The notification queue overflowed; events were lost and the watch
    /// set has been rebuilt from disk. Consumers holding derived state
    /// should rescan.
    ResyncRequired,
}

impl FsEvent {
    /// The path this event refers to, if it refers to one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Removed(p) => Some(p),
            Self::Renamed { to, .. } => Some(to),
            Self::ResyncRequired => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed(_))
    }
}
