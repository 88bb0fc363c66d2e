//! Production [`NotificationService`] backed by the kernel inotify queue.
//!
//! The adapter owns the inotify instance, allocates sequential
//! [`WatchHandle`]s, and keeps both directions of the handle to
//! descriptor mapping. Records for descriptors it no longer knows (queued
//! before a `remove_watch`) are dropped here rather than surfaced.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use tracing::trace;

use super::error::WatchError;
use super::notification::{NotificationService, RawEvent, RawEventKind, WatchHandle};

const EVENT_BUFFER_SIZE: usize = 4096;

pub struct InotifyService {
    inotify: Inotify,
    buffer: Vec<u8>,
    handles: HashMap<WatchHandle, WatchDescriptor>,
    descriptors: HashMap<WatchDescriptor, WatchHandle>,
    next_handle: u64,
}

impl InotifyService {
    pub fn new() -> Result<Self, WatchError> {
        let inotify = Inotify::init().map_err(|e| WatchError::InitFailed {
            reason: e.to_string(),
        })?;

        Ok(Self {
            inotify,
            buffer: vec![0u8; EVENT_BUFFER_SIZE],
            handles: HashMap::new(),
            descriptors: HashMap::new(),
            next_handle: 1,
        })
    }

    fn watch_mask() -> WatchMask {
        WatchMask::CREATE
            | WatchMask::DELETE
            | WatchMask::DELETE_SELF
            | WatchMask::MODIFY
            | WatchMask::MOVE_SELF
            | WatchMask::MOVED_FROM
            | WatchMask::MOVED_TO
            | WatchMask::EXCL_UNLINK
    }
}

impl NotificationService for InotifyService {
    fn add_watch(&mut self, path: &Path) -> Result<WatchHandle, WatchError> {
        let wd = self
            .inotify
            .watches()
            .add(path, Self::watch_mask())
            .map_err(|e| WatchError::WatchUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        // Two canonical paths can reach one inode (bind mounts); the kernel
        // then hands back the descriptor it already issued.
        if let Some(&handle) = self.descriptors.get(&wd) {
            return Ok(handle);
        }

        let handle = WatchHandle(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(handle, wd.clone());
        self.descriptors.insert(wd, handle);
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> Result<(), WatchError> {
        let Some(wd) = self.handles.remove(&handle) else {
            return Ok(());
        };
        self.descriptors.remove(&wd);
        self.inotify.watches().remove(wd).map_err(WatchError::Io)
    }

    fn read(&mut self) -> Result<Vec<RawEvent>, WatchError> {
        let events = match self.inotify.read_events_blocking(&mut self.buffer) {
            Ok(events) => events,
            // Signal delivery; let the caller re-check its shutdown flag.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(WatchError::Io(e)),
        };

        let mut batch = Vec::new();
        for event in events {
            if event.mask.contains(EventMask::Q_OVERFLOW) {
                batch.push(RawEvent {
                    handle: None,
                    kind: RawEventKind::QueueOverflow,
                    name: None,
                    cookie: None,
                    is_dir: false,
                });
                continue;
            }
            if event.mask.contains(EventMask::IGNORED) {
                continue;
            }
            let Some(kind) = kind_for(event.mask) else {
                trace!("unhandled inotify mask {:?}", event.mask);
                continue;
            };
            let Some(&handle) = self.descriptors.get(&event.wd) else {
                trace!("record for released descriptor, dropping");
                continue;
            };
            batch.push(RawEvent {
                handle: Some(handle),
                kind,
                name: event.name.map(|n| n.to_os_string()),
                cookie: (event.cookie != 0).then_some(event.cookie),
                is_dir: event.mask.contains(EventMask::ISDIR),
            });
        }
        Ok(batch)
    }

    fn close(self) -> Result<(), WatchError> {
        self.inotify.close().map_err(WatchError::Io)
    }
}

fn kind_for(mask: EventMask) -> Option<RawEventKind> {
    if mask.contains(EventMask::CREATE) {
        Some(RawEventKind::ChildCreated)
    } else if mask.contains(EventMask::DELETE) {
        Some(RawEventKind::ChildDeleted)
    } else if mask.contains(EventMask::DELETE_SELF) || mask.contains(EventMask::UNMOUNT) {
        Some(RawEventKind::SelfDeleted)
    } else if mask.contains(EventMask::MODIFY) {
        Some(RawEventKind::Modified)
    } else if mask.contains(EventMask::MOVED_FROM) {
        Some(RawEventKind::MovedOut)
    } else if mask.contains(EventMask::MOVED_TO) {
        Some(RawEventKind::MovedIn)
    } else if mask.contains(EventMask::MOVE_SELF) {
        Some(RawEventKind::SelfMoved)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn add_watch_and_observe_creation() {
        let dir = TempDir::new().unwrap();
        let mut service = InotifyService::new().unwrap();
        let handle = service.add_watch(dir.path()).unwrap();

        fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let batch = service.read().unwrap();
        let created = batch
            .iter()
            .find(|r| r.kind == RawEventKind::ChildCreated)
            .expect("creation record");
        assert_eq!(created.handle, Some(handle));
        assert_eq!(created.name.as_deref(), Some("a.txt".as_ref()));
        assert!(!created.is_dir);
    }

    #[test]
    fn directory_creation_is_flagged() {
        let dir = TempDir::new().unwrap();
        let mut service = InotifyService::new().unwrap();
        service.add_watch(dir.path()).unwrap();

        fs::create_dir(dir.path().join("sub")).unwrap();

        let batch = service.read().unwrap();
        let created = batch
            .iter()
            .find(|r| r.kind == RawEventKind::ChildCreated)
            .expect("creation record");
        assert!(created.is_dir);
    }

    #[test]
    fn removed_watch_yields_no_records() {
        let dir = TempDir::new().unwrap();
        let mut service = InotifyService::new().unwrap();
        let handle = service.add_watch(dir.path()).unwrap();
        service.remove_watch(handle).unwrap();

        // Only the kernel's release acknowledgment is queued, which the
        // adapter consumes silently.
        let batch = service.read().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn double_removal_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut service = InotifyService::new().unwrap();
        let handle = service.add_watch(dir.path()).unwrap();
        service.remove_watch(handle).unwrap();
        assert!(service.remove_watch(handle).is_ok());
    }
}
