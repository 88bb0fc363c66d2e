//! Keeps watch coverage in sync with a mutating tree.
//!
//! A single consumer loop reads raw records in arrival order, updates the
//! registry (re-walking new subtrees, prefix-removing dead ones, rewriting
//! paths across renames) and forwards a normalized event stream. The
//! on-disk shape can change between a record being issued and being
//! processed, so every decision is made against the registry plus a fresh
//! look at the filesystem, never against what the record implies alone.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use tracing::warn;

use super::error::WatchError;
use super::event::FsEvent;
use super::manager::WatchManager;
use super::notification::{NotificationService, RawEvent, RawEventKind};
use super::registry::WatchRegistry;
use super::walker::TreeWalker;

/// A buffered MOVED_OUT half, held until the next record decides whether
/// it was a rename (matching MOVED_IN cookie) or a departure.
struct PendingMove {
    cookie: u32,
    path: PathBuf,
    is_dir: bool,
}

pub struct WatchSyncer<S: NotificationService> {
    manager: WatchManager<S>,
    walker: TreeWalker,
    /// Canonical roots from startup, re-walked after a queue overflow.
    roots: Vec<PathBuf>,
    events: Sender<FsEvent>,
    pending_move: Option<PendingMove>,
}

impl<S: NotificationService> WatchSyncer<S> {
    pub fn new(
        manager: WatchManager<S>,
        walker: TreeWalker,
        roots: Vec<PathBuf>,
        events: Sender<FsEvent>,
    ) -> Self {
        Self {
            manager,
            walker,
            roots,
            events,
            pending_move: None,
        }
    }

    pub fn registry(&self) -> &WatchRegistry {
        self.manager.registry()
    }

    /// Consume batches until the shutdown flag is raised or the consumer
    /// drops its end of the event channel.
    ///
    /// The flag is checked between reads; a read already in flight
    /// completes (or is interrupted by the signal itself) before the loop
    /// observes the flag.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), WatchError> {
        crate::log_event!("syncer", "started", "{} directories covered", self.registry().len());
        while !shutdown.load(Ordering::SeqCst) {
            match self.poll() {
                Ok(()) => {}
                Err(WatchError::ChannelClosed) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Read one batch (blocking) and process it.
    pub fn poll(&mut self) -> Result<(), WatchError> {
        let batch = self.manager.read_events()?;
        self.process_batch(batch)
    }

    /// Release every watch and close the notification channel.
    pub fn shutdown(self) {
        self.manager.shutdown();
    }

    fn process_batch(&mut self, batch: Vec<RawEvent>) -> Result<(), WatchError> {
        for record in batch {
            self.process_record(record)?;
        }
        // The other half of a move never straddles a batch boundary.
        self.flush_pending_move()
    }

    fn process_record(&mut self, record: RawEvent) -> Result<(), WatchError> {
        if record.kind == RawEventKind::QueueOverflow {
            self.flush_pending_move()?;
            warn!("notification queue overflowed, rebuilding watch coverage");
            self.emit(FsEvent::ResyncRequired)?;
            return self.resync();
        }

        // A buffered half-move is resolved by the very next record: the
        // matching MOVED_IN completes a rename, anything else means the
        // subtree left coverage.
        let completes_move = record.kind == RawEventKind::MovedIn
            && record.cookie.is_some()
            && self
                .pending_move
                .as_ref()
                .is_some_and(|p| Some(p.cookie) == record.cookie);
        if !completes_move {
            self.flush_pending_move()?;
        }

        let Some(handle) = record.handle else {
            return Ok(());
        };
        let Some(entry) = self.manager.registry().find_by_handle(handle) else {
            // Removed earlier in this same batch.
            crate::debug_event!("syncer", "stale record", "{:?}", record.kind);
            return Ok(());
        };

        match record.kind {
            RawEventKind::ChildCreated => {
                let Some(name) = record.name else {
                    return Ok(());
                };
                let path = entry.path.join(name);
                if record.is_dir {
                    // Idempotent walk: also covers anything already created
                    // deeper inside before we got here.
                    if let Err(e) = self.walker.walk(&mut self.manager, &path) {
                        warn!("failed to extend coverage to {}: {e}", path.display());
                    }
                }
                self.emit(FsEvent::Created(path))?;
            }

            RawEventKind::ChildDeleted => {
                let Some(name) = record.name else {
                    return Ok(());
                };
                let path = entry.path.join(name);
                if record.is_dir {
                    if self.manager.registry().contains(&path) {
                        self.remove_subtree_emitting(&path)?;
                    }
                    // Otherwise its own SelfDeleted record was already
                    // processed, or its watch never existed.
                } else {
                    self.emit(FsEvent::Removed(path))?;
                }
            }

            RawEventKind::SelfDeleted => {
                self.remove_subtree_emitting(&entry.path)?;
            }

            RawEventKind::SelfMoved => {
                // An in-scope rename was already handled through the
                // parent's cookie pair, leaving the entry pointing at a
                // live directory. A path that no longer resolves means the
                // directory moved out of coverage for good.
                if !entry.path.is_dir() {
                    self.remove_subtree_emitting(&entry.path)?;
                }
            }

            RawEventKind::Modified => {
                let path = match record.name {
                    Some(name) => entry.path.join(name),
                    None => entry.path,
                };
                self.emit(FsEvent::Modified(path))?;
            }

            RawEventKind::MovedOut => {
                let Some(name) = record.name else {
                    return Ok(());
                };
                let path = entry.path.join(name);
                match record.cookie {
                    Some(cookie) => {
                        self.pending_move = Some(PendingMove {
                            cookie,
                            path,
                            is_dir: record.is_dir,
                        });
                    }
                    // No correlation possible; it left coverage.
                    None => self.remove_subtree_emitting(&path)?,
                }
            }

            RawEventKind::MovedIn => {
                let Some(name) = record.name else {
                    return Ok(());
                };
                let path = entry.path.join(name);
                if completes_move {
                    if let Some(pending) = self.pending_move.take() {
                        if pending.is_dir {
                            self.manager.rename_subtree(&pending.path, &path);
                        }
                        self.emit(FsEvent::Renamed {
                            from: pending.path,
                            to: path,
                        })?;
                    }
                } else {
                    // Moved in from outside any watched tree.
                    if record.is_dir {
                        if let Err(e) = self.walker.walk(&mut self.manager, &path) {
                            warn!("failed to extend coverage to {}: {e}", path.display());
                        }
                    }
                    self.emit(FsEvent::Created(path))?;
                }
            }

            RawEventKind::QueueOverflow => {}
        }

        Ok(())
    }

    fn flush_pending_move(&mut self) -> Result<(), WatchError> {
        let Some(pending) = self.pending_move.take() else {
            return Ok(());
        };
        crate::debug_event!("syncer", "unpaired move", "{}", pending.path.display());
        self.remove_subtree_emitting(&pending.path)
    }

    /// Remove everything at or below `path`, emitting `Removed` per entry.
    /// For a path with no registered entries (a plain file, or a directory
    /// whose watch never existed) a single `Removed` is emitted.
    fn remove_subtree_emitting(&mut self, path: &Path) -> Result<(), WatchError> {
        let removed = self.manager.remove_subtree(path);
        if removed.is_empty() {
            return self.emit(FsEvent::Removed(path.to_path_buf()));
        }
        for entry in removed {
            self.emit(FsEvent::Removed(entry.path))?;
        }
        Ok(())
    }

    /// Recover from lost events: re-walk every original root, then drop
    /// registry entries no longer backed by a real directory. Incremental
    /// patching cannot be trusted once the primitive has dropped records.
    fn resync(&mut self) -> Result<(), WatchError> {
        for root in self.roots.clone() {
            if let Err(e) = self.walker.rescan(&mut self.manager, &root) {
                warn!("resync walk of {} failed: {e}", root.display());
            }
        }

        let dead: Vec<PathBuf> = self
            .manager
            .registry()
            .entries()
            .filter(|entry| !entry.path.is_dir())
            .map(|entry| entry.path)
            .collect();
        for path in dead {
            // A parent earlier in the list may have taken this one with it.
            if self.manager.registry().contains(&path) {
                self.remove_subtree_emitting(&path)?;
            }
        }
        crate::log_event!("syncer", "resynced", "{} directories covered", self.registry().len());
        Ok(())
    }

    fn emit(&self, event: FsEvent) -> Result<(), WatchError> {
        self.events.send(event).map_err(|_| WatchError::ChannelClosed)
    }
}
