//! Owner of the notification service and the watch registry.
//!
//! Construction and shutdown are explicit; the walker and syncer borrow
//! the manager rather than touching any ambient state.

use std::path::Path;

use tracing::warn;

use super::error::WatchError;
use super::notification::{NotificationService, RawEvent};
use super::registry::{WatchEntry, WatchRegistry};

pub struct WatchManager<S: NotificationService> {
    service: S,
    registry: WatchRegistry,
}

impl<S: NotificationService> WatchManager<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            registry: WatchRegistry::new(),
        }
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Register a watch on an already-canonicalized directory path.
    ///
    /// Idempotent: a path that is already covered returns its existing
    /// entry untouched. When the service hands back a handle it already
    /// issued (two canonical paths reaching one inode), the existing entry
    /// wins and no second entry is created.
    pub fn register(&mut self, path: &Path) -> Result<WatchEntry, WatchError> {
        if let Some(existing) = self.registry.find_by_path(path) {
            return Ok(existing);
        }

        let handle = self.service.add_watch(path)?;
        if let Some(existing) = self.registry.find_by_handle(handle) {
            crate::debug_event!(
                "registry",
                "aliased watch",
                "{} already covers {}",
                existing.path.display(),
                path.display()
            );
            return Ok(existing);
        }

        let entry = WatchEntry {
            handle,
            path: path.to_path_buf(),
        };
        self.registry.insert(entry.clone());
        Ok(entry)
    }

    /// Remove every entry at or below `prefix`, releasing each OS watch.
    ///
    /// A failed release is logged and does not keep the entry alive; the
    /// registry must not track watches it cannot reason about. Returns the
    /// removed entries, parents first.
    pub fn remove_subtree(&mut self, prefix: &Path) -> Vec<WatchEntry> {
        let victims = self.registry.find_by_prefix(prefix);
        for entry in &victims {
            if let Err(e) = self.service.remove_watch(entry.handle) {
                warn!("failed to release watch on {}: {e}", entry.path.display());
            }
            self.registry.remove(entry.handle);
        }
        victims
    }

    /// Rewrite every entry under `old` to live under `new`, keeping watch
    /// handles. The OS watches follow the inodes across a rename, so there
    /// is no release/re-add window during which changes would be missed.
    pub fn rename_subtree(&mut self, old: &Path, new: &Path) -> usize {
        self.registry.rename_prefix(old, new)
    }

    /// Blocking read of the next batch of raw records.
    pub fn read_events(&mut self) -> Result<Vec<RawEvent>, WatchError> {
        self.service.read()
    }

    /// Release every watch exactly once and close the notification channel
    /// last. Individual release failures are logged and do not stop the
    /// remaining releases.
    pub fn shutdown(mut self) {
        let entries = self.registry.drain();
        crate::log_event!("watch", "shutting down", "releasing {} watches", entries.len());
        for entry in entries {
            if let Err(e) = self.service.remove_watch(entry.handle) {
                warn!("failed to release watch on {}: {e}", entry.path.display());
            }
        }
        if let Err(e) = self.service.close() {
            warn!("failed to close notification channel: {e}");
        }
    }
}
