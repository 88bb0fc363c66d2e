//! Registry of active watches, keyed by canonical path.
//!
//! The registry is a pure data structure; watch lifetime (talking to the
//! notification service) is handled by [`super::manager::WatchManager`].
//! Entries form an implicit tree by path containment - ancestry is derived
//! on demand with component-wise prefix comparison, never stored.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::notification::WatchHandle;

/// One active watch: an opaque handle and the canonical directory path it
/// covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub handle: WatchHandle,
    pub path: PathBuf,
}

/// The authoritative set of `(handle, canonical path)` entries.
///
/// Invariants: paths are unique, handles are unique. The ordered primary
/// index makes prefix queries a contiguous range scan.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    by_path: BTreeMap<PathBuf, WatchHandle>,
    by_handle: HashMap<WatchHandle, PathBuf>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<WatchEntry> {
        self.by_path.get(path).map(|&handle| WatchEntry {
            handle,
            path: path.to_path_buf(),
        })
    }

    pub fn find_by_handle(&self, handle: WatchHandle) -> Option<WatchEntry> {
        self.by_handle.get(&handle).map(|path| WatchEntry {
            handle,
            path: path.clone(),
        })
    }

    /// Insert a new entry. Returns `false` (leaving the registry untouched)
    /// if either the path or the handle is already present.
    pub(crate) fn insert(&mut self, entry: WatchEntry) -> bool {
        if self.by_path.contains_key(&entry.path) || self.by_handle.contains_key(&entry.handle) {
            return false;
        }
        self.by_path.insert(entry.path.clone(), entry.handle);
        self.by_handle.insert(entry.handle, entry.path);
        true
    }

    /// All entries, in path order.
    pub fn entries(&self) -> impl Iterator<Item = WatchEntry> + '_ {
        self.by_path.iter().map(|(path, &handle)| WatchEntry {
            handle,
            path: path.clone(),
        })
    }

    /// All entries at or below `prefix`, parents before descendants.
    ///
    /// Matching is per path component: `/foo` covers `/foo` and `/foo/bar`
    /// but never `/foobar`.
    pub fn find_by_prefix(&self, prefix: &Path) -> Vec<WatchEntry> {
        self.by_path
            .range(prefix.to_path_buf()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, &handle)| WatchEntry {
                handle,
                path: path.clone(),
            })
            .collect()
    }

    pub(crate) fn remove(&mut self, handle: WatchHandle) -> Option<WatchEntry> {
        let path = self.by_handle.remove(&handle)?;
        self.by_path.remove(&path);
        Some(WatchEntry { handle, path })
    }

    /// Rewrite the paths of every entry at or below `old` to live below
    /// `new`, leaving handles untouched. Returns the number of entries
    /// rewritten.
    pub(crate) fn rename_prefix(&mut self, old: &Path, new: &Path) -> usize {
        let moved = self.find_by_prefix(old);
        for entry in &moved {
            self.by_path.remove(&entry.path);
        }
        let mut renamed = 0;
        for entry in moved {
            let Ok(rel) = entry.path.strip_prefix(old) else {
                continue;
            };
            let new_path = if rel.as_os_str().is_empty() {
                new.to_path_buf()
            } else {
                new.join(rel)
            };
            self.by_path.insert(new_path.clone(), entry.handle);
            self.by_handle.insert(entry.handle, new_path);
            renamed += 1;
        }
        renamed
    }

    /// Consume every entry, in path order. Used at shutdown.
    pub(crate) fn drain(&mut self) -> Vec<WatchEntry> {
        self.by_handle.clear();
        std::mem::take(&mut self.by_path)
            .into_iter()
            .map(|(path, handle)| WatchEntry { handle, path })
            .collect()
    }
}
