//! Discovery walk that establishes watch coverage for a directory tree.
//!
//! The walk is iterative with an explicit stack, so pathological directory
//! depths cannot exhaust the native call stack, and it is re-entrant: the
//! syncer re-invokes it for every directory that appears at runtime.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::warn;

use super::error::WatchError;
use super::manager::WatchManager;
use super::notification::NotificationService;

pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Depth-capped tree walk registering a watch per discovered directory.
#[derive(Debug, Clone, Copy)]
pub struct TreeWalker {
    max_depth: usize,
}

impl TreeWalker {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Register `root` and every directory reachable beneath it.
    ///
    /// A failure at `root` itself (not a directory, watch refused) aborts
    /// the invocation. Failures on descendants are logged and skip that
    /// one subtree; siblings continue. A root that is already registered
    /// succeeds as a no-op, so the syncer can re-invoke this freely for
    /// every directory-creation record.
    ///
    /// Registration is keyed by canonical path and idempotent, so a
    /// symlink cycle or a second route to a covered directory terminates
    /// descent there. The depth cap guards structures that keep producing
    /// novel canonical paths.
    pub fn walk<S: NotificationService>(
        &self,
        manager: &mut WatchManager<S>,
        root: &Path,
    ) -> Result<(), WatchError> {
        self.walk_inner(manager, root, false)
    }

    /// Like [`walk`](Self::walk), but descends through directories that
    /// are already registered, registering anything found missing along
    /// the way. Used after a queue overflow, when registered coverage can
    /// no longer be assumed complete.
    pub fn rescan<S: NotificationService>(
        &self,
        manager: &mut WatchManager<S>,
        root: &Path,
    ) -> Result<(), WatchError> {
        self.walk_inner(manager, root, true)
    }

    fn walk_inner<S: NotificationService>(
        &self,
        manager: &mut WatchManager<S>,
        root: &Path,
        revisit_registered: bool,
    ) -> Result<(), WatchError> {
        match fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(WatchError::NotADirectory {
                    path: root.to_path_buf(),
                });
            }
        }
        let root = fs::canonicalize(root)?;

        if manager.registry().contains(&root) {
            if !revisit_registered {
                return Ok(());
            }
        } else {
            manager.register(&root)?;
            crate::log_event!("walker", "monitoring", "{}", root.display());
        }

        // Registration state stops descent in a plain walk; a rescan
        // revisits registered directories and needs its own cycle defense.
        let mut visited = HashSet::new();
        if revisit_registered {
            visited.insert(root.clone());
        }

        let mut stack = vec![(root, 0usize)];
        while let Some((dir, depth)) = stack.pop() {
            if depth >= self.max_depth {
                warn!("depth cap reached under {}, not descending", dir.display());
                continue;
            }
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("failed to list {}: {e}", dir.display());
                    continue;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("unreadable entry under {}: {e}", dir.display());
                        continue;
                    }
                };
                let child = entry.path();
                // metadata follows symlinks, so a link to a directory is
                // descended into (and caught below if it forms a cycle)
                let is_dir = fs::metadata(&child).map(|m| m.is_dir()).unwrap_or(false);
                if !is_dir {
                    continue;
                }
                let canonical = match fs::canonicalize(&child) {
                    Ok(canonical) => canonical,
                    Err(e) => {
                        warn!("cannot resolve {}: {e}", child.display());
                        continue;
                    }
                };
                if manager.registry().contains(&canonical) {
                    if revisit_registered && visited.insert(canonical.clone()) {
                        stack.push((canonical, depth + 1));
                    }
                    continue;
                }
                match manager.register(&canonical) {
                    Ok(_) => {
                        crate::log_event!("walker", "monitoring", "{}", canonical.display());
                        if revisit_registered {
                            visited.insert(canonical.clone());
                        }
                        stack.push((canonical, depth + 1));
                    }
                    Err(e) => {
                        warn!("failed to monitor {}: {e}", canonical.display());
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::notification::mock::MockService;
    use std::fs;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, WatchManager<MockService>) {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, root, WatchManager::new(MockService::new()))
    }

    #[test]
    fn walk_registers_every_directory() {
        let (_dir, root, mut manager) = setup();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir(root.join("c")).unwrap();
        fs::write(root.join("c/file.txt"), b"x").unwrap();

        TreeWalker::default().walk(&mut manager, &root).unwrap();

        assert_eq!(manager.registry().len(), 4);
        assert!(manager.registry().contains(&root));
        assert!(manager.registry().contains(&root.join("a")));
        assert!(manager.registry().contains(&root.join("a/b")));
        assert!(manager.registry().contains(&root.join("c")));
    }

    #[test]
    fn walk_rejects_non_directory_root() {
        let (_dir, root, mut manager) = setup();
        let file = root.join("file.txt");
        fs::write(&file, b"x").unwrap();

        let err = TreeWalker::default().walk(&mut manager, &file).unwrap_err();
        assert!(matches!(err, WatchError::NotADirectory { .. }));
        assert!(manager.registry().is_empty());
    }

    #[test]
    fn walk_twice_is_a_no_op() {
        let (_dir, root, mut manager) = setup();
        fs::create_dir(root.join("a")).unwrap();
        let walker = TreeWalker::default();

        walker.walk(&mut manager, &root).unwrap();
        let registered = manager.registry().len();
        walker.walk(&mut manager, &root).unwrap();
        assert_eq!(manager.registry().len(), registered);
    }

    #[test]
    fn symlink_cycle_terminates() {
        let (_dir, root, mut manager) = setup();
        fs::create_dir(root.join("a")).unwrap();
        symlink(&root, root.join("a/loop")).unwrap();

        TreeWalker::default().walk(&mut manager, &root).unwrap();

        // The loop resolves to the already-registered root.
        assert_eq!(manager.registry().len(), 2);
    }

    #[test]
    fn refused_descendant_does_not_abort_siblings() {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("a/inner")).unwrap();
        fs::create_dir(root.join("b")).unwrap();

        let mut service = MockService::new();
        service.refuse(root.join("a"));
        let mut manager = WatchManager::new(service);

        TreeWalker::default().walk(&mut manager, &root).unwrap();

        assert!(manager.registry().contains(&root));
        assert!(manager.registry().contains(&root.join("b")));
        // The refused subtree is skipped entirely.
        assert!(!manager.registry().contains(&root.join("a")));
        assert!(!manager.registry().contains(&root.join("a/inner")));
    }

    #[test]
    fn refused_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        let mut service = MockService::new();
        service.refuse(root.clone());
        let mut manager = WatchManager::new(service);

        let err = TreeWalker::default().walk(&mut manager, &root).unwrap_err();
        assert!(matches!(err, WatchError::WatchUnavailable { .. }));
    }

    #[test]
    fn rescan_discovers_missed_directories() {
        let (_dir, root, mut manager) = setup();
        fs::create_dir(root.join("a")).unwrap();
        let walker = TreeWalker::default();
        walker.walk(&mut manager, &root).unwrap();

        // Appeared while events were being lost.
        fs::create_dir(root.join("a/missed")).unwrap();
        walker.walk(&mut manager, &root).unwrap();
        assert!(!manager.registry().contains(&root.join("a/missed")));

        walker.rescan(&mut manager, &root).unwrap();
        assert!(manager.registry().contains(&root.join("a/missed")));
    }

    #[test]
    fn rescan_with_symlink_cycle_terminates() {
        let (_dir, root, mut manager) = setup();
        fs::create_dir(root.join("a")).unwrap();
        symlink(&root, root.join("a/loop")).unwrap();
        let walker = TreeWalker::default();
        walker.walk(&mut manager, &root).unwrap();

        walker.rescan(&mut manager, &root).unwrap();
        assert_eq!(manager.registry().len(), 2);
    }

    #[test]
    fn depth_cap_prunes_descent() {
        let (_dir, root, mut manager) = setup();
        fs::create_dir_all(root.join("a/b/c")).unwrap();

        TreeWalker::new(1).walk(&mut manager, &root).unwrap();

        assert!(manager.registry().contains(&root.join("a")));
        assert!(!manager.registry().contains(&root.join("a/b")));
    }
}
