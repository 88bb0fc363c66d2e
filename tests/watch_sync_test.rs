//! End-to-end tests of watch coverage against the real inotify backend.
//!
//! Filesystem operations queue their records synchronously, so a blocking
//! poll right after an operation is deterministic.

use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;
use tempfile::TempDir;
use treewatch::watcher::{FsEvent, InotifyService, TreeWalker, WatchManager, WatchSyncer};

fn start(tree: &[&str]) -> (TempDir, PathBuf, WatchSyncer<InotifyService>, Receiver<FsEvent>) {
    let dir = TempDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    for sub in tree {
        fs::create_dir_all(root.join(sub)).unwrap();
    }

    let service = InotifyService::new().unwrap();
    let mut manager = WatchManager::new(service);
    let walker = TreeWalker::default();
    walker.walk(&mut manager, &root).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let syncer = WatchSyncer::new(manager, walker, vec![root.clone()], tx);
    (dir, root, syncer, rx)
}

fn drain(rx: &Receiver<FsEvent>) -> Vec<FsEvent> {
    rx.try_iter().collect()
}

#[test]
fn initial_walk_covers_existing_tree() {
    let (_dir, root, syncer, _rx) = start(&["a/b", "c"]);
    assert_eq!(syncer.registry().len(), 4);
    assert!(syncer.registry().contains(&root));
    assert!(syncer.registry().contains(&root.join("a")));
    assert!(syncer.registry().contains(&root.join("a/b")));
    assert!(syncer.registry().contains(&root.join("c")));
}

#[test]
fn creation_inside_new_directory_is_observed() {
    let (_dir, root, mut syncer, rx) = start(&[]);

    fs::create_dir(root.join("d")).unwrap();
    syncer.poll().unwrap();
    assert!(syncer.registry().contains(&root.join("d")));
    assert!(drain(&rx).contains(&FsEvent::Created(root.join("d"))));

    // The new directory got its own watch, so changes inside it are seen.
    fs::create_dir(root.join("d/inner")).unwrap();
    syncer.poll().unwrap();
    assert!(syncer.registry().contains(&root.join("d/inner")));
    assert!(drain(&rx).contains(&FsEvent::Created(root.join("d/inner"))));
}

#[test]
fn file_creation_and_modification_are_reported() {
    let (_dir, root, mut syncer, rx) = start(&[]);
    let watch_count = syncer.registry().len();

    fs::write(root.join("f.txt"), b"data").unwrap();
    syncer.poll().unwrap();

    let events = drain(&rx);
    assert!(events.contains(&FsEvent::Created(root.join("f.txt"))));
    assert!(events.contains(&FsEvent::Modified(root.join("f.txt"))));
    // Plain files never grow the watch set.
    assert_eq!(syncer.registry().len(), watch_count);
}

#[test]
fn deleting_a_subtree_drops_its_coverage() {
    let (_dir, root, mut syncer, rx) = start(&["a/b"]);
    assert_eq!(syncer.registry().len(), 3);

    fs::remove_dir_all(root.join("a")).unwrap();
    syncer.poll().unwrap();

    assert_eq!(syncer.registry().len(), 1);
    assert!(!syncer.registry().contains(&root.join("a")));
    assert!(!syncer.registry().contains(&root.join("a/b")));

    let removed: Vec<_> = drain(&rx)
        .into_iter()
        .filter(|e| e.is_removed())
        .filter_map(|e| e.path().cloned())
        .collect();
    assert!(removed.contains(&root.join("a")));
    assert!(removed.contains(&root.join("a/b")));
}

#[test]
fn rename_within_tree_preserves_watches() {
    let (_dir, root, mut syncer, rx) = start(&["old/sub"]);
    let sub_handle = syncer
        .registry()
        .find_by_path(&root.join("old/sub"))
        .unwrap()
        .handle;

    fs::rename(root.join("old"), root.join("new")).unwrap();
    syncer.poll().unwrap();

    assert!(!syncer.registry().contains(&root.join("old")));
    assert!(syncer.registry().contains(&root.join("new")));
    assert_eq!(
        syncer
            .registry()
            .find_by_path(&root.join("new/sub"))
            .unwrap()
            .handle,
        sub_handle
    );
    assert!(drain(&rx).contains(&FsEvent::Renamed {
        from: root.join("old"),
        to: root.join("new"),
    }));

    // The surviving watch keeps reporting from the renamed location.
    fs::create_dir(root.join("new/sub/x")).unwrap();
    syncer.poll().unwrap();
    assert!(drain(&rx).contains(&FsEvent::Created(root.join("new/sub/x"))));
}

#[test]
fn move_out_of_tree_is_a_removal() {
    let (_dir, root, mut syncer, rx) = start(&["mover/sub"]);
    let outside = TempDir::new().unwrap();

    fs::rename(root.join("mover"), outside.path().join("mover")).unwrap();
    syncer.poll().unwrap();

    assert!(!syncer.registry().contains(&root.join("mover")));
    assert!(!syncer.registry().contains(&root.join("mover/sub")));
    let events = drain(&rx);
    assert!(events.contains(&FsEvent::Removed(root.join("mover"))));
    assert!(events.contains(&FsEvent::Removed(root.join("mover/sub"))));
}

#[test]
fn move_in_from_outside_is_covered_as_created() {
    let (_dir, root, mut syncer, rx) = start(&[]);
    let outside = TempDir::new().unwrap();
    fs::create_dir_all(outside.path().join("import/child")).unwrap();

    fs::rename(outside.path().join("import"), root.join("import")).unwrap();
    syncer.poll().unwrap();

    assert!(syncer.registry().contains(&root.join("import")));
    assert!(syncer.registry().contains(&root.join("import/child")));
    assert!(drain(&rx).contains(&FsEvent::Created(root.join("import"))));
}

#[test]
fn watching_two_roots_through_one_channel() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let root_a = fs::canonicalize(dir_a.path()).unwrap();
    let root_b = fs::canonicalize(dir_b.path()).unwrap();

    let service = InotifyService::new().unwrap();
    let mut manager = WatchManager::new(service);
    let walker = TreeWalker::default();
    walker.walk(&mut manager, &root_a).unwrap();
    walker.walk(&mut manager, &root_b).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut syncer = WatchSyncer::new(
        manager,
        walker,
        vec![root_a.clone(), root_b.clone()],
        tx,
    );

    fs::create_dir(root_a.join("in_a")).unwrap();
    syncer.poll().unwrap();
    fs::create_dir(root_b.join("in_b")).unwrap();
    syncer.poll().unwrap();

    let events = drain(&rx);
    assert!(events.contains(&FsEvent::Created(root_a.join("in_a"))));
    assert!(events.contains(&FsEvent::Created(root_b.join("in_b"))));
}

#[test]
fn walking_a_second_spelling_of_a_root_is_deduplicated() {
    let dir = TempDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    fs::create_dir(root.join("a")).unwrap();

    let service = InotifyService::new().unwrap();
    let mut manager = WatchManager::new(service);
    let walker = TreeWalker::default();

    walker.walk(&mut manager, &root).unwrap();
    let before = manager.registry().len();

    // Same physical directory through a different textual route.
    walker.walk(&mut manager, &root.join("a/..")).unwrap();
    walker.walk(&mut manager, Path::new(&format!("{}/", root.display()))).unwrap();

    assert_eq!(manager.registry().len(), before);
}
