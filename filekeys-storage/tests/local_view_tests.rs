mod common;

use common::{migrated_config, users, MODULE};
use filekeys_crypto::{generate_random_key, InstanceCipher};
use filekeys_storage::{KeyStore, LocalView, View, ViewError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn view() -> (TempDir, LocalView) {
    let dir = TempDir::new().unwrap();
    let view = LocalView::new(dir.path());
    (dir, view)
}

// ── Basic operations ────────────────────────────────────────────

#[test]
fn write_and_read() {
    let (dir, view) = view();
    view.create_dir("/a").unwrap();
    assert_eq!(view.write("/a/file", b"data").unwrap(), 4);
    assert_eq!(view.read("/a/file").unwrap(), b"data");
    assert_eq!(std::fs::read(dir.path().join("a/file")).unwrap(), b"data");
}

#[test]
fn write_leaves_no_temp_files() {
    let (_dir, view) = view();
    view.create_dir("/a").unwrap();
    view.write("/a/file", b"one").unwrap();
    view.write("/a/file", b"two").unwrap();
    assert_eq!(view.list("/a").unwrap(), vec!["file"]);
    assert_eq!(view.read("/a/file").unwrap(), b"two");
}

#[test]
fn write_needs_parent() {
    let (_dir, view) = view();
    assert!(matches!(
        view.write("/missing/file", b"x"),
        Err(ViewError::NotFound(_))
    ));
}

#[test]
fn missing_file_is_not_found() {
    let (_dir, view) = view();
    assert!(matches!(view.read("/nope"), Err(ViewError::NotFound(_))));
    assert!(!view.exists("/nope"));
}

#[test]
fn create_dir_is_idempotent() {
    let (_dir, view) = view();
    assert!(view.create_dir("/a").unwrap());
    assert!(!view.create_dir("/a").unwrap());
    view.write("/a/f", b"x").unwrap();
    assert!(matches!(
        view.create_dir("/a/f"),
        Err(ViewError::NotADirectory(_))
    ));
}

#[test]
fn traversal_is_rejected() {
    let (_dir, view) = view();
    assert!(matches!(
        view.read("/../etc/passwd"),
        Err(ViewError::PathTraversal(_))
    ));
    assert!(!view.exists("/.."));
}

// ── Trees ───────────────────────────────────────────────────────

#[test]
fn rename_replaces_target_tree() {
    let (_dir, view) = view();
    view.create_dir("/src").unwrap();
    view.write("/src/k", b"new").unwrap();
    view.create_dir("/dst").unwrap();
    view.write("/dst/stale", b"old").unwrap();

    assert!(view.rename("/src", "/dst").unwrap());
    assert!(!view.exists("/src"));
    assert_eq!(view.list("/dst").unwrap(), vec!["k"]);
    assert!(!view.rename("/src", "/dst").unwrap());
}

#[test]
fn copy_merges_trees() {
    let (_dir, view) = view();
    view.create_dir("/src").unwrap();
    view.create_dir("/src/sub").unwrap();
    view.write("/src/sub/k", b"v").unwrap();
    view.create_dir("/dst").unwrap();
    view.write("/dst/keep", b"k").unwrap();

    assert!(view.copy("/src", "/dst").unwrap());
    assert_eq!(view.read("/dst/sub/k").unwrap(), b"v");
    assert_eq!(view.read("/dst/keep").unwrap(), b"k");
    assert_eq!(view.read("/src/sub/k").unwrap(), b"v");
    assert!(!view.copy("/missing", "/dst").unwrap());
}

#[test]
fn remove_file_and_tree() {
    let (_dir, view) = view();
    view.create_dir("/d").unwrap();
    view.write("/d/f", b"x").unwrap();

    assert!(!view.remove_file("/d").unwrap());
    assert!(view.remove_file("/d/f").unwrap());
    assert!(!view.remove_file("/d/f").unwrap());
    assert!(view.remove_all("/d").unwrap());
    assert!(!view.remove_all("/d").unwrap());
}

// ── Key store on disk ───────────────────────────────────────────

fn disk_store(view: Arc<LocalView>) -> KeyStore {
    KeyStore::new(
        view,
        Arc::new(migrated_config()),
        Arc::new(InstanceCipher::new(generate_random_key())),
        Arc::new(users()),
    )
}

#[test]
fn key_store_on_local_disk() {
    let (dir, view) = view();
    let store = disk_store(Arc::new(view));

    store.set_file_key("/u/files/doc.txt", "key1", b"secret", MODULE).unwrap();
    assert_eq!(
        store.get_file_key("/u/files/doc.txt", "key1", MODULE).unwrap(),
        b"secret"
    );
    assert!(dir
        .path()
        .join("u/files_encryption/keys/files/doc.txt/OC_DEFAULT_MODULE/key1")
        .is_file());

    assert!(store.rename_keys("/u/files/doc.txt", "/u/files/moved/doc.txt").unwrap());
    assert_eq!(
        store.get_file_key("/u/files/moved/doc.txt", "key1", MODULE).unwrap(),
        b"secret"
    );
}

#[test]
fn concurrent_preparation_on_disk() {
    let (dir, view) = view();
    let view = Arc::new(view);
    let first = disk_store(view.clone());
    let second = disk_store(view);
    let target = "/u/files_encryption/keys/files/a/b/c/OC_DEFAULT_MODULE";

    std::thread::scope(|s| {
        let a = s.spawn(|| first.key_set_preparation(target));
        let b = s.spawn(|| second.key_set_preparation(target));
        a.join().unwrap().unwrap();
        b.join().unwrap().unwrap();
    });

    assert!(dir
        .path()
        .join("u/files_encryption/keys/files/a/b/c/OC_DEFAULT_MODULE")
        .is_dir());
}
