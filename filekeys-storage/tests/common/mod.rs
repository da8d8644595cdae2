#![allow(dead_code)]

use filekeys_crypto::{generate_random_key, InstanceCipher};
use filekeys_storage::{
    KeyStore, MemoryConfig, MemoryView, SystemConfig, SystemMount, UserDirectory, View,
    ViewResult, KEY_STORAGE_MIGRATED_KEY, VERSION_KEY,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const MODULE: &str = "OC_DEFAULT_MODULE";

/// Installs a test subscriber once; `RUST_LOG=debug` shows store logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn migrated_config() -> MemoryConfig {
    MemoryConfig::with_values([
        (VERSION_KEY, json!("28.0.1.0")),
        (KEY_STORAGE_MIGRATED_KEY, json!(true)),
    ])
}

pub fn in_progress_config() -> MemoryConfig {
    MemoryConfig::with_values([
        (VERSION_KEY, json!("28.0.1.0")),
        (KEY_STORAGE_MIGRATED_KEY, json!(false)),
    ])
}

pub fn legacy_config() -> MemoryConfig {
    MemoryConfig::with_values([(VERSION_KEY, json!("20.0.0.1"))])
}

/// `u`, `alice` and `bob`, sharing a system mount at `files/shared`.
pub fn users() -> UserDirectory {
    UserDirectory::new(["u", "alice", "bob"]).with_system_mount(SystemMount::new("shared"))
}

/// Creates every missing parent of `path`, then writes `data` to it.
pub fn put(view: &dyn View, path: &str, data: &[u8]) {
    let mut current = String::new();
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    for part in &parts[..parts.len() - 1] {
        current.push('/');
        current.push_str(part);
        view.create_dir(&current).unwrap();
    }
    view.write(path, data).unwrap();
}

/// Wraps a view and counts writes.
pub struct CountingView {
    inner: Arc<dyn View>,
    writes: AtomicUsize,
}

impl CountingView {
    pub fn new(inner: Arc<dyn View>) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl View for CountingView {
    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.inner.is_dir(path)
    }

    fn read(&self, path: &str) -> ViewResult<Vec<u8>> {
        self.inner.read(path)
    }

    fn write(&self, path: &str, data: &[u8]) -> ViewResult<usize> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(path, data)
    }

    fn remove_file(&self, path: &str) -> ViewResult<bool> {
        self.inner.remove_file(path)
    }

    fn remove_all(&self, path: &str) -> ViewResult<bool> {
        self.inner.remove_all(path)
    }

    fn rename(&self, source: &str, target: &str) -> ViewResult<bool> {
        self.inner.rename(source, target)
    }

    fn copy(&self, source: &str, target: &str) -> ViewResult<bool> {
        self.inner.copy(source, target)
    }

    fn create_dir(&self, path: &str) -> ViewResult<bool> {
        self.inner.create_dir(path)
    }

    fn list(&self, path: &str) -> ViewResult<Vec<String>> {
        self.inner.list(path)
    }
}

/// A key store over an in-memory tree with an instance cipher.
pub struct Fixture {
    pub view: Arc<MemoryView>,
    pub counting: Arc<CountingView>,
    pub config: Arc<MemoryConfig>,
    pub cipher: Arc<InstanceCipher>,
    pub users: Arc<UserDirectory>,
    pub store: KeyStore,
}

impl Fixture {
    pub fn new(config: MemoryConfig) -> Self {
        init_tracing();
        let view = Arc::new(MemoryView::new());
        let counting = Arc::new(CountingView::new(view.clone()));
        let config = Arc::new(config);
        let cipher = Arc::new(InstanceCipher::new(generate_random_key()));
        let users = Arc::new(users());
        let store = KeyStore::new(
            counting.clone(),
            config.clone(),
            cipher.clone(),
            users.clone(),
        );
        Self {
            view,
            counting,
            config,
            cipher,
            users,
            store,
        }
    }

    pub fn migrated() -> Self {
        Self::new(migrated_config())
    }

    pub fn in_progress() -> Self {
        Self::new(in_progress_config())
    }

    pub fn legacy() -> Self {
        Self::new(legacy_config())
    }

    /// Another store over the same tree, with an empty cache.
    pub fn fresh_store(&self) -> KeyStore {
        KeyStore::new(
            self.counting.clone(),
            self.config.clone(),
            self.cipher.clone(),
            self.users.clone(),
        )
    }

    pub fn set_config(&self, key: &str, value: serde_json::Value) {
        self.config.set_system_value(key, value).unwrap();
    }
}
