//! The key store: user, system and per-file keys on top of a [`View`].

use crate::codec::{KeyCodec, KeyRecord};
use crate::config::{KeyStorageConfig, SystemConfig};
use crate::error::{KeyStoreError, KeyStoreResult};
use crate::migration::MigrationState;
use crate::paths::{dirname, strip_partial_file_extension, KeyPathResolver, OwnershipResolver};
use crate::view::View;
use filekeys_crypto::SymmetricCipher;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of looking a key up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    /// No key file, or a key file without key material.
    Absent,
    /// A decoded key record.
    Found(KeyRecord),
}

impl KeyLookup {
    pub fn is_absent(&self) -> bool {
        matches!(self, KeyLookup::Absent)
    }

    /// The record, if one was found.
    pub fn record(&self) -> Option<&KeyRecord> {
        match self {
            KeyLookup::Absent => None,
            KeyLookup::Found(record) => Some(record),
        }
    }
}

/// Path resolution for deletes: an unresolvable owner means there is
/// nothing to delete.
fn owned_or_gone(resolved: KeyStoreResult<String>) -> KeyStoreResult<Option<String>> {
    match resolved {
        Ok(path) => Ok(Some(path)),
        Err(KeyStoreError::NoOwner { path }) => {
            debug!("No owner for {}, nothing to delete", path);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Key material of a lookup read from `path`, empty when absent.
fn key_material(lookup: KeyLookup, path: &str) -> KeyStoreResult<Vec<u8>> {
    match lookup {
        KeyLookup::Absent => Ok(Vec::new()),
        KeyLookup::Found(record) => record.key_bytes().map_err(|source| KeyStoreError::KeyCorrupt {
            path: path.to_string(),
            source,
        }),
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Stores encryption keys for users, the system and individual files.
///
/// Decoded records are cached per instance. The migration state is read
/// from the system config on every encode, decode and ownership check.
pub struct KeyStore {
    view: Arc<dyn View>,
    config: Arc<dyn SystemConfig>,
    paths: KeyPathResolver,
    codec: KeyCodec,
    cache: Mutex<HashMap<String, KeyRecord>>,
    clock: fn() -> i64,
}

impl KeyStore {
    /// Creates a store. The directory layout comes from `config`.
    pub fn new(
        view: Arc<dyn View>,
        config: Arc<dyn SystemConfig>,
        cipher: Arc<dyn SymmetricCipher>,
        ownership: Arc<dyn OwnershipResolver>,
    ) -> Self {
        let layout = KeyStorageConfig::from_system_config(config.as_ref());
        Self {
            view,
            config,
            paths: KeyPathResolver::new(layout, ownership),
            codec: KeyCodec::new(cipher),
            cache: Mutex::new(HashMap::new()),
            clock: unix_now,
        }
    }

    /// Replaces the directory layout.
    pub fn with_layout(mut self, layout: KeyStorageConfig) -> Self {
        self.paths = KeyPathResolver::new(layout, self.paths.ownership().clone());
        self
    }

    /// Replaces the clock used to name backups (unix seconds).
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn paths(&self) -> &KeyPathResolver {
        &self.paths
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// The migration state as currently configured.
    pub fn migration_state(&self) -> MigrationState {
        MigrationState::load(self.config.as_ref())
    }

    // ── User and system keys ─────────────────────────────────────

    pub fn get_user_key(&self, uid: &str, key_id: &str, module_id: &str) -> KeyStoreResult<Vec<u8>> {
        let path = self.paths.user_key_path(module_id, key_id, Some(uid));
        key_material(self.get_with_repair(&path, Some(uid))?, &path)
    }

    pub fn get_system_key(&self, key_id: &str, module_id: &str) -> KeyStoreResult<Vec<u8>> {
        let path = self.paths.user_key_path(module_id, key_id, None);
        key_material(self.get_with_repair(&path, None)?, &path)
    }

    pub fn set_user_key(
        &self,
        uid: &str,
        key_id: &str,
        key: &[u8],
        module_id: &str,
    ) -> KeyStoreResult<bool> {
        let path = self.paths.user_key_path(module_id, key_id, Some(uid));
        self.set_key(&path, &KeyRecord::user(key, uid))
    }

    pub fn set_system_key(&self, key_id: &str, key: &[u8], module_id: &str) -> KeyStoreResult<bool> {
        let path = self.paths.user_key_path(module_id, key_id, None);
        self.set_key(&path, &KeyRecord::system(key))
    }

    /// Deletes a user key. An unknown owner counts as already deleted.
    pub fn delete_user_key(&self, uid: &str, key_id: &str, module_id: &str) -> KeyStoreResult<bool> {
        match owned_or_gone(self.paths.owned_user_key_path(module_id, key_id, uid))? {
            Some(path) => self.delete_key(&path),
            None => Ok(true),
        }
    }

    pub fn delete_system_key(&self, key_id: &str, module_id: &str) -> KeyStoreResult<bool> {
        let path = self.paths.user_key_path(module_id, key_id, None);
        self.delete_key(&path)
    }

    // ── File keys ────────────────────────────────────────────────

    /// Reads a file key. Keys of an upload's `.part` file are looked up
    /// under the final name first, then under the part file itself.
    pub fn get_file_key(&self, path: &str, key_id: &str, module_id: &str) -> KeyStoreResult<Vec<u8>> {
        let real_file = strip_partial_file_extension(path);
        let mut key_path = format!("{}{key_id}", self.paths.file_key_dir(module_id, real_file)?);
        let mut lookup = self.load_key(&key_path)?;

        if lookup.is_absent() && real_file != path {
            key_path = format!("{}{key_id}", self.paths.file_key_dir(module_id, path)?);
            lookup = self.load_key(&key_path)?;
        }
        key_material(lookup, &key_path)
    }

    pub fn set_file_key(
        &self,
        path: &str,
        key_id: &str,
        key: &[u8],
        module_id: &str,
    ) -> KeyStoreResult<bool> {
        let key_dir = self.paths.file_key_dir(module_id, path)?;
        self.set_key(&format!("{key_dir}{key_id}"), &KeyRecord::file(key))
    }

    /// Deletes one file key. A file without a resolvable owner has no
    /// keys to delete.
    pub fn delete_file_key(&self, path: &str, key_id: &str, module_id: &str) -> KeyStoreResult<bool> {
        match owned_or_gone(self.paths.file_key_dir(module_id, path))? {
            Some(key_dir) => self.delete_key(&format!("{key_dir}{key_id}")),
            None => Ok(true),
        }
    }

    /// Removes the keys of every module for `path`.
    pub fn delete_all_file_keys(&self, path: &str) -> KeyStoreResult<bool> {
        let Some(key_dir) = owned_or_gone(self.paths.file_key_dir("", path))? else {
            return Ok(true);
        };
        self.evict_below(&key_dir);
        if !self.view.exists(&key_dir) {
            return Ok(true);
        }
        Ok(self.view.remove_all(&key_dir)?)
    }

    /// Moves all keys of `source` to `target`. `false` if `source` has none.
    pub fn rename_keys(&self, source: &str, target: &str) -> KeyStoreResult<bool> {
        let source_path = self.paths.keys_dir(source)?;
        let target_path = self.paths.keys_dir(target)?;
        if !self.view.exists(&source_path) {
            return Ok(false);
        }

        self.key_set_preparation(&dirname(&target_path))?;
        self.view.rename(&source_path, &target_path)?;
        self.evict_below(&source_path);
        self.evict_below(&target_path);
        info!("Moved keys from {} to {}", source_path, target_path);
        Ok(true)
    }

    /// Copies all keys of `source` to `target`. `false` if `source` has none.
    pub fn copy_keys(&self, source: &str, target: &str) -> KeyStoreResult<bool> {
        let source_path = self.paths.keys_dir(source)?;
        let target_path = self.paths.keys_dir(target)?;
        if !self.view.exists(&source_path) {
            return Ok(false);
        }

        self.key_set_preparation(&dirname(&target_path))?;
        self.view.copy(&source_path, &target_path)?;
        self.evict_below(&target_path);
        info!("Copied keys from {} to {}", source_path, target_path);
        Ok(true)
    }

    // ── Backups ──────────────────────────────────────────────────

    /// Copies a user's keys for one module into
    /// `<backup root>/<purpose>.<module>.<timestamp>`, suffixed with
    /// `.1`, `.2`, ... when a backup with that name already exists.
    ///
    /// Returns `false` without creating anything if the user has no keys
    /// for the module.
    pub fn backup_user_keys(&self, module_id: &str, purpose: &str, uid: &str) -> KeyStoreResult<bool> {
        let source = self.paths.module_dir(Some(uid), module_id);
        if !self.view.exists(&source) {
            debug!("No keys for {} in module {}, skipping backup", uid, module_id);
            return Ok(false);
        }

        self.key_set_preparation(&self.paths.backup_root(uid))?;
        let stamped = self.paths.backup_dir(uid, purpose, module_id, (self.clock)());
        let mut backup_dir = stamped.clone();
        let mut attempt = 0;
        while !self.view.create_dir(&backup_dir)? {
            attempt += 1;
            backup_dir = format!("{stamped}.{attempt}");
        }
        let copied = self.view.copy(&source, &backup_dir)?;
        info!("Backed up {} keys of {} to {}", module_id, uid, backup_dir);
        Ok(copied)
    }

    // ── Internals ────────────────────────────────────────────────

    /// Creates every missing directory along `dir`.
    ///
    /// Directories created concurrently by someone else are not an error.
    pub fn key_set_preparation(&self, dir: &str) -> KeyStoreResult<()> {
        if self.view.exists(dir) {
            return Ok(());
        }
        let mut current = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            if !self.view.is_dir(&current) {
                self.view.create_dir(&current)?;
            }
        }
        Ok(())
    }

    /// Loads a user or system key and checks its owner tag.
    ///
    /// A mismatched tag is served as-is on legacy installations, rejected
    /// once migration has finished, and rewritten with the expected owner
    /// while migration is in progress.
    pub fn get_with_repair(&self, path: &str, expected_uid: Option<&str>) -> KeyStoreResult<KeyLookup> {
        let record = match self.load_key(path)? {
            KeyLookup::Absent => return Ok(KeyLookup::Absent),
            KeyLookup::Found(record) => record,
        };
        if record.uid.as_ref().map(|uid| uid.as_deref()) == Some(expected_uid) {
            return Ok(KeyLookup::Found(record));
        }

        let state = self.migration_state();
        if state.pre_migration_version {
            return Ok(KeyLookup::Found(record));
        }
        if state.key_storage_migrated {
            warn!("Owner tag of {} does not match {:?}", path, expected_uid);
            return Err(KeyStoreError::KeyTampered {
                path: path.to_string(),
            });
        }

        warn!("Repairing owner tag of {} to {:?}", path, expected_uid);
        let repaired = KeyRecord {
            uid: Some(expected_uid.map(str::to_string)),
            ..record
        };
        self.set_key(path, &repaired)?;
        Ok(KeyLookup::Found(repaired))
    }

    fn load_key(&self, path: &str) -> KeyStoreResult<KeyLookup> {
        if !self.view.exists(path) {
            return Ok(KeyLookup::Absent);
        }

        let cached = self.lock_cache().get(path).cloned();
        let record = match cached {
            Some(record) => {
                debug!("Key cache hit for {}", path);
                record
            }
            None => {
                debug!("Key cache miss for {}", path);
                let raw = self.view.read(path)?;
                let record = self
                    .codec
                    .decode(&raw, self.migration_state())
                    .map_err(|source| KeyStoreError::KeyCorrupt {
                        path: path.to_string(),
                        source,
                    })?;
                self.lock_cache().insert(path.to_string(), record.clone());
                record
            }
        };

        if record.is_empty() {
            Ok(KeyLookup::Absent)
        } else {
            Ok(KeyLookup::Found(record))
        }
    }

    fn set_key(&self, path: &str, record: &KeyRecord) -> KeyStoreResult<bool> {
        self.key_set_preparation(&dirname(path))?;
        let data = self
            .codec
            .encode(record, self.migration_state())
            .map_err(|source| KeyStoreError::Encode {
                path: path.to_string(),
                source,
            })?;

        let written = self.view.write(path, &data)?;
        if written > 0 {
            self.lock_cache().insert(path.to_string(), record.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn delete_key(&self, path: &str) -> KeyStoreResult<bool> {
        self.lock_cache().remove(path);
        if !self.view.exists(path) {
            return Ok(true);
        }
        Ok(self.view.remove_file(path)?)
    }

    fn evict_below(&self, dir: &str) {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.lock_cache().retain(|path, _| !path.starts_with(&prefix));
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, KeyRecord>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
