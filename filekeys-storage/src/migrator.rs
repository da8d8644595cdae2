//! One-pass rewrite of legacy key files into wrapped records.
//!
//! [`KeyStore`](crate::KeyStore) repairs user and system keys lazily as
//! they are read. The migrator finishes the job for everything at once,
//! file keys included, for every user that has keys on disk, and then
//! flips `encryption.key_storage_migrated`.

use crate::codec::{KeyCodec, KeyRecord};
use crate::config::{KeyStorageConfig, SystemConfig, KEY_STORAGE_MIGRATED_KEY};
use crate::error::{KeyStoreError, KeyStoreResult};
use crate::migration::MigrationState;
use crate::paths::{normalize_path, KeyPathResolver, OwnershipResolver};
use crate::view::View;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use filekeys_crypto::SymmetricCipher;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// What a migration run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Legacy files rewritten as wrapped records.
    pub migrated: usize,
    /// Files that were already wrapped.
    pub already_migrated: usize,
    /// Empty files, left untouched.
    pub skipped: usize,
}

/// Owner tag to write into rewritten records.
#[derive(Clone, Copy)]
enum Owner<'a> {
    File,
    System,
    User(&'a str),
}

/// Rewrites every key file under the key storage root.
pub struct KeyStorageMigrator {
    view: Arc<dyn View>,
    config: Arc<dyn SystemConfig>,
    paths: KeyPathResolver,
    codec: KeyCodec,
}

impl KeyStorageMigrator {
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
        }
    }

    /// Replaces the directory layout.
    pub fn with_layout(mut self, layout: KeyStorageConfig) -> Self {
        self.paths = KeyPathResolver::new(layout, self.paths.ownership().clone());
        self
    }

    /// Migrates system keys, system-mount file keys and the keys of every
    /// user found under the key storage root, then marks the key storage
    /// as migrated.
    ///
    /// Refuses to run while the installed version still writes raw keys.
    /// Any error aborts the run and leaves the flag untouched; already
    /// rewritten files are detected as wrapped on the next run.
    pub fn migrate(&self) -> KeyStoreResult<MigrationReport> {
        if MigrationState::load(self.config.as_ref()).pre_migration_version {
            return Err(KeyStoreError::Config(
                "installed version still uses raw keys; upgrade before migrating".to_string(),
            ));
        }

        let mut report = MigrationReport::default();
        self.migrate_user_keys(None, &mut report)?;
        self.migrate_file_keys(&self.paths.file_keys_root(None), &mut report)?;
        for uid in self.key_owners()? {
            self.migrate_user_keys(Some(&uid), &mut report)?;
            self.migrate_file_keys(&self.paths.file_keys_root(Some(&uid)), &mut report)?;
        }

        self.config
            .set_system_value(KEY_STORAGE_MIGRATED_KEY, Value::Bool(true))?;
        info!(
            "Key storage migrated: {} rewritten, {} already wrapped, {} empty",
            report.migrated, report.already_migrated, report.skipped
        );
        Ok(report)
    }

    /// Users with an encryption directory under the key storage root.
    /// Includes users the ownership resolver no longer knows.
    pub fn key_owners(&self) -> KeyStoreResult<Vec<String>> {
        let root = normalize_path(&self.paths.layout().root_dir, false);
        if !self.view.is_dir(&root) {
            return Ok(Vec::new());
        }
        let system_dir = self.paths.encryption_dir(None);

        let mut owners = Vec::new();
        for name in self.view.list(&root)? {
            let candidate = normalize_path(&format!("{root}/{name}"), false);
            if system_dir == candidate || system_dir.starts_with(&format!("{candidate}/")) {
                continue;
            }
            if self.view.is_dir(&self.paths.encryption_dir(Some(&name))) {
                owners.push(name);
            }
        }
        debug!("Found {} key owners under {}", owners.len(), root);
        Ok(owners)
    }

    fn migrate_user_keys(&self, uid: Option<&str>, report: &mut MigrationReport) -> KeyStoreResult<()> {
        let encryption_dir = self.paths.encryption_dir(uid);
        if !self.view.is_dir(&encryption_dir) {
            return Ok(());
        }

        let file_keys_root = self.paths.file_keys_root(uid);
        let backup_root = uid.map(|uid| self.paths.backup_root(uid));
        let owner = match uid {
            Some(uid) => Owner::User(uid),
            None => Owner::System,
        };

        for module_id in self.view.list(&encryption_dir)? {
            let module_dir = self.paths.module_dir(uid, &module_id);
            if module_dir == file_keys_root
                || backup_root.as_deref() == Some(module_dir.as_str())
                || !self.view.is_dir(&module_dir)
            {
                continue;
            }
            for name in self.view.list(&module_dir)? {
                let path = format!("{module_dir}/{name}");
                if !self.view.is_dir(&path) {
                    self.rewrap(&path, owner, report)?;
                }
            }
        }
        Ok(())
    }

    fn migrate_file_keys(&self, dir: &str, report: &mut MigrationReport) -> KeyStoreResult<()> {
        if !self.view.is_dir(dir) {
            return Ok(());
        }
        for name in self.view.list(dir)? {
            let path = format!("{dir}/{name}");
            if self.view.is_dir(&path) {
                self.migrate_file_keys(&path, report)?;
            } else {
                self.rewrap(&path, Owner::File, report)?;
            }
        }
        Ok(())
    }

    fn rewrap(&self, path: &str, owner: Owner<'_>, report: &mut MigrationReport) -> KeyStoreResult<()> {
        let raw = self.view.read(path)?;
        if raw.is_empty() {
            report.skipped += 1;
            return Ok(());
        }
        if self.codec.is_wrapped(&raw) {
            report.already_migrated += 1;
            return Ok(());
        }

        let record = KeyRecord {
            key: STANDARD.encode(&raw),
            uid: match owner {
                Owner::File => None,
                Owner::System => Some(None),
                Owner::User(uid) => Some(Some(uid.to_string())),
            },
        };
        let data = self
            .codec
            .encode(&record, MigrationState::migrated())
            .map_err(|source| KeyStoreError::Encode {
                path: path.to_string(),
                source,
            })?;
        self.view.write(path, &data)?;
        debug!("Rewrapped {}", path);
        report.migrated += 1;
        Ok(())
    }
}
