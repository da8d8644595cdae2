//! System configuration consumed by key storage.
//!
//! Key storage reads three system values: the installed `version`, the
//! `encryption.key_storage_migrated` flag and an optional key storage
//! root. The accessor is injected so every decision reads the current
//! value instead of a process-wide snapshot.

use crate::error::{KeyStoreError, KeyStoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// Installed server version (dotted).
pub const VERSION_KEY: &str = "version";

/// Whether every key file has been rewritten in the wrapped format.
pub const KEY_STORAGE_MIGRATED_KEY: &str = "encryption.key_storage_migrated";

/// Overrides the directory all key material lives under.
pub const KEY_STORAGE_ROOT_KEY: &str = "encryption.key_storage_root";

/// Name of the marker file identifying a key storage root.
pub const KEY_STORAGE_MARKER: &str = ".oc_key_storage";

/// Read/write access to system-wide configuration values.
pub trait SystemConfig: Send + Sync {
    /// Raw value for `key`, if set.
    fn get_system_value(&self, key: &str) -> Option<Value>;

    /// Sets and persists `key`.
    fn set_system_value(&self, key: &str, value: Value) -> KeyStoreResult<()>;

    /// Removes `key`. Removing an unset key is not an error.
    fn delete_system_value(&self, key: &str) -> KeyStoreResult<()>;

    /// String value, with numbers and booleans stringified.
    fn get_system_value_string(&self, key: &str, default: &str) -> String {
        match self.get_system_value(key) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Boolean value. Accepts JSON booleans, numbers and the usual
    /// string spellings; anything else yields `default`.
    fn get_system_value_bool(&self, key: &str, default: bool) -> bool {
        match self.get_system_value(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(default),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" | "" => false,
                _ => default,
            },
            _ => default,
        }
    }
}

/// Configuration held in memory.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RwLock<Map<String, Value>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from `(key, value)` pairs.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            values: RwLock::new(map),
        }
    }
}

impl SystemConfig for MemoryConfig {
    fn get_system_value(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_system_value(&self, key: &str, value: Value) -> KeyStoreResult<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn delete_system_value(&self, key: &str) -> KeyStoreResult<()> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Configuration persisted as a JSON object on disk.
///
/// Every change rewrites the whole file through a temporary sibling and
/// a rename.
#[derive(Debug)]
pub struct JsonFileConfig {
    path: PathBuf,
    values: RwLock<Map<String, Value>>,
}

impl JsonFileConfig {
    /// Loads `path`. A missing file is an empty config; a file that is
    /// not a JSON object is an error.
    pub fn load_from(path: impl Into<PathBuf>) -> KeyStoreResult<Self> {
        let path = path.into();
        let values = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                KeyStoreError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            match serde_json::from_str::<Value>(&contents) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(KeyStoreError::Config(format!(
                        "{} is not a JSON object",
                        path.display()
                    )));
                }
                Err(e) => {
                    return Err(KeyStoreError::Config(format!(
                        "failed to parse {}: {e}",
                        path.display()
                    )));
                }
            }
        } else {
            info!("No config file at {:?}, starting empty", path);
            Map::new()
        };

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, Value>) -> KeyStoreResult<()> {
        let contents = serde_json::to_string_pretty(values)
            .map_err(|e| KeyStoreError::Config(format!("failed to serialize config: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                KeyStoreError::Config(format!("failed to write {}: {e}", self.path.display()))
            })?;
        info!("Persisted system config to {:?}", self.path);
        Ok(())
    }
}

impl SystemConfig for JsonFileConfig {
    fn get_system_value(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_system_value(&self, key: &str, value: Value) -> KeyStoreResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn delete_system_value(&self, key: &str) -> KeyStoreResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// Directory layout of the key storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStorageConfig {
    /// Directory all key material lives under, relative to the view root.
    #[serde(default)]
    pub root_dir: String,
    /// Per-user (or system) directory holding module keys.
    #[serde(default = "default_encryption_base_dir")]
    pub encryption_base_dir: String,
    /// Directory holding per-file keys.
    #[serde(default = "default_keys_base_dir")]
    pub keys_base_dir: String,
    /// Directory holding key backups.
    #[serde(default = "default_backup_base_dir")]
    pub backup_base_dir: String,
}

fn default_encryption_base_dir() -> String {
    "/files_encryption".to_string()
}

fn default_keys_base_dir() -> String {
    "/files_encryption/keys".to_string()
}

fn default_backup_base_dir() -> String {
    "/files_encryption/backup".to_string()
}

impl Default for KeyStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: String::new(),
            encryption_base_dir: default_encryption_base_dir(),
            keys_base_dir: default_keys_base_dir(),
            backup_base_dir: default_backup_base_dir(),
        }
    }
}

impl KeyStorageConfig {
    /// Default layout with the root taken from `encryption.key_storage_root`.
    pub fn from_system_config(config: &dyn SystemConfig) -> Self {
        let root = config.get_system_value_string(KEY_STORAGE_ROOT_KEY, "");
        Self {
            root_dir: root.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}
