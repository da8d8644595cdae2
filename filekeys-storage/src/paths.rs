//! Canonical key locations.
//!
//! Everything here is pure string work apart from the ownership lookup,
//! which is delegated to an `OwnershipResolver`.

use crate::config::KeyStorageConfig;
use crate::error::{KeyStoreError, KeyStoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Normalizes a slash-separated path.
///
/// Backslashes become slashes, empty and `.` segments are dropped, `..`
/// removes the previous segment (never climbing above the root) and the
/// result has exactly one leading slash. A trailing slash survives only
/// when `keep_trailing_slash` is set and the input had one.
pub fn normalize_path(path: &str, keep_trailing_slash: bool) -> String {
    let path = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = format!("/{}", segments.join("/"));
    if keep_trailing_slash && path.ends_with('/') && normalized.len() > 1 {
        normalized.push('/');
    }
    normalized
}

/// Parent directory of a normalized path (`/` for top-level entries).
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Strips an upload's `.part` suffix, and the `.ocTransferId<n>` marker
/// in front of it, so keys resolve to the final filename.
pub fn strip_partial_file_extension(path: &str) -> &str {
    let Some(stripped) = path.strip_suffix(".part") else {
        return path;
    };
    match stripped.rsplit_once('.') {
        Some((base, ext)) if ext.starts_with("ocTransferId") && !ext.contains('/') => base,
        _ => stripped,
    }
}

/// Answers who owns a path and where it is mounted.
pub trait OwnershipResolver: Send + Sync {
    /// Splits a data-root path (`/<uid>/files/...`) into the owner uid
    /// and the owner-relative filename (`/files/...`).
    fn uid_and_filename(&self, path: &str) -> KeyStoreResult<(String, String)>;

    /// Whether `filename` lives on a system-wide mount visible to `uid`.
    fn is_system_wide_mount_point(&self, filename: &str, uid: &str) -> bool;

    /// Whether `uid` is a known user.
    fn user_exists(&self, uid: &str) -> bool;
}

/// A mount shared by several users, e.g. group or external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMount {
    /// Mount point relative to each user's `files/` folder.
    pub mount_point: String,
    /// Users the mount applies to; empty means everyone.
    #[serde(default)]
    pub applicable_users: Vec<String>,
}

impl SystemMount {
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self {
            mount_point: mount_point.into(),
            applicable_users: Vec::new(),
        }
    }

    /// Restricts the mount to the given users.
    pub fn for_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applicable_users = users.into_iter().map(Into::into).collect();
        self
    }

    fn applies_to(&self, uid: &str) -> bool {
        self.applicable_users.is_empty() || self.applicable_users.iter().any(|u| u == uid)
    }
}

/// Ownership backed by a fixed set of users and system mounts.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashSet<String>,
    system_mounts: Vec<SystemMount>,
}

impl UserDirectory {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
            system_mounts: Vec::new(),
        }
    }

    /// Adds a system-wide mount.
    pub fn with_system_mount(mut self, mount: SystemMount) -> Self {
        self.system_mounts.push(mount);
        self
    }

    /// Known user ids, sorted.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.iter().cloned().collect();
        users.sort();
        users
    }
}

impl OwnershipResolver for UserDirectory {
    fn uid_and_filename(&self, path: &str) -> KeyStoreResult<(String, String)> {
        let parts: Vec<&str> = path.split('/').collect();
        let uid = if parts.len() > 2 { parts[1] } else { "" };
        if uid.is_empty() || !self.user_exists(uid) {
            return Err(KeyStoreError::NoOwner {
                path: path.to_string(),
            });
        }
        let owner_path = parts[2..].join("/");
        Ok((uid.to_string(), normalize_path(&owner_path, false)))
    }

    fn is_system_wide_mount_point(&self, filename: &str, uid: &str) -> bool {
        self.system_mounts.iter().any(|mount| {
            let target = format!("/files/{}", mount.mount_point.trim_matches('/'));
            let inside = filename == target
                || filename
                    .strip_prefix(&target)
                    .is_some_and(|rest| rest.starts_with('/'));
            inside && mount.applies_to(uid)
        })
    }

    fn user_exists(&self, uid: &str) -> bool {
        self.users.contains(uid)
    }
}

/// Computes where keys live. No I/O.
#[derive(Clone)]
pub struct KeyPathResolver {
    layout: KeyStorageConfig,
    ownership: Arc<dyn OwnershipResolver>,
}

impl KeyPathResolver {
    pub fn new(layout: KeyStorageConfig, ownership: Arc<dyn OwnershipResolver>) -> Self {
        Self { layout, ownership }
    }

    /// The directory layout in use.
    pub fn layout(&self) -> &KeyStorageConfig {
        &self.layout
    }

    /// The ownership resolver in use.
    pub fn ownership(&self) -> &Arc<dyn OwnershipResolver> {
        &self.ownership
    }

    /// Path of a user key, or of a system key when `uid` is `None`.
    pub fn user_key_path(&self, module_id: &str, key_id: &str, uid: Option<&str>) -> String {
        let path = match uid {
            None => format!(
                "{}/{}/{}/{}",
                self.layout.root_dir, self.layout.encryption_base_dir, module_id, key_id
            ),
            Some(uid) => format!(
                "{}/{}{}/{}/{}.{}",
                self.layout.root_dir, uid, self.layout.encryption_base_dir, module_id, uid, key_id
            ),
        };
        normalize_path(&path, false)
    }

    /// Like [`user_key_path`](Self::user_key_path), but fails with
    /// `NoOwner` when the user is unknown.
    pub fn owned_user_key_path(&self, module_id: &str, key_id: &str, uid: &str) -> KeyStoreResult<String> {
        if !self.ownership.user_exists(uid) {
            return Err(KeyStoreError::NoOwner {
                path: format!("/{uid}"),
            });
        }
        Ok(self.user_key_path(module_id, key_id, Some(uid)))
    }

    /// Directory holding a file's keys for one module, with a trailing
    /// slash. An empty `module_id` yields the directory for all modules.
    pub fn file_key_dir(&self, module_id: &str, path: &str) -> KeyStoreResult<String> {
        let base = self.file_keys_base(path)?;
        Ok(normalize_path(&format!("{base}/{module_id}/"), true))
    }

    /// Directory holding every module's keys for a file.
    pub fn keys_dir(&self, path: &str) -> KeyStoreResult<String> {
        Ok(normalize_path(&self.file_keys_base(path)?, false))
    }

    fn file_keys_base(&self, path: &str) -> KeyStoreResult<String> {
        let (owner, filename) = self.ownership.uid_and_filename(path)?;
        if self.ownership.is_system_wide_mount_point(&filename, &owner) {
            Ok(format!(
                "{}/{}{}",
                self.layout.root_dir, self.layout.keys_base_dir, filename
            ))
        } else {
            Ok(format!(
                "{}/{}{}{}",
                self.layout.root_dir, owner, self.layout.keys_base_dir, filename
            ))
        }
    }

    /// `<root>[/<uid>]/files_encryption`.
    pub fn encryption_dir(&self, uid: Option<&str>) -> String {
        let path = match uid {
            None => format!("{}/{}", self.layout.root_dir, self.layout.encryption_base_dir),
            Some(uid) => format!(
                "{}/{}{}",
                self.layout.root_dir, uid, self.layout.encryption_base_dir
            ),
        };
        normalize_path(&path, false)
    }

    /// Directory holding one module's user (or system) keys.
    pub fn module_dir(&self, uid: Option<&str>, module_id: &str) -> String {
        normalize_path(&format!("{}/{}", self.encryption_dir(uid), module_id), false)
    }

    /// Root of the per-file key tree, per user or for system mounts.
    pub fn file_keys_root(&self, uid: Option<&str>) -> String {
        let path = match uid {
            None => format!("{}/{}", self.layout.root_dir, self.layout.keys_base_dir),
            Some(uid) => format!("{}/{}{}", self.layout.root_dir, uid, self.layout.keys_base_dir),
        };
        normalize_path(&path, false)
    }

    /// Directory holding a user's key backups.
    pub fn backup_root(&self, uid: &str) -> String {
        normalize_path(
            &format!("{}/{}{}", self.layout.root_dir, uid, self.layout.backup_base_dir),
            false,
        )
    }

    /// `<backup root>/<purpose>.<module>.<timestamp>`.
    pub fn backup_dir(&self, uid: &str, purpose: &str, module_id: &str, timestamp: i64) -> String {
        normalize_path(
            &format!(
                "{}/{}.{}.{}",
                self.backup_root(uid),
                purpose,
                module_id,
                timestamp
            ),
            false,
        )
    }
}
