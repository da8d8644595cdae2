//! Key storage format migration state.

use crate::config::{SystemConfig, KEY_STORAGE_MIGRATED_KEY, VERSION_KEY};
use std::cmp::Ordering;

/// Installations at or below this version store raw, unwrapped keys.
pub const LEGACY_VERSION_THRESHOLD: &str = "20.0.0.1";

/// Version assumed when none is configured.
pub const DEFAULT_VERSION: &str = "0.0.0.0";

/// Which on-disk key format is in effect.
///
/// Derived from configuration on every use; migration can finish
/// between two requests, so this is never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationState {
    /// Keys are raw bytes with no wrapper.
    pub pre_migration_version: bool,
    /// Every key file has been rewritten as a wrapped record.
    pub key_storage_migrated: bool,
}

impl MigrationState {
    /// Reads the current state from `config`.
    pub fn load(config: &dyn SystemConfig) -> Self {
        let version = config.get_system_value_string(VERSION_KEY, DEFAULT_VERSION);
        Self {
            pre_migration_version: compare_versions(&version, LEGACY_VERSION_THRESHOLD)
                != Ordering::Greater,
            key_storage_migrated: config.get_system_value_bool(KEY_STORAGE_MIGRATED_KEY, true),
        }
    }

    /// Legacy installation: raw keys.
    pub fn legacy() -> Self {
        Self {
            pre_migration_version: true,
            key_storage_migrated: false,
        }
    }

    /// Upgraded installation with some keys still raw.
    pub fn in_progress() -> Self {
        Self {
            pre_migration_version: false,
            key_storage_migrated: false,
        }
    }

    /// Upgraded installation with every key wrapped.
    pub fn migrated() -> Self {
        Self {
            pre_migration_version: false,
            key_storage_migrated: true,
        }
    }
}

/// Compares dotted version strings component by component.
///
/// Components are read as integers (leading digits only, `0` if none).
/// A version that is a strict prefix of the other is the smaller one,
/// so `20.0.0 < 20.0.0.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.trim().split('.').map(leading_number);
    let mut right = b.trim().split('.').map(leading_number);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match l.cmp(&r) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

fn leading_number(component: &str) -> u64 {
    let digits: String = component.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}
