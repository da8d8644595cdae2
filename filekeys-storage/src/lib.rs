//! Encryption key storage.
//!
//! Persists per-user, system-wide and per-file encryption keys on top of
//! a hierarchical file [`View`]:
//!
//! - `paths`: where each key lives, given file ownership and mounts
//! - `codec`: the on-disk record format, legacy and wrapped
//! - `store`: the [`KeyStore`] with caching, ownership repair, rename,
//!   copy and backup
//! - `migrator`: one-pass rewrite of legacy key files
//!
//! Configuration and the symmetric cipher are injected; nothing here
//! reads global state.

mod codec;
mod config;
mod error;
mod migration;
mod migrator;
mod paths;
mod store;
pub mod view;

pub use codec::{KeyCodec, KeyRecord};
pub use config::{
    JsonFileConfig, KeyStorageConfig, MemoryConfig, SystemConfig, KEY_STORAGE_MARKER,
    KEY_STORAGE_MIGRATED_KEY, KEY_STORAGE_ROOT_KEY, VERSION_KEY,
};
pub use error::{CodecError, KeyStoreError, KeyStoreResult};
pub use migration::{compare_versions, MigrationState, DEFAULT_VERSION, LEGACY_VERSION_THRESHOLD};
pub use migrator::{KeyStorageMigrator, MigrationReport};
pub use paths::{
    dirname, normalize_path, strip_partial_file_extension, KeyPathResolver, OwnershipResolver,
    SystemMount, UserDirectory,
};
pub use store::{KeyLookup, KeyStore};
pub use view::{LocalView, MemoryView, View, ViewError, ViewResult};
