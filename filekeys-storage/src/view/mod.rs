//! Hierarchical file view consumed by key storage.
//!
//! Paths are POSIX-like strings (`/alice/files_encryption/...`) relative
//! to the view root. Key storage only relies on the operations below, so
//! any backend (local disk, object storage, a test tree) can sit behind
//! `Arc<dyn View>`.

mod local;
mod memory;

pub use local::LocalView;
pub use memory::MemoryView;

use thiserror::Error;

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

/// Errors raised by a view.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The path (or its parent directory) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path component is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The path tried to climb out of the view root.
    #[error("path escapes the view root: {0}")]
    PathTraversal(String),
}

/// Storage operations key storage needs.
///
/// Directory creation is single-level and idempotent: creating a
/// directory that already exists returns `Ok(false)`, never an error,
/// so concurrent preparers cannot fail each other.
pub trait View: Send + Sync {
    /// Whether a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Whether `path` is a directory.
    fn is_dir(&self, path: &str) -> bool;

    /// Reads a whole file.
    fn read(&self, path: &str) -> ViewResult<Vec<u8>>;

    /// Replaces a file's contents, returning the number of bytes written.
    /// The parent directory must exist.
    fn write(&self, path: &str, data: &[u8]) -> ViewResult<usize>;

    /// Removes a file. `Ok(false)` if there was nothing to remove.
    fn remove_file(&self, path: &str) -> ViewResult<bool>;

    /// Removes a file or a directory tree. `Ok(false)` if nothing existed.
    fn remove_all(&self, path: &str) -> ViewResult<bool>;

    /// Moves a file or tree, replacing whatever is at `target`.
    /// `Ok(false)` if `source` does not exist.
    fn rename(&self, source: &str, target: &str) -> ViewResult<bool>;

    /// Copies a file or tree, merging into an existing target directory.
    /// `Ok(false)` if `source` does not exist.
    fn copy(&self, source: &str, target: &str) -> ViewResult<bool>;

    /// Creates one directory level. `Ok(false)` if it already exists.
    fn create_dir(&self, path: &str) -> ViewResult<bool>;

    /// Lists entry names in a directory, sorted.
    fn list(&self, path: &str) -> ViewResult<Vec<String>>;
}

/// Splits a view path into components, rejecting `..`.
pub(crate) fn components(path: &str) -> ViewResult<Vec<&str>> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(ViewError::PathTraversal(path.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts)
}
