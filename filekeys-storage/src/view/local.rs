//! View over a directory on the local file system.

use super::{components, View, ViewError, ViewResult};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A view rooted at a data directory on disk.
#[derive(Debug, Clone)]
pub struct LocalView {
    root: PathBuf,
}

impl LocalView {
    /// Creates a view rooted at `root`. The directory is not created.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The on-disk root of this view.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> ViewResult<PathBuf> {
        let mut full = self.root.clone();
        for part in components(path)? {
            full.push(part);
        }
        Ok(full)
    }
}

fn map_io(path: &str, source: io::Error) -> ViewError {
    match source.kind() {
        ErrorKind::NotFound => ViewError::NotFound(path.to_string()),
        _ => ViewError::Io {
            path: path.to_string(),
            source,
        },
    }
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    if source.is_dir() {
        match fs::create_dir(target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists && target.is_dir() => {}
            Err(e) => return Err(e),
        }
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_tree(&entry.path(), &target.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(source, target).map(|_| ())
    }
}

impl View for LocalView {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn read(&self, path: &str) -> ViewResult<Vec<u8>> {
        fs::read(self.resolve(path)?).map_err(|e| map_io(path, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> ViewResult<usize> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| ViewError::NotADirectory(path.to_string()))?;
        if !parent.is_dir() {
            return Err(ViewError::NotFound(path.to_string()));
        }

        // Write-then-rename so readers never see a half-written key.
        let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, data).map_err(|e| map_io(path, e))?;
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(map_io(path, e));
        }
        Ok(data.len())
    }

    fn remove_file(&self, path: &str) -> ViewResult<bool> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Ok(false);
        }
        match fs::remove_file(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(path, e)),
        }
    }

    fn remove_all(&self, path: &str) -> ViewResult<bool> {
        let target = self.resolve(path)?;
        let result = if target.is_dir() {
            fs::remove_dir_all(&target)
        } else if target.exists() {
            fs::remove_file(&target)
        } else {
            return Ok(false);
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(map_io(path, e)),
        }
    }

    fn rename(&self, source: &str, target: &str) -> ViewResult<bool> {
        let from = self.resolve(source)?;
        let to = self.resolve(target)?;
        if !from.exists() {
            return Ok(false);
        }
        if to.is_dir() {
            fs::remove_dir_all(&to).map_err(|e| map_io(target, e))?;
        } else if to.exists() {
            fs::remove_file(&to).map_err(|e| map_io(target, e))?;
        }
        fs::rename(&from, &to).map_err(|e| map_io(target, e))?;
        Ok(true)
    }

    fn copy(&self, source: &str, target: &str) -> ViewResult<bool> {
        let from = self.resolve(source)?;
        let to = self.resolve(target)?;
        if !from.exists() {
            return Ok(false);
        }
        copy_tree(&from, &to).map_err(|e| map_io(target, e))?;
        Ok(true)
    }

    fn create_dir(&self, path: &str) -> ViewResult<bool> {
        let target = self.resolve(path)?;
        match fs::create_dir(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if target.is_dir() {
                    Ok(false)
                } else {
                    Err(ViewError::NotADirectory(path.to_string()))
                }
            }
            Err(e) => Err(map_io(path, e)),
        }
    }

    fn list(&self, path: &str) -> ViewResult<Vec<String>> {
        let dir = self.resolve(path)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| map_io(path, e))? {
            let entry = entry.map_err(|e| map_io(path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
