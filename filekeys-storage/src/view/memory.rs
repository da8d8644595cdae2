//! In-memory view for tests and embedding.

use super::{components, View, ViewError, ViewResult};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Debug)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// A directory tree held in memory.
///
/// Behaves like a strict file system: writes and `create_dir` need an
/// existing parent directory, so callers must prepare directories the
/// same way they would on disk.
#[derive(Debug, Default)]
pub struct MemoryView {
    // Keys are canonical paths without the leading slash; the root is implicit.
    nodes: RwLock<BTreeMap<String, Node>>,
    fail_writes: AtomicBool,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with an I/O error.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.fail_writes.store(simulate, Ordering::SeqCst);
    }

    /// All file paths, sorted.
    pub fn files(&self) -> Vec<String> {
        self.read_nodes()
            .iter()
            .filter(|(_, node)| matches!(node, Node::File(_)))
            .map(|(key, _)| format!("/{key}"))
            .collect()
    }

    /// All directory paths, sorted.
    pub fn dirs(&self) -> Vec<String> {
        self.read_nodes()
            .iter()
            .filter(|(_, node)| matches!(node, Node::Dir))
            .map(|(key, _)| format!("/{key}"))
            .collect()
    }

    fn read_nodes(&self) -> RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_nodes(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self, path: &str) -> ViewResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ViewError::Io {
                path: path.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "simulated write error",
                ),
            });
        }
        Ok(())
    }
}

fn canonical(path: &str) -> ViewResult<String> {
    Ok(components(path)?.join("/"))
}

fn parent_of(key: &str) -> &str {
    key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn is_dir_in(nodes: &BTreeMap<String, Node>, key: &str) -> bool {
    key.is_empty() || matches!(nodes.get(key), Some(Node::Dir))
}

fn ensure_parent(nodes: &BTreeMap<String, Node>, key: &str, path: &str) -> ViewResult<()> {
    let parent = parent_of(key);
    if is_dir_in(nodes, parent) {
        Ok(())
    } else if nodes.contains_key(parent) {
        Err(ViewError::NotADirectory(path.to_string()))
    } else {
        Err(ViewError::NotFound(path.to_string()))
    }
}

/// `key` itself plus every node below it.
fn subtree(nodes: &BTreeMap<String, Node>, key: &str) -> Vec<(String, Node)> {
    let prefix = format!("{key}/");
    nodes
        .iter()
        .filter(|(k, _)| k.as_str() == key || k.starts_with(&prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn rebase(key: &str, from: &str, to: &str) -> String {
    format!("{to}{}", &key[from.len()..])
}

impl View for MemoryView {
    fn exists(&self, path: &str) -> bool {
        match canonical(path) {
            Ok(key) => key.is_empty() || self.read_nodes().contains_key(&key),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        match canonical(path) {
            Ok(key) => is_dir_in(&self.read_nodes(), &key),
            Err(_) => false,
        }
    }

    fn read(&self, path: &str) -> ViewResult<Vec<u8>> {
        let key = canonical(path)?;
        match self.read_nodes().get(&key) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(ViewError::NotADirectory(path.to_string())),
            None => Err(ViewError::NotFound(path.to_string())),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> ViewResult<usize> {
        self.check_writable(path)?;
        let key = canonical(path)?;
        let mut nodes = self.write_nodes();
        ensure_parent(&nodes, &key, path)?;
        if key.is_empty() || matches!(nodes.get(&key), Some(Node::Dir)) {
            return Err(ViewError::NotADirectory(path.to_string()));
        }
        nodes.insert(key, Node::File(data.to_vec()));
        Ok(data.len())
    }

    fn remove_file(&self, path: &str) -> ViewResult<bool> {
        self.check_writable(path)?;
        let key = canonical(path)?;
        let mut nodes = self.write_nodes();
        match nodes.get(&key) {
            Some(Node::File(_)) => {
                nodes.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn remove_all(&self, path: &str) -> ViewResult<bool> {
        self.check_writable(path)?;
        let key = canonical(path)?;
        let mut nodes = self.write_nodes();
        let doomed = subtree(&nodes, &key);
        if doomed.is_empty() {
            return Ok(false);
        }
        for (k, _) in doomed {
            nodes.remove(&k);
        }
        Ok(true)
    }

    fn rename(&self, source: &str, target: &str) -> ViewResult<bool> {
        self.check_writable(target)?;
        let from = canonical(source)?;
        let to = canonical(target)?;
        let mut nodes = self.write_nodes();
        let moving = subtree(&nodes, &from);
        if moving.is_empty() {
            return Ok(false);
        }
        ensure_parent(&nodes, &to, target)?;

        for (k, _) in subtree(&nodes, &to) {
            nodes.remove(&k);
        }
        for (k, _) in &moving {
            nodes.remove(k);
        }
        for (k, node) in moving {
            nodes.insert(rebase(&k, &from, &to), node);
        }
        Ok(true)
    }

    fn copy(&self, source: &str, target: &str) -> ViewResult<bool> {
        self.check_writable(target)?;
        let from = canonical(source)?;
        let to = canonical(target)?;
        let mut nodes = self.write_nodes();
        let copying = subtree(&nodes, &from);
        if copying.is_empty() {
            return Ok(false);
        }
        ensure_parent(&nodes, &to, target)?;

        for (k, node) in copying {
            let dest = rebase(&k, &from, &to);
            match (&node, nodes.get(&dest)) {
                (Node::Dir, Some(Node::Dir)) => {}
                (Node::Dir, Some(Node::File(_))) | (Node::File(_), Some(Node::Dir)) => {
                    return Err(ViewError::NotADirectory(format!("/{dest}")));
                }
                _ => {
                    nodes.insert(dest, node);
                }
            }
        }
        Ok(true)
    }

    fn create_dir(&self, path: &str) -> ViewResult<bool> {
        self.check_writable(path)?;
        let key = canonical(path)?;
        if key.is_empty() {
            return Ok(false);
        }
        let mut nodes = self.write_nodes();
        match nodes.get(&key) {
            Some(Node::Dir) => return Ok(false),
            Some(Node::File(_)) => return Err(ViewError::NotADirectory(path.to_string())),
            None => {}
        }
        ensure_parent(&nodes, &key, path)?;
        nodes.insert(key, Node::Dir);
        Ok(true)
    }

    fn list(&self, path: &str) -> ViewResult<Vec<String>> {
        let key = canonical(path)?;
        let nodes = self.read_nodes();
        if !is_dir_in(&nodes, &key) {
            return Err(ViewError::NotFound(path.to_string()));
        }
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };
        Ok(nodes
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect())
    }
}
