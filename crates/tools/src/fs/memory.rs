//! In-Memory File System
//!
//! A flat map from normalized path to node. Used for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use texpilot_core::{
    file_name, normalize_path, parent_of, CoreError, CoreResult, DirEntry, FileStat,
    VirtualFileSystem,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(String),
    Dir,
}

/// In-memory [`VirtualFileSystem`].
#[derive(Debug)]
pub struct MemoryFileSystem {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> CoreError {
    CoreError::internal("memory file system lock poisoned")
}

impl MemoryFileSystem {
    /// Empty file system containing only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Seed a file system with files, creating parent directories as needed.
    /// Paths that do not normalize are skipped.
    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let fs = Self::new();
        if let Ok(mut nodes) = fs.nodes.write() {
            for (path, content) in files {
                let Ok(path) = normalize_path(path.as_ref()) else {
                    continue;
                };
                let mut dir = parent_of(&path);
                while let Some(d) = dir {
                    dir = parent_of(&d);
                    nodes.entry(d).or_insert(Node::Dir);
                }
                nodes.insert(path, Node::File(content.into()));
            }
        }
        fs
    }

    /// All files and their contents, keyed by path.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.nodes
            .read()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|(path, node)| match node {
                        Node::File(content) => Some((path.clone(), content.clone())),
                        Node::Dir => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All directories, keyed by path.
    pub fn directories(&self) -> Vec<String> {
        self.nodes
            .read()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter(|(_, node)| **node == Node::Dir)
                    .map(|(path, _)| path.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn require_parent_dir(nodes: &BTreeMap<String, Node>, path: &str) -> CoreResult<()> {
    let parent = parent_of(path).ok_or_else(|| CoreError::invalid_path(path))?;
    match nodes.get(&parent) {
        Some(Node::Dir) => Ok(()),
        Some(Node::File(_)) => Err(CoreError::storage(format!("{} is not a directory", parent))),
        None => Err(CoreError::not_found(parent)),
    }
}

fn is_below(path: &str, dir: &str) -> bool {
    dir != "/" && path.starts_with(&format!("{}/", dir))
}

#[async_trait]
impl VirtualFileSystem for MemoryFileSystem {
    async fn read_file(&self, path: &str) -> CoreResult<String> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        match nodes.get(path) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir) => Err(CoreError::storage(format!("{} is a directory", path))),
            None => Err(CoreError::not_found(path)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> CoreResult<()> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        if let Some(Node::Dir) = nodes.get(path) {
            return Err(CoreError::storage(format!("{} is a directory", path)));
        }
        require_parent_dir(&nodes, path)?;
        nodes.insert(path.to_string(), Node::File(content.to_string()));
        Ok(())
    }

    async fn unlink(&self, path: &str) -> CoreResult<()> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        match nodes.get(path) {
            Some(Node::File(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(CoreError::storage(format!("{} is a directory", path))),
            None => Err(CoreError::not_found(path)),
        }
    }

    async fn mkdir(&self, path: &str) -> CoreResult<()> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        if nodes.contains_key(path) {
            return Err(CoreError::already_exists(path));
        }
        require_parent_dir(&nodes, path)?;
        nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> CoreResult<()> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        if path == "/" {
            return Err(CoreError::storage("cannot remove the root directory"));
        }
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(CoreError::storage(format!("{} is not a directory", path)))
            }
            None => return Err(CoreError::not_found(path)),
        }
        if nodes.keys().any(|p| is_below(p, path)) {
            return Err(CoreError::storage(format!("{} is not empty", path)));
        }
        nodes.remove(path);
        Ok(())
    }

    async fn rename(&self, source: &str, target: &str) -> CoreResult<()> {
        let mut nodes = self.nodes.write().map_err(|_| poisoned())?;
        if source == "/" {
            return Err(CoreError::storage("cannot move the root directory"));
        }
        if !nodes.contains_key(source) {
            return Err(CoreError::not_found(source));
        }
        if nodes.contains_key(target) {
            return Err(CoreError::already_exists(target));
        }
        if is_below(target, source) {
            return Err(CoreError::storage(format!(
                "cannot move {} into itself",
                source
            )));
        }
        require_parent_dir(&nodes, target)?;

        let moved: Vec<String> = nodes
            .keys()
            .filter(|p| p.as_str() == source || is_below(p, source))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{}{}", target, &old[source.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> CoreResult<FileStat> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        match nodes.get(path) {
            Some(Node::File(content)) => Ok(FileStat {
                is_directory: false,
                size: content.len() as u64,
            }),
            Some(Node::Dir) => Ok(FileStat {
                is_directory: true,
                size: 0,
            }),
            None => Err(CoreError::not_found(path)),
        }
    }

    async fn readdir(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        let nodes = self.nodes.read().map_err(|_| poisoned())?;
        match nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(CoreError::storage(format!("{} is not a directory", path)))
            }
            None => return Err(CoreError::not_found(path)),
        }
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && parent_of(p).as_deref() == Some(path))
            .map(|(p, node)| DirEntry {
                name: file_name(p).to_string(),
                path: p.clone(),
                is_directory: *node == Node::Dir,
            })
            .collect())
    }
}
