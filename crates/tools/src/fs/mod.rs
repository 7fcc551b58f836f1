//! File System Collaborators
//!
//! Two [`VirtualFileSystem`] implementations (an in-memory tree and a
//! directory on disk) plus [`ReadOnlyView`], the only handle read actions
//! receive.

pub mod local;
pub mod memory;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;

use texpilot_core::{CoreResult, DirEntry, FileStat, VirtualFileSystem};

/// Read-only access to a file system.
///
/// Read actions only ever see this type, so they cannot reach a mutating
/// primitive.
#[derive(Clone, Copy)]
pub struct ReadOnlyView<'a> {
    inner: &'a dyn VirtualFileSystem,
}

impl<'a> ReadOnlyView<'a> {
    pub fn new(inner: &'a dyn VirtualFileSystem) -> Self {
        Self { inner }
    }

    pub async fn read_file(&self, path: &str) -> CoreResult<String> {
        self.inner.read_file(path).await
    }

    pub async fn stat(&self, path: &str) -> CoreResult<FileStat> {
        self.inner.stat(path).await
    }

    pub async fn readdir(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        self.inner.readdir(path).await
    }

    /// Every entry below `root`, depth first, children in name order.
    pub async fn walk(&self, root: &str) -> CoreResult<Vec<DirEntry>> {
        let mut result = Vec::new();
        let mut stack = vec![root.to_string()];
        while let Some(dir) = stack.pop() {
            let entries = self.inner.readdir(&dir).await?;
            // Reverse so the stack pops children in name order
            for entry in entries.iter().rev() {
                if entry.is_directory {
                    stack.push(entry.path.clone());
                }
            }
            result.extend(entries);
        }
        result.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(result)
    }
}
