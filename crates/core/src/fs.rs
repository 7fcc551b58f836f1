//! Virtual File System Collaborator
//!
//! The agent loop never touches storage directly. It sees a project through
//! the primitives below; the storage behind them (in-memory tree, a directory
//! on disk, a browser-side store) is somebody else's concern.
//!
//! All paths handed to a `VirtualFileSystem` are normalized absolute paths
//! (`/chapters/c1.tex`). Use [`normalize_path`] on anything the planner sends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Result of `stat` on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub is_directory: bool,
    /// Size in bytes (0 for directories)
    pub size: u64,
}

/// One entry returned by `readdir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name without its parent path
    pub name: String,
    /// Normalized absolute path of the entry
    pub path: String,
    pub is_directory: bool,
}

/// Read/write primitives the operation executor calls.
///
/// Implementations must be safe to share across tasks, but the agent loop
/// issues at most one call at a time.
#[async_trait]
pub trait VirtualFileSystem: Send + Sync {
    /// Read a file's full text content.
    async fn read_file(&self, path: &str) -> CoreResult<String>;

    /// Write (create or replace) a file. The parent directory must exist.
    async fn write_file(&self, path: &str, content: &str) -> CoreResult<()>;

    /// Remove a file.
    async fn unlink(&self, path: &str) -> CoreResult<()>;

    /// Create a single directory. The parent directory must exist.
    async fn mkdir(&self, path: &str) -> CoreResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &str) -> CoreResult<()>;

    /// Move a file or directory. The target's parent directory must exist.
    async fn rename(&self, source: &str, target: &str) -> CoreResult<()>;

    /// Stat a path.
    async fn stat(&self, path: &str) -> CoreResult<FileStat>;

    /// List the direct children of a directory, sorted by name.
    async fn readdir(&self, path: &str) -> CoreResult<Vec<DirEntry>>;

    /// Whether the path exists. Defaults to `stat` and maps not-found to `false`.
    async fn exists(&self, path: &str) -> CoreResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Normalize a planner-supplied path to the absolute `/`-separated form.
///
/// `a.tex`, `./a.tex`, `/a.tex` and `\a.tex` all normalize to `/a.tex`.
/// `..` segments are resolved; climbing above the root is rejected.
pub fn normalize_path(raw: &str) -> CoreResult<String> {
    let cleaned = raw.trim().replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in cleaned.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(CoreError::invalid_path(raw));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Parent directory of a normalized path. `None` for the root.
pub fn parent_of(path: &str) -> Option<String> {
    if path == "/" || path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => Some("/".to_string()),
    }
}

/// Whether `dir` is `path` itself or one of its ancestors.
pub fn is_same_or_ancestor(dir: &str, path: &str) -> bool {
    dir == "/" || dir == path || path.starts_with(&format!("{}/", dir))
}

/// Final segment of a normalized path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_variants() {
        assert_eq!(normalize_path("a.tex").unwrap(), "/a.tex");
        assert_eq!(normalize_path("./a.tex").unwrap(), "/a.tex");
        assert_eq!(normalize_path("/a.tex").unwrap(), "/a.tex");
        assert_eq!(normalize_path("\\chapters\\c1.tex").unwrap(), "/chapters/c1.tex");
        assert_eq!(normalize_path("/chapters//c1.tex/").unwrap(), "/chapters/c1.tex");
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(normalize_path("").unwrap(), "/");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path(".").unwrap(), "/");
    }

    #[test]
    fn test_normalize_parent_segments() {
        assert_eq!(normalize_path("/a/b/../c.tex").unwrap(), "/a/c.tex");
        assert!(normalize_path("../outside.tex").is_err());
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/chapters/c1.tex").as_deref(), Some("/chapters"));
        assert_eq!(parent_of("/main.tex").as_deref(), Some("/"));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn test_is_same_or_ancestor() {
        assert!(is_same_or_ancestor("/", "/a.tex"));
        assert!(is_same_or_ancestor("/a", "/a/b.tex"));
        assert!(is_same_or_ancestor("/a", "/a"));
        assert!(!is_same_or_ancestor("/a", "/ab/c.tex"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/chapters/c1.tex"), "c1.tex");
        assert_eq!(file_name("/main.tex"), "main.tex");
    }
}
