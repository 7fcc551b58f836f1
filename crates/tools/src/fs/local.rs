//! Local Directory File System
//!
//! Serves a project directory on disk through `tokio::fs`. Every virtual
//! path is re-normalized and joined below the root, so `..` can never climb
//! out of it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use texpilot_core::{
    normalize_path, CoreError, CoreResult, DirEntry, FileStat, VirtualFileSystem,
};

/// [`VirtualFileSystem`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Root the file system at `root`, which must be an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CoreError::not_found(format!(
                "project directory {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> CoreResult<PathBuf> {
        let normalized = normalize_path(path)?;
        let relative = normalized.trim_start_matches('/');
        if relative.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(relative))
        }
    }
}

fn map_io(path: &str, err: std::io::Error) -> CoreError {
    match err.kind() {
        ErrorKind::NotFound => CoreError::not_found(path),
        ErrorKind::AlreadyExists => CoreError::already_exists(path),
        _ => CoreError::Io(err),
    }
}

async fn require_parent_dir(full: &Path, path: &str) -> CoreResult<()> {
    let Some(parent) = full.parent() else {
        return Err(CoreError::invalid_path(path));
    };
    match tokio::fs::metadata(parent).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(CoreError::storage(format!(
            "parent of {} is not a directory",
            path
        ))),
        Err(e) => Err(map_io(path, e)),
    }
}

#[async_trait]
impl VirtualFileSystem for LocalFileSystem {
    async fn read_file(&self, path: &str) -> CoreResult<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn write_file(&self, path: &str, content: &str) -> CoreResult<()> {
        let full = self.resolve(path)?;
        require_parent_dir(&full, path).await?;
        if tokio::fs::metadata(&full)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(CoreError::storage(format!("{} is a directory", path)));
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn unlink(&self, path: &str) -> CoreResult<()> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn mkdir(&self, path: &str) -> CoreResult<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn rmdir(&self, path: &str) -> CoreResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(CoreError::storage("cannot remove the root directory"));
        }
        tokio::fs::remove_dir(&full)
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn rename(&self, source: &str, target: &str) -> CoreResult<()> {
        let from = self.resolve(source)?;
        let to = self.resolve(target)?;
        if tokio::fs::try_exists(&to).await.map_err(|e| map_io(target, e))? {
            return Err(CoreError::already_exists(target));
        }
        require_parent_dir(&to, target).await?;
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| map_io(source, e))
    }

    async fn stat(&self, path: &str) -> CoreResult<FileStat> {
        let full = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| map_io(path, e))?;
        Ok(FileStat {
            is_directory: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    async fn readdir(&self, path: &str) -> CoreResult<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        let base = normalize_path(path)?;
        let mut reader = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| map_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| map_io(path, e))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_directory = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let child = if base == "/" {
                format!("/{}", name)
            } else {
                format!("{}/{}", base, name)
            };
            entries.push(DirEntry {
                name,
                path: child,
                is_directory,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();

        fs.mkdir("/chapters").await.unwrap();
        fs.write_file("chapters/c1.tex", "\\chapter{One}").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("chapters/c1.tex")).unwrap(),
            "\\chapter{One}"
        );
        let entries = fs.readdir("/chapters").await.unwrap();
        assert_eq!(entries[0].path, "/chapters/c1.tex");
        assert!(!entries[0].is_directory);
    }

    #[tokio::test]
    async fn test_escaping_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        let err = fs.read_file("../outside.txt").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        assert!(fs.read_file("/nope.tex").await.unwrap_err().is_not_found());
        assert!(!fs.exists("/nope.tex").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        fs.write_file("/a.tex", "a").await.unwrap();
        fs.write_file("/b.tex", "b").await.unwrap();
        let err = fs.rename("/a.tex", "/b.tex").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_write_over_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new(dir.path()).unwrap();
        fs.mkdir("/figures").await.unwrap();

        let err = fs.write_file("/figures", "x").await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(dir.path().join("figures").is_dir());

        fs.write_file("/figures/plot.tex", "x").await.unwrap();
        assert_eq!(fs.read_file("/figures/plot.tex").await.unwrap(), "x");
    }

    #[test]
    fn test_root_must_exist() {
        assert!(LocalFileSystem::new("/definitely/not/here/texpilot").is_err());
    }
}
