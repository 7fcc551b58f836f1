//! File-System-Backed Project Workspace

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use texpilot_core::{
    file_name, normalize_path, CoreError, CoreResult, CurrentFile, ProjectInfo, ProjectWorkspace,
    VirtualFileSystem,
};

use crate::fs::ReadOnlyView;

/// Marker that identifies a document's root file.
const MAIN_FILE_MARKER: &str = "\\documentclass";

/// [`ProjectWorkspace`] derived from a [`VirtualFileSystem`].
///
/// The main file is the first `.tex` file (in path order) containing
/// `\documentclass`. The current file is whatever the host last set.
pub struct FsWorkspace {
    fs: Arc<dyn VirtualFileSystem>,
    name: String,
    current: RwLock<Option<String>>,
}

impl FsWorkspace {
    pub fn new(fs: Arc<dyn VirtualFileSystem>, name: impl Into<String>) -> Self {
        Self {
            fs,
            name: name.into(),
            current: RwLock::new(None),
        }
    }

    /// Set (or clear) the file the host considers open.
    pub fn set_current_file(&self, path: Option<&str>) -> CoreResult<()> {
        let normalized = path.map(normalize_path).transpose()?;
        let mut current = self
            .current
            .write()
            .map_err(|_| CoreError::internal("workspace lock poisoned"))?;
        *current = normalized;
        Ok(())
    }

    fn current_path(&self) -> CoreResult<Option<String>> {
        self.current
            .read()
            .map(|c| c.clone())
            .map_err(|_| CoreError::internal("workspace lock poisoned"))
    }
}

#[async_trait]
impl ProjectWorkspace for FsWorkspace {
    async fn project_info(&self) -> CoreResult<ProjectInfo> {
        let view = ReadOnlyView::new(self.fs.as_ref());
        let entries = view.walk("/").await?;

        let mut info = ProjectInfo {
            name: self.name.clone(),
            ..Default::default()
        };
        let mut extensions: BTreeMap<String, usize> = BTreeMap::new();

        for entry in &entries {
            if entry.is_directory {
                info.directory_count += 1;
                continue;
            }
            info.file_count += 1;
            if let Some((_, ext)) = file_name(&entry.path).rsplit_once('.') {
                *extensions.entry(ext.to_lowercase()).or_insert(0) += 1;
            }
            if info.main_file.is_none() && entry.path.ends_with(".tex") {
                let content = view.read_file(&entry.path).await.unwrap_or_default();
                if content.contains(MAIN_FILE_MARKER) {
                    info.main_file = Some(entry.path.clone());
                }
            }
        }
        info.extensions = extensions;
        Ok(info)
    }

    async fn current_file(&self) -> CoreResult<Option<CurrentFile>> {
        let Some(path) = self.current_path()? else {
            return Ok(None);
        };
        let content = self.fs.read_file(&path).await?;
        Ok(Some(CurrentFile {
            file_path: path,
            content,
        }))
    }
}
