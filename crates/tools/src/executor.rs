//! Operation Executor
//!
//! Dispatches a parsed [`Operation`] to the file system collaborator and
//! returns an [`OperationResult`] envelope.
//!
//! Two kinds of failure are kept apart:
//! - storage failures (missing file, wrong entry type, bad parameter) become
//!   a failed `OperationResult`; the loop keeps going
//! - contract failures (unknown action, a write action under `read` or the
//!   reverse) are an [`ExecutorError`]; the loop aborts

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use texpilot_core::{
    is_same_or_ancestor, normalize_path, parent_of, CoreError, ProjectWorkspace, VirtualFileSystem,
};

use crate::fs::ReadOnlyView;
use crate::operation::{catalog_kind, Operation, OperationKind, DEFAULT_LIST_DIRECTORY};

/// Maximum hits returned by `search_in_files`.
pub const MAX_SEARCH_RESULTS: usize = 50;

/// Result of executing one operation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl OperationResult {
    fn finish(op: &Operation, outcome: Result<Value, String>, started: Instant) -> Self {
        let (success, payload, error) = match outcome {
            Ok(payload) => (true, Some(payload), None),
            Err(error) => (false, None, Some(error)),
        };
        Self {
            success,
            kind: op.kind,
            action: op.action.clone(),
            payload,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        }
    }

    /// String field of the payload.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.as_ref()?.get(field)?.as_str()
    }
}

/// Contract violations that abort the task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("unknown {kind} action '{action}'")]
    UnknownAction { kind: OperationKind, action: String },

    #[error("capability violation: '{action}' is a {expected} action but arrived as {kind}")]
    CapabilityViolation {
        kind: OperationKind,
        action: String,
        expected: OperationKind,
    },
}

type Outcome = Result<Value, String>;

fn storage_err(e: CoreError) -> String {
    e.to_string()
}

fn required<'a>(op: &'a Operation, name: &str) -> Result<&'a str, String> {
    match op.str_param(name) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("missing required parameter '{}'", name)),
    }
}

fn required_path(op: &Operation, name: &str) -> Result<String, String> {
    normalize_path(required(op, name)?).map_err(storage_err)
}

/// Executes operations against a file system and a workspace.
pub struct OperationExecutor {
    fs: Arc<dyn VirtualFileSystem>,
    workspace: Arc<dyn ProjectWorkspace>,
}

impl OperationExecutor {
    pub fn new(fs: Arc<dyn VirtualFileSystem>, workspace: Arc<dyn ProjectWorkspace>) -> Self {
        Self { fs, workspace }
    }

    /// Execute one operation. Always timed.
    pub async fn execute(&self, op: &Operation) -> Result<OperationResult, ExecutorError> {
        let started = Instant::now();
        let action = op.action_name().to_string();

        let outcome = match op.kind {
            OperationKind::Complete => Ok(json!({
                "message": op.message.clone().unwrap_or_default(),
            })),
            kind => {
                let expected = catalog_kind(&action).ok_or_else(|| ExecutorError::UnknownAction {
                    kind,
                    action: action.clone(),
                })?;
                if expected != kind {
                    warn!(action = %action, kind = %kind, "capability violation");
                    return Err(ExecutorError::CapabilityViolation {
                        kind,
                        action,
                        expected,
                    });
                }
                match kind {
                    OperationKind::Read => {
                        let view = ReadOnlyView::new(self.fs.as_ref());
                        self.execute_read(&view, op, &action).await?
                    }
                    _ => self.execute_write(op, &action).await?,
                }
            }
        };

        let result = OperationResult::finish(op, outcome, started);
        debug!(
            operation = %op.describe(),
            success = result.success,
            duration_ms = result.duration_ms,
            "operation executed"
        );
        Ok(result)
    }

    async fn execute_read(
        &self,
        fs: &ReadOnlyView<'_>,
        op: &Operation,
        action: &str,
    ) -> Result<Outcome, ExecutorError> {
        Ok(match action {
            "read_file" => read_file(fs, op).await,
            "list_files" => list_files(fs, op).await,
            "get_file_structure" => get_file_structure(fs).await,
            "search_in_files" => search_in_files(fs, op).await,
            "get_project_info" => self
                .workspace
                .project_info()
                .await
                .map_err(storage_err)
                .and_then(|info| serde_json::to_value(info).map_err(|e| e.to_string())),
            "get_current_file" => match self.workspace.current_file().await {
                Ok(Some(current)) => Ok(json!({
                    "file_path": current.file_path,
                    "content": current.content,
                })),
                Ok(None) => Err("no file is currently open".to_string()),
                Err(e) => Err(storage_err(e)),
            },
            other => {
                return Err(ExecutorError::UnknownAction {
                    kind: OperationKind::Read,
                    action: other.to_string(),
                })
            }
        })
    }

    async fn execute_write(&self, op: &Operation, action: &str) -> Result<Outcome, ExecutorError> {
        Ok(match action {
            "create_file" => self.create_file(op).await,
            "edit_file" => self.edit_file(op).await,
            "delete_file" => self.delete_file(op).await,
            "create_directory" => self.create_directory(op).await,
            "delete_directory" => self.delete_directory(op).await,
            "move_file" => self.move_file(op).await,
            other => {
                return Err(ExecutorError::UnknownAction {
                    kind: OperationKind::Write,
                    action: other.to_string(),
                })
            }
        })
    }

    /// Create `dir` and any missing ancestors. Returns whether anything was
    /// created.
    async fn ensure_dir(&self, dir: &str) -> Result<bool, String> {
        let mut missing = Vec::new();
        let mut current = Some(dir.to_string());
        while let Some(d) = current {
            match self.fs.stat(&d).await {
                Ok(stat) if stat.is_directory => break,
                Ok(_) => return Err(format!("{} exists and is not a directory", d)),
                Err(e) if e.is_not_found() => {
                    current = parent_of(&d);
                    missing.push(d);
                }
                Err(e) => return Err(storage_err(e)),
            }
        }
        let created = !missing.is_empty();
        for d in missing.into_iter().rev() {
            self.fs.mkdir(&d).await.map_err(storage_err)?;
        }
        Ok(created)
    }

    async fn ensure_parent(&self, path: &str) -> Result<(), String> {
        if let Some(parent) = parent_of(path) {
            self.ensure_dir(&parent).await?;
        }
        Ok(())
    }

    async fn create_file(&self, op: &Operation) -> Outcome {
        let path = required_path(op, "file_path")?;
        let content = op
            .str_param("content")
            .ok_or("missing required parameter 'content'")?;

        let overwritten = match self.fs.stat(&path).await {
            Ok(stat) if stat.is_directory => return Err(format!("{} is a directory", path)),
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(storage_err(e)),
        };
        self.ensure_parent(&path).await?;
        self.fs.write_file(&path, content).await.map_err(storage_err)?;
        Ok(json!({
            "file_path": path,
            "overwritten": overwritten,
            "size": content.len(),
        }))
    }

    async fn edit_file(&self, op: &Operation) -> Outcome {
        let path = required_path(op, "file_path")?;
        let content = op
            .str_param("content")
            .ok_or("missing required parameter 'content'")?;
        let edit_type = op.str_param("edit_type").unwrap_or("replace");

        let existing = match self.fs.read_file(&path).await {
            Ok(existing) => existing,
            Err(e) if e.is_not_found() => {
                return Err(format!("{} does not exist; use create_file", path))
            }
            Err(e) => return Err(storage_err(e)),
        };

        let updated = match edit_type {
            "replace" => content.to_string(),
            "append" => {
                let mut updated = existing;
                if !updated.is_empty() && !updated.ends_with('\n') {
                    updated.push('\n');
                }
                updated.push_str(content);
                updated
            }
            other => {
                return Err(format!(
                    "unknown edit_type '{}' (expected replace or append)",
                    other
                ))
            }
        };
        self.fs.write_file(&path, &updated).await.map_err(storage_err)?;
        Ok(json!({
            "file_path": path,
            "edit_type": edit_type,
            "size": updated.len(),
        }))
    }

    async fn delete_file(&self, op: &Operation) -> Outcome {
        let path = required_path(op, "file_path")?;
        let stat = self.fs.stat(&path).await.map_err(storage_err)?;
        if stat.is_directory {
            return Err(format!("{} is a directory; use delete_directory", path));
        }
        self.fs.unlink(&path).await.map_err(storage_err)?;
        Ok(json!({ "file_path": path }))
    }

    async fn create_directory(&self, op: &Operation) -> Outcome {
        let path = required_path(op, "directory_path")?;
        let created = self.ensure_dir(&path).await?;
        Ok(json!({ "directory_path": path, "created": created }))
    }

    async fn delete_directory(&self, op: &Operation) -> Outcome {
        let path = required_path(op, "directory_path")?;
        if path == "/" {
            return Err("refusing to delete the project root".to_string());
        }
        let stat = self.fs.stat(&path).await.map_err(storage_err)?;
        if !stat.is_directory {
            return Err(format!("{} is not a directory; use delete_file", path));
        }

        let view = ReadOnlyView::new(self.fs.as_ref());
        let entries = view.walk(&path).await.map_err(storage_err)?;
        let mut removed_files = 0usize;
        for entry in entries.iter().filter(|e| !e.is_directory) {
            self.fs.unlink(&entry.path).await.map_err(storage_err)?;
            removed_files += 1;
        }
        // Deepest directories first
        let mut dirs: Vec<&str> = entries
            .iter()
            .filter(|e| e.is_directory)
            .map(|e| e.path.as_str())
            .collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
        for dir in dirs {
            self.fs.rmdir(dir).await.map_err(storage_err)?;
        }
        self.fs.rmdir(&path).await.map_err(storage_err)?;

        Ok(json!({ "directory_path": path, "removed_files": removed_files }))
    }

    async fn move_file(&self, op: &Operation) -> Outcome {
        let source = required_path(op, "source_path")?;
        let target = required_path(op, "target_path")?;
        if source == target {
            return Err("source and target are the same path".to_string());
        }
        if is_same_or_ancestor(&source, &target) {
            return Err(format!("cannot move {} into itself", source));
        }
        self.fs.stat(&source).await.map_err(storage_err)?;
        if self.fs.exists(&target).await.map_err(storage_err)? {
            return Err(format!("{} already exists", target));
        }
        self.ensure_parent(&target).await?;
        self.fs.rename(&source, &target).await.map_err(storage_err)?;
        Ok(json!({ "source_path": source, "target_path": target }))
    }
}

async fn read_file(fs: &ReadOnlyView<'_>, op: &Operation) -> Outcome {
    let path = required_path(op, "file_path")?;
    let content = fs.read_file(&path).await.map_err(storage_err)?;
    Ok(json!({
        "file_path": path,
        "size": content.len(),
        "content": content,
    }))
}

async fn list_files(fs: &ReadOnlyView<'_>, op: &Operation) -> Outcome {
    let path = match op.str_param("directory_path") {
        Some(raw) if !raw.trim().is_empty() => normalize_path(raw).map_err(storage_err)?,
        _ => DEFAULT_LIST_DIRECTORY.to_string(),
    };
    let entries = fs.readdir(&path).await.map_err(storage_err)?;
    Ok(json!({
        "directory_path": path,
        "entries": entries,
    }))
}

async fn get_file_structure(fs: &ReadOnlyView<'_>) -> Outcome {
    let entries = fs.walk("/").await.map_err(storage_err)?;
    let mut tree = String::from("/\n");
    let mut files = Vec::new();
    let mut directories = Vec::new();
    for entry in &entries {
        let depth = entry.path.matches('/').count();
        tree.push_str(&"  ".repeat(depth));
        tree.push_str(&entry.name);
        if entry.is_directory {
            tree.push('/');
            directories.push(entry.path.clone());
        } else {
            files.push(entry.path.clone());
        }
        tree.push('\n');
    }
    Ok(json!({
        "structure": tree,
        "files": files,
        "directories": directories,
    }))
}

async fn search_in_files(fs: &ReadOnlyView<'_>, op: &Operation) -> Outcome {
    let query = required(op, "query")?;
    let file_pattern = op
        .str_param("file_pattern")
        .filter(|p| !p.trim().is_empty())
        .unwrap_or("**/*");
    let pattern = glob::Pattern::new(file_pattern)
        .map_err(|e| format!("invalid file_pattern '{}': {}", file_pattern, e))?;
    let needle = query.to_lowercase();

    let entries = fs.walk("/").await.map_err(storage_err)?;
    let mut matches = Vec::new();
    let mut truncated = false;

    'files: for entry in entries.iter().filter(|e| !e.is_directory) {
        let relative = entry.path.trim_start_matches('/');
        if !pattern.matches(relative) && !pattern.matches(&entry.path) {
            continue;
        }
        let Ok(content) = fs.read_file(&entry.path).await else {
            continue;
        };
        for (idx, line) in content.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                if matches.len() == MAX_SEARCH_RESULTS {
                    truncated = true;
                    break 'files;
                }
                matches.push(json!({
                    "file_path": entry.path,
                    "line": idx + 1,
                    "text": line.trim(),
                }));
            }
        }
    }

    Ok(json!({
        "query": query,
        "file_pattern": file_pattern,
        "matches": matches,
        "truncated": truncated,
    }))
}
