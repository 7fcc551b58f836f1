//! Context Accumulator
//!
//! Folds one operation result into a new [`SessionContext`]. The input
//! context is never modified, so a turn that fails later can be dropped
//! without undoing anything.
//!
//! Timestamps come from the result (`finished_at`), which keeps folding
//! deterministic: folding the same result twice yields the same context.

use serde_json::Value;
use tracing::debug;

use texpilot_core::{is_same_or_ancestor, DirEntry, ProjectInfo};
use texpilot_tools::{Operation, OperationKind, OperationResult};

use crate::models::context::{
    DirectoryListing, FileStructure, KnownFile, SessionContext, WriteRecord,
};

/// Return a new context with `result` folded in.
pub fn fold(context: &SessionContext, op: &Operation, result: &OperationResult) -> SessionContext {
    let mut next = context.clone();

    match op.kind {
        OperationKind::Complete => return next,
        OperationKind::Read => next.stats.reads += 1,
        OperationKind::Write => next.stats.writes += 1,
    }
    next.stats.total += 1;

    if !result.success {
        next.stats.failed += 1;
        return next;
    }

    let Some(payload) = result.payload.as_ref() else {
        return next;
    };

    match op.kind {
        OperationKind::Read => fold_read(&mut next, op.action_name(), payload, result),
        OperationKind::Write => fold_write(&mut next, op, result),
        OperationKind::Complete => {}
    }
    next
}

fn payload_string(payload: &Value, field: &str) -> Option<String> {
    payload.get(field)?.as_str().map(str::to_string)
}

fn payload_strings(payload: &Value, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn fold_read(next: &mut SessionContext, action: &str, payload: &Value, result: &OperationResult) {
    let at = result.finished_at;
    match action {
        "read_file" | "get_current_file" => {
            let (Some(path), Some(content)) = (
                payload_string(payload, "file_path"),
                payload_string(payload, "content"),
            ) else {
                return;
            };
            if action == "get_current_file" {
                next.current_file = Some(path.clone());
            }
            next.known_files.insert(path, KnownFile { content, read_at: at });
        }
        "list_files" => {
            let Some(path) = payload_string(payload, "directory_path") else {
                return;
            };
            let entries: Vec<DirEntry> = payload
                .get("entries")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            next.directory_listings.insert(
                path,
                DirectoryListing {
                    entries,
                    listed_at: at,
                },
            );
        }
        "get_file_structure" => {
            next.known_file_structure = Some(FileStructure {
                structure: payload_string(payload, "structure").unwrap_or_default(),
                files: payload_strings(payload, "files"),
                directories: payload_strings(payload, "directories"),
                captured_at: at,
            });
        }
        "get_project_info" => {
            if let Ok(info) = serde_json::from_value::<ProjectInfo>(payload.clone()) {
                next.project_info = Some(info);
            }
        }
        // Search hits are shown through the history section
        _ => {}
    }
}

fn fold_write(next: &mut SessionContext, op: &Operation, result: &OperationResult) {
    let paths: Vec<String> = op.paths().into_iter().map(str::to_string).collect();
    for path in &paths {
        invalidate(next, path);
        next.recent_writes.insert(
            path.clone(),
            WriteRecord {
                action: op.action_name().to_string(),
                written_at: result.finished_at,
            },
        );
    }
    next.known_file_structure = None;
    debug!(action = op.action_name(), paths = ?paths, "write invalidated cached reads");
}

/// Drop everything cached about `path`: the file itself, anything below it
/// (directory deletes and moves) and listings of any directory containing it.
fn invalidate(next: &mut SessionContext, path: &str) {
    next.known_files
        .retain(|known, _| !is_same_or_ancestor(path, known));
    next.directory_listings.retain(|dir, _| {
        !is_same_or_ancestor(dir, path) && !is_same_or_ancestor(path, dir)
    });
    if next
        .current_file
        .as_deref()
        .is_some_and(|current| is_same_or_ancestor(path, current))
    {
        next.current_file = None;
    }
}
