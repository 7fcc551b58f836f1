//! Duplicate Guard
//!
//! Detects the planner re-issuing an operation whose answer it already has.
//! A hit is a protocol violation and ends the task.

use texpilot_core::is_same_or_ancestor;
use texpilot_tools::{Operation, OperationKind};

use crate::models::history::HistoryEntry;

/// How many of the most recent history entries are inspected.
pub const DUPLICATE_LOOKBACK: usize = 3;

/// Find the earlier entry `candidate` duplicates, if any.
///
/// Two operations match when kind and action are equal and their targets
/// (normalized paths, search query, or no target at all) are equal. Failed
/// entries never match, so a failed read may be retried. A read also stops
/// matching once a later write in the window made its answer stale.
pub fn find_duplicate<'a>(
    candidate: &Operation,
    history: &'a [HistoryEntry],
) -> Option<&'a HistoryEntry> {
    if candidate.kind == OperationKind::Complete {
        return None;
    }
    let start = history.len().saturating_sub(DUPLICATE_LOOKBACK);
    let window = &history[start..];
    let target = candidate.target();

    for (idx, entry) in window.iter().enumerate().rev() {
        let previous = &entry.operation;
        if !entry.result.success
            || previous.kind != candidate.kind
            || previous.action_name() != candidate.action_name()
            || previous.target() != target
        {
            continue;
        }
        if candidate.kind == OperationKind::Read && written_since(candidate, &window[idx + 1..]) {
            continue;
        }
        return Some(entry);
    }
    None
}

/// Boolean form of [`find_duplicate`].
pub fn is_duplicate(candidate: &Operation, history: &[HistoryEntry]) -> bool {
    find_duplicate(candidate, history).is_some()
}

/// Whether a successful write after the earlier read made its answer stale,
/// using the same reach as context invalidation: a write touching the read
/// path, something below it, or a directory containing it. Reads without a
/// path (structure, project info, current file, search) go stale on any
/// write.
fn written_since(read: &Operation, later: &[HistoryEntry]) -> bool {
    let read_paths = read.paths();
    later
        .iter()
        .filter(|entry| entry.result.success && entry.operation.kind == OperationKind::Write)
        .any(|entry| {
            read_paths.is_empty()
                || entry.operation.paths().iter().any(|written| {
                    read_paths.iter().any(|read| {
                        is_same_or_ancestor(written, read) || is_same_or_ancestor(read, written)
                    })
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::history::OperationHistory;
    use chrono::Utc;
    use serde_json::{json, Map, Value};
    use texpilot_tools::OperationResult;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn read(action: &str, value: Value) -> Operation {
        Operation::read(action, params(value))
    }

    fn result(op: &Operation, success: bool) -> OperationResult {
        OperationResult {
            success,
            kind: op.kind,
            action: op.action.clone(),
            payload: None,
            error: None,
            duration_ms: 0,
            finished_at: Utc::now(),
        }
    }

    fn history(ops: Vec<(Operation, bool)>) -> OperationHistory {
        let mut history = OperationHistory::new();
        for (op, ok) in ops {
            let r = result(&op, ok);
            history.record(op, r);
        }
        history
    }

    #[test]
    fn test_repeated_read_is_duplicate() {
        let h = history(vec![
            (read("read_file", json!({"file_path": "/a.tex"})), true),
            (read("list_files", json!({"directory_path": "/"})), true),
        ]);
        let again = read("read_file", json!({"file_path": "/a.tex"}));
        let other = read("read_file", json!({"file_path": "/b.tex"}));
        assert_eq!(find_duplicate(&again, h.entries()).unwrap().sequence_number, 1);
        assert!(!is_duplicate(&other, h.entries()));
    }

    #[test]
    fn test_paths_compared_normalized() {
        let mut first = read("read_file", json!({"file_path": "./a.tex"}));
        first.normalize_paths();
        let h = history(vec![(first, true)]);
        let mut again = read("read_file", json!({"file_path": "a.tex"}));
        again.normalize_paths();
        assert!(is_duplicate(&again, h.entries()));
    }

    #[test]
    fn test_parameterless_actions_always_duplicate() {
        let h = history(vec![(read("get_file_structure", json!({})), true)]);
        let again = read("get_file_structure", json!({"ignored": "x"}));
        assert!(is_duplicate(&again, h.entries()));
    }

    #[test]
    fn test_lookback_window_is_three() {
        let h = history(vec![
            (read("get_project_info", json!({})), true),
            (read("read_file", json!({"file_path": "/a.tex"})), true),
            (read("read_file", json!({"file_path": "/b.tex"})), true),
            (read("read_file", json!({"file_path": "/c.tex"})), true),
        ]);
        assert!(!is_duplicate(&read("get_project_info", json!({})), h.entries()));
    }

    #[test]
    fn test_failed_entries_ignored() {
        let h = history(vec![(
            read("read_file", json!({"file_path": "/a.tex"})),
            false,
        )]);
        assert!(!is_duplicate(
            &read("read_file", json!({"file_path": "/a.tex"})),
            h.entries()
        ));
    }

    #[test]
    fn test_read_after_write_to_same_path_allowed() {
        let h = history(vec![
            (read("read_file", json!({"file_path": "/a.tex"})), true),
            (
                Operation::write(
                    "edit_file",
                    params(json!({"file_path": "/a.tex", "content": "x"})),
                ),
                true,
            ),
        ]);
        assert!(!is_duplicate(
            &read("read_file", json!({"file_path": "/a.tex"})),
            h.entries()
        ));
    }

    #[test]
    fn test_read_of_written_file_is_not_duplicate_of_write() {
        let h = history(vec![(
            Operation::write(
                "create_file",
                params(json!({"file_path": "/chapters/c1.tex", "content": "x"})),
            ),
            true,
        )]);
        assert!(!is_duplicate(
            &read("read_file", json!({"file_path": "/chapters/c1.tex"})),
            h.entries()
        ));
    }

    fn write(action: &str, value: Value) -> Operation {
        Operation::write(action, params(value))
    }

    #[test]
    fn test_listing_after_write_inside_directory_allowed() {
        let h = history(vec![
            (read("list_files", json!({"directory_path": "/ch"})), true),
            (write("create_file", json!({"file_path": "/ch/b.tex", "content": "b"})), true),
        ]);
        assert!(!is_duplicate(
            &read("list_files", json!({"directory_path": "/ch"})),
            h.entries()
        ));
    }

    #[test]
    fn test_file_read_after_directory_move_allowed() {
        let h = history(vec![
            (read("read_file", json!({"file_path": "/ch/a.tex"})), true),
            (
                write(
                    "move_file",
                    json!({"source_path": "/ch", "target_path": "/chapters"}),
                ),
                true,
            ),
        ]);
        assert!(!is_duplicate(
            &read("read_file", json!({"file_path": "/ch/a.tex"})),
            h.entries()
        ));
    }

    #[test]
    fn test_unrelated_write_keeps_read_duplicate() {
        let h = history(vec![
            (read("list_files", json!({"directory_path": "/ch"})), true),
            (write("create_file", json!({"file_path": "/other.tex", "content": "x"})), true),
        ]);
        assert!(is_duplicate(
            &read("list_files", json!({"directory_path": "/ch"})),
            h.entries()
        ));
    }

    #[test]
    fn test_parameterless_read_after_any_write_allowed() {
        for action in ["get_file_structure", "get_project_info"] {
            let h = history(vec![
                (read(action, json!({})), true),
                (write("create_directory", json!({"directory_path": "/figures"})), true),
            ]);
            assert!(!is_duplicate(&read(action, json!({})), h.entries()), "{}", action);
        }
    }

    #[test]
    fn test_failed_write_keeps_read_duplicate() {
        let h = history(vec![
            (read("get_file_structure", json!({})), true),
            (write("delete_file", json!({"file_path": "/missing.tex"})), false),
        ]);
        assert!(is_duplicate(&read("get_file_structure", json!({})), h.entries()));
    }

    #[test]
    fn test_root_listing_with_and_without_directory_match() {
        let h = history(vec![(read("list_files", json!({"directory_path": "/"})), true)]);
        assert!(is_duplicate(&read("list_files", json!({})), h.entries()));

        let h = history(vec![(read("list_files", json!({})), true)]);
        assert!(is_duplicate(
            &read("list_files", json!({"directory_path": "/"})),
            h.entries()
        ));
    }

    #[test]
    fn test_repeated_write_is_duplicate() {
        let write = Operation::write(
            "create_file",
            params(json!({"file_path": "/a.tex", "content": "x"})),
        );
        let h = history(vec![(write.clone(), true)]);
        assert!(is_duplicate(&write, h.entries()));
    }

    #[test]
    fn test_searches_compare_query() {
        let h = history(vec![(read("search_in_files", json!({"query": "Theorem"})), true)]);
        assert!(is_duplicate(
            &read("search_in_files", json!({"query": "theorem"})),
            h.entries()
        ));
        assert!(!is_duplicate(
            &read("search_in_files", json!({"query": "lemma"})),
            h.entries()
        ));
    }

    #[test]
    fn test_complete_never_duplicate() {
        let h = history(vec![(Operation::complete("a"), true)]);
        assert!(!is_duplicate(&Operation::complete("a"), h.entries()));
    }
}
