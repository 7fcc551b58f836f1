//! Prompt Builder
//!
//! Renders the system prompt and the single user turn sent each iteration.
//! The user turn carries the task request, everything already known
//! (session context) and the operations performed so far.

use std::fmt::Write as _;

use serde_json::Value;

use texpilot_tools::build_operation_instructions;

use crate::models::context::SessionContext;
use crate::models::history::{HistoryEntry, OperationHistory};
use crate::models::settings::ContextSettings;

const SYSTEM_PREAMBLE: &str = "You are an assistant that edits a LaTeX document project. \
You cannot see the project directly: you inspect and change it one operation at a time, \
and after each operation you receive everything learned so far.";

/// Search hits rendered per history entry.
const SEARCH_HITS_SHOWN: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    settings: ContextSettings,
}

impl PromptBuilder {
    pub fn new(settings: ContextSettings) -> Self {
        Self { settings }
    }

    pub fn system_prompt(&self) -> String {
        format!("{}\n\n{}", SYSTEM_PREAMBLE, build_operation_instructions())
    }

    /// User message for the next turn.
    pub fn turn_message(
        &self,
        request: &str,
        context: &SessionContext,
        history: &OperationHistory,
    ) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Task\n{}\n", request.trim());

        out.push_str("## Already known\n");
        let known_len = out.len();
        self.render_known(&mut out, context);
        if out.len() == known_len {
            out.push_str("Nothing yet.\n");
        }
        out.push('\n');

        if !context.recent_writes.is_empty() {
            out.push_str("## Written during this task\n");
            for (path, record) in &context.recent_writes {
                let _ = writeln!(out, "- {} ({})", path, record.action);
            }
            out.push('\n');
        }

        out.push_str("## Operations so far\n");
        if history.is_empty() {
            out.push_str("None.\n");
        } else {
            let shown = history.tail(self.settings.history_display_limit);
            if shown.len() < history.len() {
                let _ = writeln!(
                    out,
                    "({} earlier operations omitted)",
                    history.len() - shown.len()
                );
            }
            for entry in shown {
                render_entry(&mut out, entry);
            }
        }
        let _ = write!(
            out,
            "\nStats: {} operations ({} reads, {} writes, {} failed).\n\n\
             Reply with the next single operation.",
            context.stats.total, context.stats.reads, context.stats.writes, context.stats.failed
        );
        out
    }

    fn render_known(&self, out: &mut String, context: &SessionContext) {
        if let Some(info) = &context.project_info {
            let _ = writeln!(
                out,
                "### Project\nname: {}\nmain file: {}\nfiles: {}, directories: {}",
                info.name,
                info.main_file.as_deref().unwrap_or("unknown"),
                info.file_count,
                info.directory_count
            );
        }
        if let Some(structure) = &context.known_file_structure {
            let _ = writeln!(out, "### File structure\n```\n{}```", structure.structure);
        }
        for (path, listing) in &context.directory_listings {
            let _ = writeln!(out, "### Directory {}", path);
            if listing.entries.is_empty() {
                out.push_str("(empty)\n");
            }
            for entry in &listing.entries {
                let suffix = if entry.is_directory { "/" } else { "" };
                let _ = writeln!(out, "- {}{}", entry.name, suffix);
            }
        }
        for (path, file) in &context.known_files {
            let marker = if context.current_file.as_deref() == Some(path.as_str()) {
                " (currently open)"
            } else {
                ""
            };
            let (content, truncated) = truncate_chars(&file.content, self.settings.max_file_chars);
            let _ = writeln!(out, "### File {}{}\n```latex\n{}", path, marker, content);
            if truncated {
                let _ = writeln!(
                    out,
                    "[... truncated, {} characters total]",
                    file.content.chars().count()
                );
            }
            out.push_str("```\n");
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn render_entry(out: &mut String, entry: &HistoryEntry) {
    let op = &entry.operation;
    let result = &entry.result;
    let status = if result.success {
        "ok".to_string()
    } else {
        format!(
            "FAILED: {}",
            result.error.as_deref().unwrap_or("unknown error")
        )
    };
    let _ = writeln!(out, "{}. {} -> {}", entry.sequence_number, op.describe(), status);

    if result.success && op.action_name() == "search_in_files" {
        if let Some(payload) = &result.payload {
            render_search(out, payload);
        }
    }
}

fn render_search(out: &mut String, payload: &Value) {
    let hits = payload
        .get("matches")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if hits.is_empty() {
        out.push_str("   no matches\n");
        return;
    }
    for hit in hits.iter().take(SEARCH_HITS_SHOWN) {
        let _ = writeln!(
            out,
            "   {}:{}: {}",
            hit.get("file_path").and_then(Value::as_str).unwrap_or("?"),
            hit.get("line").and_then(Value::as_u64).unwrap_or(0),
            hit.get("text").and_then(Value::as_str).unwrap_or("")
        );
    }
    if hits.len() > SEARCH_HITS_SHOWN {
        let _ = writeln!(out, "   ... {} more", hits.len() - SEARCH_HITS_SHOWN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::context::{FileStructure, KnownFile, WriteRecord};
    use chrono::Utc;
    use serde_json::{json, Map};
    use texpilot_tools::{Operation, OperationKind, OperationResult};

    fn builder(max_file_chars: usize) -> PromptBuilder {
        PromptBuilder::new(ContextSettings {
            max_file_chars,
            history_display_limit: 2,
        })
    }

    fn result(kind: OperationKind, success: bool, payload: Option<Value>) -> OperationResult {
        OperationResult {
            success,
            kind,
            action: None,
            payload,
            error: (!success).then(|| "file not found: /x.tex".to_string()),
            duration_ms: 0,
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_system_prompt_contains_protocol() {
        let prompt = PromptBuilder::default().system_prompt();
        assert!(prompt.contains("LaTeX"));
        assert!(prompt.contains("```operation"));
        assert!(prompt.contains("read_file"));
    }

    #[test]
    fn test_empty_context() {
        let msg = builder(100).turn_message(
            "Add an abstract",
            &SessionContext::new(),
            &OperationHistory::new(),
        );
        assert!(msg.starts_with("## Task\nAdd an abstract\n"));
        assert!(msg.contains("## Already known\nNothing yet."));
        assert!(msg.contains("## Operations so far\nNone."));
    }

    #[test]
    fn test_known_sections_rendered() {
        let mut ctx = SessionContext::new();
        ctx.known_file_structure = Some(FileStructure {
            structure: "/\n  main.tex\n".into(),
            files: vec!["/main.tex".into()],
            directories: vec![],
            captured_at: Utc::now(),
        });
        ctx.known_files.insert(
            "/main.tex".into(),
            KnownFile {
                content: "abcdefghij".into(),
                read_at: Utc::now(),
            },
        );
        ctx.recent_writes.insert(
            "/chapters/c1.tex".into(),
            WriteRecord {
                action: "create_file".into(),
                written_at: Utc::now(),
            },
        );
        let msg = builder(4).turn_message("t", &ctx, &OperationHistory::new());
        assert!(msg.contains("### File structure\n```\n/\n  main.tex\n```"));
        assert!(msg.contains("### File /main.tex\n```latex\nabcd\n[... truncated, 10 characters total]"));
        assert!(msg.contains("## Written during this task\n- /chapters/c1.tex (create_file)"));
    }

    #[test]
    fn test_history_limited_and_failures_shown() {
        let mut history = OperationHistory::new();
        let mut params = Map::new();
        params.insert("file_path".into(), json!("/x.tex"));
        for _ in 0..3 {
            history.record(
                Operation::read("read_file", params.clone()),
                result(OperationKind::Read, false, None),
            );
        }
        let msg = builder(100).turn_message("t", &SessionContext::new(), &history);
        assert!(msg.contains("(1 earlier operations omitted)"));
        assert!(msg.contains("3. read_file(/x.tex) -> FAILED: file not found: /x.tex"));
        assert!(!msg.contains("1. read_file"));
    }

    #[test]
    fn test_search_hits_rendered() {
        let mut history = OperationHistory::new();
        let mut params = Map::new();
        params.insert("query".into(), json!("theorem"));
        history.record(
            Operation::read("search_in_files", params),
            result(
                OperationKind::Read,
                true,
                Some(json!({"matches": [{"file_path": "/a.tex", "line": 3, "text": "\\begin{theorem}"}]})),
            ),
        );
        let msg = builder(100).turn_message("t", &SessionContext::new(), &history);
        assert!(msg.contains("   /a.tex:3: \\begin{theorem}"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
        assert_eq!(truncate_chars("hi", 5), ("hi", false));
    }
}
