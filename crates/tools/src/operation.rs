//! Operation Model
//!
//! The single unit of work a planner turn produces, plus the fixed read and
//! write catalogs. The catalogs are disjoint; an action name alone decides
//! which kind it belongs to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use texpilot_core::normalize_path;

/// What an operation does to the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Complete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
            OperationKind::Complete => write!(f, "complete"),
        }
    }
}

/// One parameter an action accepts.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Catalog entry for one action.
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub name: &'static str,
    pub kind: OperationKind,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const fn param(name: &'static str, description: &'static str, required: bool) -> ParamSpec {
    ParamSpec {
        name,
        description,
        required,
    }
}

/// Every action the planner may request, read catalog first.
pub const CATALOG: &[ActionSpec] = &[
    ActionSpec {
        name: "read_file",
        kind: OperationKind::Read,
        description: "Read the full content of a file",
        params: &[param("file_path", "Path of the file to read", true)],
    },
    ActionSpec {
        name: "list_files",
        kind: OperationKind::Read,
        description: "List the direct children of a directory",
        params: &[param("directory_path", "Directory to list (default: /)", false)],
    },
    ActionSpec {
        name: "get_file_structure",
        kind: OperationKind::Read,
        description: "Get the complete file tree of the project",
        params: &[],
    },
    ActionSpec {
        name: "search_in_files",
        kind: OperationKind::Read,
        description: "Case-insensitive text search across project files",
        params: &[
            param("query", "Text to search for", true),
            param("file_pattern", "Glob selecting files to search (default: **/*)", false),
        ],
    },
    ActionSpec {
        name: "get_project_info",
        kind: OperationKind::Read,
        description: "Get project metadata: name, main document, file counts",
        params: &[],
    },
    ActionSpec {
        name: "get_current_file",
        kind: OperationKind::Read,
        description: "Get the file currently open in the editor",
        params: &[],
    },
    ActionSpec {
        name: "create_file",
        kind: OperationKind::Write,
        description: "Create a file (parent directories are created; an existing file is replaced)",
        params: &[
            param("file_path", "Path of the file to create", true),
            param("content", "Full file content", true),
        ],
    },
    ActionSpec {
        name: "edit_file",
        kind: OperationKind::Write,
        description: "Replace the content of an existing file or append to it",
        params: &[
            param("file_path", "Path of the file to edit", true),
            param("content", "New content (replace) or text to append", true),
            param("edit_type", "replace (default) or append", false),
        ],
    },
    ActionSpec {
        name: "delete_file",
        kind: OperationKind::Write,
        description: "Delete a file",
        params: &[param("file_path", "Path of the file to delete", true)],
    },
    ActionSpec {
        name: "create_directory",
        kind: OperationKind::Write,
        description: "Create a directory and any missing parents",
        params: &[param("directory_path", "Directory to create", true)],
    },
    ActionSpec {
        name: "delete_directory",
        kind: OperationKind::Write,
        description: "Delete a directory and everything inside it",
        params: &[param("directory_path", "Directory to delete", true)],
    },
    ActionSpec {
        name: "move_file",
        kind: OperationKind::Write,
        description: "Move or rename a file or directory",
        params: &[
            param("source_path", "Current path", true),
            param("target_path", "New path (must not exist)", true),
        ],
    },
];

/// Parameters holding project paths.
/// Directory `list_files` lists when none is given.
pub const DEFAULT_LIST_DIRECTORY: &str = "/";

pub const PATH_PARAMS: &[&str] = &["file_path", "directory_path", "source_path", "target_path"];

/// Look up an action in the catalog.
pub fn action_spec(action: &str) -> Option<&'static ActionSpec> {
    CATALOG.iter().find(|spec| spec.name == action)
}

/// The kind an action belongs to, if it is in the catalog.
pub fn catalog_kind(action: &str) -> Option<OperationKind> {
    action_spec(action).map(|spec| spec.kind)
}

/// Action names of one kind, in catalog order.
pub fn actions_of(kind: OperationKind) -> impl Iterator<Item = &'static str> {
    CATALOG
        .iter()
        .filter(move |spec| spec.kind == kind)
        .map(|spec| spec.name)
}

/// A parsed planner operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub reasoning: String,
    /// Completion message; required for `complete`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What the duplicate guard compares two same-action operations by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationTarget {
    /// One or more path parameters, normalized
    Path(String),
    /// Search query and file pattern
    Search { query: String, file_pattern: String },
    /// No distinguishing parameter
    Bare,
}

impl Operation {
    pub fn read(action: &str, parameters: Map<String, Value>) -> Self {
        Self {
            kind: OperationKind::Read,
            action: Some(action.to_string()),
            parameters,
            reasoning: String::new(),
            message: None,
        }
    }

    pub fn write(action: &str, parameters: Map<String, Value>) -> Self {
        Self {
            kind: OperationKind::Write,
            action: Some(action.to_string()),
            parameters,
            reasoning: String::new(),
            message: None,
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Complete,
            action: None,
            parameters: Map::new(),
            reasoning: String::new(),
            message: Some(message.into()),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// Action name, or `complete` for completion operations.
    pub fn action_name(&self) -> &str {
        self.action.as_deref().unwrap_or("complete")
    }

    /// String parameter by name.
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }

    /// Rewrite path parameters to their normalized absolute form.
    ///
    /// Paths that fail normalization are left untouched for the executor to
    /// reject.
    pub fn normalize_paths(&mut self) {
        for name in PATH_PARAMS {
            if let Some(Value::String(raw)) = self.parameters.get_mut(*name) {
                if let Ok(normalized) = normalize_path(raw) {
                    *raw = normalized;
                }
            }
        }
    }

    /// Paths this operation names, in parameter order. `list_files` without
    /// a directory names `/`, the directory it lists.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = PATH_PARAMS
            .iter()
            .filter_map(|name| self.str_param(name))
            .filter(|path| !path.trim().is_empty())
            .collect();
        if paths.is_empty() && self.action.as_deref() == Some("list_files") {
            paths.push(DEFAULT_LIST_DIRECTORY);
        }
        paths
    }

    /// Identity used for duplicate detection.
    pub fn target(&self) -> OperationTarget {
        let paths = self.paths();
        if !paths.is_empty() {
            return OperationTarget::Path(paths.join(" -> "));
        }
        if self.action.as_deref() == Some("search_in_files") {
            return OperationTarget::Search {
                query: self.str_param("query").unwrap_or_default().to_lowercase(),
                file_pattern: self.str_param("file_pattern").unwrap_or("**/*").to_string(),
            };
        }
        OperationTarget::Bare
    }

    /// Short human-readable form, e.g. `read_file(/main.tex)`.
    pub fn describe(&self) -> String {
        match self.kind {
            OperationKind::Complete => "complete".to_string(),
            _ => match self.target() {
                OperationTarget::Path(p) => format!("{}({})", self.action_name(), p),
                OperationTarget::Search { query, .. } => {
                    format!("{}(\"{}\")", self.action_name(), query)
                }
                OperationTarget::Bare => format!("{}()", self.action_name()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_catalogs_are_disjoint_and_complete() {
        let reads: Vec<_> = actions_of(OperationKind::Read).collect();
        let writes: Vec<_> = actions_of(OperationKind::Write).collect();
        assert_eq!(reads.len(), 6);
        assert_eq!(writes.len(), 6);
        assert!(reads.iter().all(|r| !writes.contains(r)));
        assert_eq!(catalog_kind("move_file"), Some(OperationKind::Write));
        assert_eq!(catalog_kind("get_current_file"), Some(OperationKind::Read));
        assert_eq!(catalog_kind("rm_rf"), None);
    }

    #[test]
    fn test_operation_serializes_canonical_shape() {
        let op = Operation::read("read_file", params(json!({"file_path": "/a.tex"})))
            .with_reasoning("need it");
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "read",
                "action": "read_file",
                "parameters": {"file_path": "/a.tex"},
                "reasoning": "need it"
            })
        );
    }

    #[test]
    fn test_normalize_paths() {
        let mut op = Operation::write(
            "move_file",
            params(json!({"source_path": "a.tex", "target_path": "./ch/../b.tex"})),
        );
        op.normalize_paths();
        assert_eq!(op.str_param("source_path"), Some("/a.tex"));
        assert_eq!(op.str_param("target_path"), Some("/b.tex"));
    }

    #[test]
    fn test_normalize_leaves_escaping_path() {
        let mut op = Operation::read("read_file", params(json!({"file_path": "../etc/passwd"})));
        op.normalize_paths();
        assert_eq!(op.str_param("file_path"), Some("../etc/passwd"));
    }

    #[test]
    fn test_target_identity() {
        let op = Operation::read("get_file_structure", Map::new());
        assert_eq!(op.target(), OperationTarget::Bare);

        let op = Operation::write(
            "move_file",
            params(json!({"source_path": "/a", "target_path": "/b"})),
        );
        assert_eq!(op.target(), OperationTarget::Path("/a -> /b".to_string()));

        let op = Operation::read("search_in_files", params(json!({"query": "Theorem"})));
        assert_eq!(
            op.target(),
            OperationTarget::Search {
                query: "theorem".to_string(),
                file_pattern: "**/*".to_string()
            }
        );
    }

    #[test]
    fn test_list_files_defaults_to_root() {
        let bare = Operation::read("list_files", Map::new());
        let root = Operation::read("list_files", params(json!({"directory_path": "/"})));
        let blank = Operation::read("list_files", params(json!({"directory_path": " "})));
        assert_eq!(bare.target(), root.target());
        assert_eq!(blank.target(), OperationTarget::Path("/".to_string()));
        assert_eq!(bare.describe(), "list_files(/)");
    }

    #[test]
    fn test_describe() {
        let op = Operation::read("read_file", params(json!({"file_path": "/main.tex"})));
        assert_eq!(op.describe(), "read_file(/main.tex)");
        assert_eq!(Operation::complete("done").describe(), "complete");
    }
}
