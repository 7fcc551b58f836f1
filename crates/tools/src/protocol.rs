//! Operation Protocol Codec
//!
//! Turns planner output into a single [`Operation`]. Planners rarely follow
//! the canonical shape exactly, so the codec:
//!
//! - extracts a candidate object from prose (tagged fence, first balanced
//!   object, the whole text, a bare `"type": ...` body)
//! - repairs undecodable JSON through the declared [`recovery`](crate::recovery)
//!   tables and fails hard when no rule applies
//! - normalizes alternate field names, action names placed in the `type`
//!   slot, wrapper objects and misplaced parameters
//! - de-escapes document content of write operations
//!
//! It also renders the protocol into system-prompt instructions and into
//! tool definitions for providers that negotiate operations natively.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use texpilot_llm::types::ToolDefinition;
use texpilot_llm::PlannerResponse;

use crate::operation::{action_spec, catalog_kind, Operation, OperationKind, CATALOG};
use crate::recovery::{apply_rules, repair_json, EscapeEvidence, CONTENT_RULES};

/// Fence tags that mark an operation block.
const FENCE_TAGS: &[&str] = &["operation", "json"];

/// Planner output that could not be turned into an operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
    /// The planner's raw output, kept for operator diagnostics
    pub raw_text: String,
}

impl ParseFailure {
    fn new(reason: impl Into<String>, raw_text: &str) -> Self {
        Self {
            reason: reason.into(),
            raw_text: raw_text.to_string(),
        }
    }
}

/// Parse a planner response resolved by the planner client.
pub fn parse_planner_response(response: &PlannerResponse) -> Result<Operation, ParseFailure> {
    match response {
        PlannerResponse::Text { text } => parse_operation(text),
        PlannerResponse::OperationCall { name, arguments } => {
            parse_operation_call(name, arguments)
        }
    }
}

/// Parse free planner text into an operation.
pub fn parse_operation(raw: &str) -> Result<Operation, ParseFailure> {
    let candidates = extract_candidates(raw);
    if candidates.is_empty() {
        return Err(ParseFailure::new("no operation object found in planner output", raw));
    }

    let mut first_error: Option<String> = None;
    for candidate in &candidates {
        match decode_candidate(candidate) {
            Ok((Value::Object(obj), evidence)) => {
                return normalize_object(obj, evidence)
                    .map_err(|reason| ParseFailure::new(reason, raw));
            }
            Ok(_) => {
                first_error.get_or_insert_with(|| "operation is not a JSON object".to_string());
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(ParseFailure::new(
        first_error.unwrap_or_else(|| "no operation object found in planner output".to_string()),
        raw,
    ))
}

/// Parse a natively negotiated operation call.
fn parse_operation_call(name: &str, arguments: &Value) -> Result<Operation, ParseFailure> {
    let raw = format!("{}({})", name, arguments);
    let (args, evidence) = match arguments {
        Value::Object(map) => (map.clone(), EscapeEvidence::default()),
        Value::String(s) if s.trim().is_empty() => (Map::new(), EscapeEvidence::default()),
        Value::String(s) => match decode_candidate(s) {
            Ok((Value::Object(map), evidence)) => (map, evidence),
            Ok(_) => return Err(ParseFailure::new("operation arguments are not an object", &raw)),
            Err(e) => return Err(ParseFailure::new(e, &raw)),
        },
        Value::Null => (Map::new(), EscapeEvidence::default()),
        _ => return Err(ParseFailure::new("operation arguments are not an object", &raw)),
    };

    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(name.to_string()));
    let mut parameters = args;
    for field in ["reasoning", "message"] {
        if let Some(v) = parameters.remove(field) {
            obj.insert(field.to_string(), v);
        }
    }
    obj.insert("parameters".to_string(), Value::Object(parameters));
    normalize_object(obj, evidence).map_err(|reason| ParseFailure::new(reason, &raw))
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn extract_candidates(text: &str) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |c: &str| {
        let c = c.trim();
        if !c.is_empty() && !candidates.iter().any(|existing| existing == c) {
            candidates.push(c.to_string());
        }
    };

    for block in tagged_fences(text) {
        push(block);
    }
    if let Some(span) = first_balanced_object(text) {
        push(span);
    }
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        push(trimmed);
    }
    if !trimmed.contains('{') && trimmed.starts_with("\"type\"") {
        push(&format!("{{{}}}", trimmed));
    }
    candidates
}

/// Bodies of fenced blocks tagged with one of [`FENCE_TAGS`].
fn tagged_fences(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut remaining = text;
    while let Some(start) = remaining.find("```") {
        let after_marker = &remaining[start + 3..];
        let (tag, body) = match after_marker.find('\n') {
            Some(nl) => (&after_marker[..nl], &after_marker[nl + 1..]),
            None => break,
        };
        let Some(end) = body.find("```") else {
            break;
        };
        let tag = tag.trim();
        if FENCE_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
            blocks.push(&body[..end]);
        }
        remaining = &body[end + 3..];
    }
    blocks
}

/// First `{...}` span that is balanced outside of JSON strings and opens
/// like an object (`{` followed by a quote or `}`).
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('{') {
        let start = search_from + rel;
        let opens_object = text[start + 1..]
            .trim_start()
            .starts_with(|c| c == '"' || c == '}');
        if opens_object {
            if let Some(end) = balanced_end(bytes, start) {
                return Some(&text[start..=end]);
            }
        }
        search_from = start + 1;
    }
    None
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn decode_candidate(candidate: &str) -> Result<(Value, EscapeEvidence), String> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Ok((value, EscapeEvidence::default())),
        Err(original) => match repair_json(candidate) {
            Some((value, applied)) => {
                warn!(rules = ?applied, "repaired malformed operation JSON");
                Ok((value, EscapeEvidence::from_json_repairs(&applied)))
            }
            None => Err(format!("malformed operation JSON: {}", original)),
        },
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

const KIND_FIELDS: &[&str] = &["type", "kind"];
const ACTION_FIELDS: &[&str] = &["action", "tool_name", "tool", "name"];
const PARAM_FIELDS: &[&str] = &["parameters", "args", "arguments", "params"];
const REASONING_FIELDS: &[&str] = &["reasoning", "reason", "thought"];

/// Parameter aliases planners commonly emit, per canonical name.
const PARAM_ALIASES: &[(&str, &[&str])] = &[
    ("file_path", &["path", "filepath", "file", "filename"]),
    ("directory_path", &["path", "directory", "dir", "folder"]),
    ("source_path", &["source", "from", "src", "old_path"]),
    ("target_path", &["target", "to", "destination", "dest", "new_path"]),
    ("content", &["text", "body", "new_content"]),
    ("edit_type", &["mode", "edit_mode"]),
    ("query", &["search", "pattern", "q", "term"]),
    ("file_pattern", &["glob", "files", "include"]),
];

fn take_first_string(obj: &mut Map<String, Value>, fields: &[&str]) -> Option<String> {
    for field in fields {
        if let Some(Value::String(s)) = obj.get(*field) {
            let s = s.trim().to_string();
            obj.remove(*field);
            if !s.is_empty() {
                return Some(s);
            }
        }
    }
    None
}

/// Descend through `{"operation": {...}}`-style wrappers.
fn unwrap_wrappers(mut obj: Map<String, Value>) -> Map<String, Value> {
    for _ in 0..3 {
        let has_own_fields = KIND_FIELDS
            .iter()
            .chain(ACTION_FIELDS)
            .any(|f| obj.contains_key(*f));
        if has_own_fields || obj.len() != 1 {
            break;
        }
        match obj.into_iter().next() {
            Some((_, Value::Object(inner))) => obj = inner,
            Some((key, other)) => {
                let mut restored = Map::new();
                restored.insert(key, other);
                return restored;
            }
            None => return Map::new(),
        }
    }
    obj
}

fn normalize_object(
    obj: Map<String, Value>,
    evidence: EscapeEvidence,
) -> Result<Operation, String> {
    let mut obj = unwrap_wrappers(obj);

    let kind_raw = take_first_string(&mut obj, KIND_FIELDS).map(|k| k.to_lowercase());
    let mut action = take_first_string(&mut obj, ACTION_FIELDS);
    let reasoning = take_first_string(&mut obj, REASONING_FIELDS).unwrap_or_default();
    let message = take_first_string(&mut obj, &["message"]);

    let mut parameters = Map::new();
    for field in PARAM_FIELDS {
        match obj.remove(*field) {
            Some(Value::Object(map)) => {
                parameters = map;
                break;
            }
            Some(Value::String(s)) => {
                if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&s) {
                    parameters = map;
                    break;
                }
            }
            _ => {}
        }
    }

    let kind = match kind_raw.as_deref() {
        Some("read") => OperationKind::Read,
        Some("write") => OperationKind::Write,
        Some("complete") | Some("done") | Some("finish") | Some("finished") => {
            OperationKind::Complete
        }
        Some(other) => match catalog_kind(other) {
            Some(kind) => {
                debug!(action = other, "action name found in the type slot");
                if action.is_none() {
                    action = Some(other.to_string());
                }
                kind
            }
            None => return Err(format!("unrecognized operation type '{}'", other)),
        },
        None => match action.as_deref().and_then(catalog_kind) {
            Some(kind) => kind,
            None if action.as_deref() == Some("complete") => OperationKind::Complete,
            None => return Err("operation has no recognizable type".to_string()),
        },
    };

    if kind == OperationKind::Complete {
        let message = message
            .or_else(|| {
                parameters
                    .get("message")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
            })
            .filter(|m| !m.is_empty())
            .ok_or_else(|| "complete operation is missing its message".to_string())?;
        return Ok(Operation {
            kind,
            action: None,
            parameters: Map::new(),
            reasoning,
            message: Some(message),
        });
    }

    let action = action.ok_or_else(|| format!("{} operation has no action", kind))?;
    let spec = action_spec(&action).ok_or_else(|| format!("unknown action '{}'", action))?;

    // Parameters placed beside the action instead of inside `parameters`
    for param in spec.params {
        if !parameters.contains_key(param.name) {
            if let Some(value) = obj.remove(param.name) {
                parameters.insert(param.name.to_string(), value);
            }
        }
    }
    apply_param_aliases(spec.params.iter().map(|p| p.name), &mut parameters, &mut obj);

    let mut op = Operation {
        kind,
        action: Some(action),
        parameters,
        reasoning,
        message,
    };
    op.normalize_paths();

    if op.kind == OperationKind::Write {
        repair_content(&mut op, evidence);
    }

    Ok(op)
}

fn apply_param_aliases<'a>(
    accepted: impl Iterator<Item = &'a str>,
    parameters: &mut Map<String, Value>,
    top_level: &mut Map<String, Value>,
) {
    for canonical in accepted {
        if parameters.contains_key(canonical) {
            continue;
        }
        let Some((_, aliases)) = PARAM_ALIASES.iter().find(|(name, _)| *name == canonical) else {
            continue;
        };
        for alias in *aliases {
            if let Some(value) = parameters.remove(*alias).or_else(|| top_level.remove(*alias)) {
                parameters.insert(canonical.to_string(), value);
                break;
            }
        }
    }
}

fn repair_content(op: &mut Operation, evidence: EscapeEvidence) {
    let Some(Value::String(content)) = op.parameters.get_mut("content") else {
        return;
    };
    let recovered = apply_rules(CONTENT_RULES, content, evidence);
    if !recovered.applied.is_empty() {
        warn!(
            action = op.action.as_deref().unwrap_or_default(),
            rules = ?recovered.applied,
            "de-escaped document content"
        );
        *content = recovered.text;
    }
}

// ---------------------------------------------------------------------------
// Prompt rendering
// ---------------------------------------------------------------------------

fn render_catalog(kind: OperationKind) -> String {
    let mut out = String::new();
    for spec in CATALOG.iter().filter(|s| s.kind == kind) {
        let params: Vec<String> = spec
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        out.push_str(&format!(
            "- `{}{{{}}}`: {}\n",
            spec.name,
            params.join(", "),
            spec.description
        ));
    }
    out
}

/// Protocol instructions for the system prompt.
pub fn build_operation_instructions() -> String {
    format!(
        r#"## Operation Protocol

Each response performs exactly ONE operation. Reply with a single fenced block:

```operation
{{"type": "read", "action": "read_file", "parameters": {{"file_path": "/main.tex"}}, "reasoning": "why this step"}}
```

Shapes:
- `{{"type": "read", "action": "<read action>", "parameters": {{...}}, "reasoning": "..."}}`
- `{{"type": "write", "action": "<write action>", "parameters": {{...}}, "reasoning": "..."}}`
- `{{"type": "complete", "message": "<summary for the user>", "reasoning": "..."}}`

### Read actions (never modify the project)
{reads}
### Write actions
{writes}
Rules:
- Paths are project-absolute, e.g. `/chapters/intro.tex`.
- `content` holds the complete text; escape backslashes as JSON requires (`\\section`).
- Information listed under "Already known" is current. Do not request it again;
  repeating an operation ends the task.
- Finish with a `complete` operation once the request is satisfied.
"#,
        reads = render_catalog(OperationKind::Read),
        writes = render_catalog(OperationKind::Write),
    )
}

/// The catalog as tool definitions, plus a `complete` tool.
pub fn operation_tool_definitions() -> Vec<ToolDefinition> {
    let mut tools: Vec<ToolDefinition> = CATALOG
        .iter()
        .map(|spec| {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for p in spec.params {
                properties.insert(
                    p.name.to_string(),
                    serde_json::json!({"type": "string", "description": p.description}),
                );
                if p.required {
                    required.push(Value::String(p.name.to_string()));
                }
            }
            properties.insert(
                "reasoning".to_string(),
                serde_json::json!({"type": "string", "description": "Why this step"}),
            );
            ToolDefinition {
                name: spec.name.to_string(),
                description: format!("[{}] {}", spec.kind, spec.description),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }),
            }
        })
        .collect();

    tools.push(ToolDefinition {
        name: "complete".to_string(),
        description: "Finish the task with a summary for the user".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Summary for the user"},
                "reasoning": {"type": "string", "description": "Why the task is done"}
            },
            "required": ["message"],
        }),
    });
    tools
}
