//! Protocol Integration Tests
//!
//! Planner text through the codec and into the executor, the way the loop
//! uses them.

use std::sync::Arc;

use serde_json::json;

use texpilot_llm::PlannerResponse;
use texpilot_tools::{
    build_operation_instructions, operation_tool_definitions, parse_operation,
    parse_planner_response, ExecutorError, FsWorkspace, MemoryFileSystem, OperationExecutor,
    OperationKind, CATALOG,
};

fn executor(files: &[(&str, &str)]) -> (Arc<MemoryFileSystem>, OperationExecutor) {
    let fs = Arc::new(MemoryFileSystem::with_files(files.iter().copied()));
    let workspace = Arc::new(FsWorkspace::new(fs.clone(), "paper"));
    (fs.clone(), OperationExecutor::new(fs, workspace))
}

#[test]
fn test_canonical_operations_round_trip_fields() {
    let op = parse_operation(
        r#"{"type":"write","action":"edit_file","parameters":{"file_path":"/main.tex","content":"x","edit_type":"append"},"reasoning":"extend"}"#,
    )
    .unwrap();
    assert_eq!(op.kind, OperationKind::Write);
    assert_eq!(op.action.as_deref(), Some("edit_file"));
    assert_eq!(op.str_param("file_path"), Some("/main.tex"));
    assert_eq!(op.str_param("content"), Some("x"));
    assert_eq!(op.str_param("edit_type"), Some("append"));
    assert_eq!(op.reasoning, "extend");
}

#[test]
fn test_action_name_as_type_normalizes() {
    let op = parse_operation(r#"{"type":"get_project_info"}"#).unwrap();
    assert_eq!(op.kind, OperationKind::Read);
    assert_eq!(op.action.as_deref(), Some("get_project_info"));
    assert!(op.parameters.is_empty());
}

#[test]
fn test_every_catalog_action_normalizes_to_its_kind() {
    for spec in CATALOG {
        let raw = format!(r#"{{"type": "{}"}}"#, spec.name);
        let op = parse_operation(&raw).unwrap();
        assert_eq!(op.kind, spec.kind, "{}", spec.name);
        assert_eq!(op.action.as_deref(), Some(spec.name));
    }
}

#[test]
fn test_tool_name_and_args_adopted() {
    let op = parse_operation(
        r#"{"type":"read","tool_name":"list_files","args":{"directory_path":"chapters"}}"#,
    )
    .unwrap();
    assert_eq!(op.action.as_deref(), Some("list_files"));
    assert_eq!(op.str_param("directory_path"), Some("/chapters"));
}

#[test]
fn test_native_operation_call() {
    let response = PlannerResponse::OperationCall {
        name: "create_file".to_string(),
        arguments: json!({"file_path": "b.tex", "content": "B", "reasoning": "new"}),
    };
    let op = parse_planner_response(&response).unwrap();
    assert_eq!(op.kind, OperationKind::Write);
    assert_eq!(op.str_param("file_path"), Some("/b.tex"));
    assert_eq!(op.reasoning, "new");
}

#[test]
fn test_instructions_and_tools_cover_catalog() {
    let instructions = build_operation_instructions();
    let tools = operation_tool_definitions();
    for spec in CATALOG {
        assert!(instructions.contains(spec.name), "{}", spec.name);
        assert!(tools.iter().any(|t| t.name == spec.name), "{}", spec.name);
    }
    assert!(tools.iter().any(|t| t.name == "complete"));
}

#[tokio::test]
async fn test_parsed_write_executes() {
    let (fs, exec) = executor(&[]);
    let op = parse_operation(
        "Creating the bibliography.\n```json\n{\"type\": \"write\", \"action\": \"create_file\", \"parameters\": {\"file_path\": \"refs/main.bib\", \"content\": \"@book{a}\"}}\n```",
    )
    .unwrap();
    let result = exec.execute(&op).await.unwrap();
    assert!(result.success);
    assert_eq!(fs.files()["/refs/main.bib"], "@book{a}");
}

#[tokio::test]
async fn test_parsed_kind_mismatch_rejected_by_executor() {
    let (fs, exec) = executor(&[("/a.tex", "a")]);
    let op = parse_operation(
        r#"{"type":"read","action":"move_file","parameters":{"source_path":"/a.tex","target_path":"/b.tex"}}"#,
    )
    .unwrap();
    let err = exec.execute(&op).await.unwrap_err();
    assert!(matches!(err, ExecutorError::CapabilityViolation { .. }));
    assert!(fs.files().contains_key("/a.tex"));
}

#[test]
fn test_prose_without_operation_fails_with_raw_text() {
    let failure = parse_operation("Let me think about the structure first.").unwrap_err();
    assert_eq!(failure.raw_text, "Let me think about the structure first.");
}
