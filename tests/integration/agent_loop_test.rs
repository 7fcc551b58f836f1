//! Agent Loop Integration Tests
//!
//! Drives the full loop (planner, codec, guard, executor, accumulator and
//! governor) against a scripted planner and the in-memory file system.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use texpilot::models::{AbortReason, AgentEvent, TaskStatus};
use texpilot::services::agent::{AutoConfirm, ChannelConfirmation};
use texpilot::AppError;
use texpilot_llm::LlmError;

use crate::support::{config, fenced, harness, harness_with, text, Reply};

const STRUCTURE: &str = r#"{"type": "read", "action": "get_file_structure", "parameters": {}, "reasoning": "look around"}"#;

fn complete(message: &str) -> Reply {
    fenced(&format!(
        r#"{{"type": "complete", "message": "{}", "reasoning": "done"}}"#,
        message
    ))
}

#[tokio::test]
async fn test_structure_then_complete() {
    let h = harness(
        &[("/main.tex", "\\documentclass{article}"), ("/chapters/intro.tex", "Hi")],
        vec![fenced(STRUCTURE), complete("Looked at the project")],
    );
    let run = h.service.run_task("Summarize the project").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert_eq!(run.summary.message, "Looked at the project");
    assert_eq!(run.summary.reads, 1);
    assert_eq!(run.summary.writes, 0);
    assert_eq!(run.summary.iteration_count, 2);
    assert_eq!(run.history.len(), 2);

    let prompts = h.planner.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Nothing yet."));
    let known = prompts[1]
        .split("## Operations so far")
        .next()
        .unwrap();
    assert!(known.contains("### File structure"));
    assert!(known.contains("intro.tex"));
    assert!(prompts[1].contains("1. get_file_structure() -> ok"));
}

#[tokio::test]
async fn test_repeated_structure_request_is_flagged() {
    let h = harness(
        &[("/main.tex", "x")],
        vec![fenced(STRUCTURE), fenced(STRUCTURE), complete("never reached")],
    );
    let run = h.service.run_task("Look around").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Aborted);
    match run.summary.abort {
        Some(AbortReason::Duplicate {
            previous_sequence, ..
        }) => assert_eq!(previous_sequence, 1),
        other => panic!("expected duplicate abort, got {:?}", other),
    }
    assert!(run.summary.message.contains("get_file_structure()"));
    assert_eq!(run.history.len(), 1);
}

#[tokio::test]
async fn test_create_then_read_back_is_permitted() {
    let h = harness(
        &[("/main.tex", "\\documentclass{book}")],
        vec![
            fenced(
                r#"{"type": "write", "action": "create_file", "parameters": {"file_path": "chapters/c1.tex", "content": "\\chapter{One}"}, "reasoning": "add chapter"}"#,
            ),
            fenced(
                r#"{"type": "read", "action": "read_file", "parameters": {"file_path": "/chapters/c1.tex"}, "reasoning": "verify"}"#,
            ),
            complete("Added chapter one"),
        ],
    );
    let run = h.service.run_task("Add a first chapter").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert_eq!(run.summary.writes, 1);
    assert_eq!(run.summary.reads, 1);
    assert_eq!(h.fs.files()["/chapters/c1.tex"], "\\chapter{One}");
    assert!(run.context.recent_writes.contains_key("/chapters/c1.tex"));
    assert_eq!(
        run.context.known_files["/chapters/c1.tex"].content,
        "\\chapter{One}"
    );

    let prompts = h.planner.prompts();
    assert!(prompts[1].contains("## Written during this task\n- /chapters/c1.tex (create_file)"));
}

#[tokio::test]
async fn test_edit_invalidates_known_file() {
    let h = harness(
        &[("/a.tex", "old")],
        vec![
            fenced(r#"{"type": "read", "action": "read_file", "parameters": {"file_path": "/a.tex"}}"#),
            fenced(
                r#"{"type": "write", "action": "edit_file", "parameters": {"file_path": "/a.tex", "content": "new", "edit_type": "replace"}}"#,
            ),
            complete("Edited"),
        ],
    );
    let run = h.service.run_task("Rewrite a.tex").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert!(!run.context.known_files.contains_key("/a.tex"));
    assert_eq!(h.fs.files()["/a.tex"], "new");
    assert!(!h.planner.prompts()[2].contains("### File /a.tex"));
}

#[tokio::test]
async fn test_relisting_directory_after_write_inside_it() {
    let list = r#"{"type": "read", "action": "list_files", "parameters": {"directory_path": "/ch"}}"#;
    let h = harness(
        &[("/ch/a.tex", "a")],
        vec![
            fenced(list),
            fenced(
                r#"{"type": "write", "action": "create_file", "parameters": {"file_path": "/ch/b.tex", "content": "b"}}"#,
            ),
            fenced(list),
            complete("Listed"),
        ],
    );
    let run = h.service.run_task("Add b.tex next to a.tex").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert_eq!(run.history.len(), 4);
    let prompts = h.planner.prompts();
    assert!(!prompts[2].contains("### Directory /ch"));
    assert!(prompts[3].contains("### Directory /ch\n- a.tex\n- b.tex"));
}

#[tokio::test]
async fn test_structure_requested_again_after_write() {
    let h = harness(
        &[("/main.tex", "x")],
        vec![
            fenced(STRUCTURE),
            fenced(
                r#"{"type": "write", "action": "create_directory", "parameters": {"directory_path": "/figures"}}"#,
            ),
            fenced(STRUCTURE),
            complete("Done"),
        ],
    );
    let run = h.service.run_task("Add a figures directory").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert_eq!(run.summary.reads, 2);
    let prompts = h.planner.prompts();
    assert!(!prompts[2].contains("### File structure"));
    assert!(prompts[3].contains("### File structure"));
    assert!(prompts[3].contains("figures"));
}

#[tokio::test]
async fn test_executor_failure_does_not_abort() {
    let h = harness(
        &[],
        vec![
            fenced(r#"{"type": "read", "action": "read_file", "parameters": {"file_path": "/missing.tex"}}"#),
            complete("Nothing to do"),
        ],
    );
    let run = h.service.run_task("Read missing").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert_eq!(run.summary.failed_operations, 1);
    assert!(h.planner.prompts()[1].contains("1. read_file(/missing.tex) -> FAILED"));
}

#[tokio::test]
async fn test_unparsable_output_aborts_with_raw_text() {
    let h = harness(&[], vec![text("I think we should look at main.tex first.")]);
    let run = h.service.run_task("Do something").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Aborted);
    match run.summary.abort {
        Some(AbortReason::Protocol { raw_text, .. }) => {
            assert_eq!(raw_text, "I think we should look at main.tex first.")
        }
        other => panic!("expected protocol abort, got {:?}", other),
    }
}

#[tokio::test]
async fn test_write_smuggled_under_read_is_rejected() {
    let h = harness(
        &[("/main.tex", "keep me")],
        vec![fenced(
            r#"{"type": "read", "action": "delete_file", "parameters": {"file_path": "/main.tex"}}"#,
        )],
    );
    let run = h.service.run_task("Clean up").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Aborted);
    assert!(matches!(
        run.summary.abort,
        Some(AbortReason::CapabilityViolation { .. })
    ));
    assert_eq!(h.fs.files()["/main.tex"], "keep me");
}

#[tokio::test]
async fn test_non_retryable_transport_error_aborts() {
    let h = harness(
        &[],
        vec![Reply::Fail(LlmError::AuthenticationFailed {
            message: "bad key".to_string(),
        })],
    );
    let run = h.service.run_task("Anything").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Aborted);
    assert!(matches!(run.summary.abort, Some(AbortReason::Transport { .. })));
    assert_eq!(h.planner.prompts().len(), 1);
}

#[tokio::test]
async fn test_governor_stop_after_cap() {
    let h = harness_with(
        &[("/a.tex", "a"), ("/b.tex", "b")],
        vec![
            fenced(r#"{"type": "read", "action": "read_file", "parameters": {"file_path": "/a.tex"}}"#),
            fenced(r#"{"type": "read", "action": "read_file", "parameters": {"file_path": "/b.tex"}}"#),
            complete("unreachable"),
        ],
        config(2),
        Arc::new(AutoConfirm(false)),
        None,
    );
    let run = h.service.run_task("Read both").await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Stopped);
    assert_eq!(run.summary.iteration_count, 3);
    assert_eq!(run.summary.iteration_cap, 2);
    assert_eq!(run.summary.total_operations, 2);
    assert_eq!(h.planner.prompts().len(), 2);
}

#[tokio::test]
async fn test_governor_continue_extends_cap() {
    let (confirm, mut requests) = ChannelConfirmation::new(1);
    let (event_tx, mut events) = mpsc::channel(64);
    let h = harness_with(
        &[("/a.tex", "a")],
        vec![
            fenced(r#"{"type": "read", "action": "read_file", "parameters": {"file_path": "/a.tex"}}"#),
            complete("Read it"),
        ],
        config(1),
        Arc::new(confirm),
        Some(event_tx),
    );

    let operator = tokio::spawn(async move {
        let request = requests.recv().await.unwrap();
        assert!(request.message.contains("Continue?"));
        request.answer(true);
    });
    let run = h.service.run_task("Read a").await.unwrap();
    operator.await.unwrap();

    assert_eq!(run.summary.status, TaskStatus::Completed);
    assert_eq!(run.summary.iteration_cap, 11);

    let mut saw_awaiting = false;
    let mut saw_extended = false;
    while let Ok(event) = events.try_recv() {
        match event {
            AgentEvent::AwaitingConfirmation { iteration_count, .. } => {
                assert_eq!(iteration_count, 2);
                saw_awaiting = true;
            }
            AgentEvent::CapExtended { iteration_cap } => {
                assert_eq!(iteration_cap, 11);
                saw_extended = true;
            }
            _ => {}
        }
    }
    assert!(saw_awaiting && saw_extended);
}

#[tokio::test]
async fn test_second_task_rejected_and_pause_honoured() {
    let h = Arc::new(harness(&[], vec![Reply::Hang]));

    let runner = {
        let h = h.clone();
        tokio::spawn(async move { h.service.run_task("Long task").await })
    };
    while !h.service.is_executing() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = h.service.run_task("Second task").await.unwrap_err();
    assert!(matches!(err, AppError::TaskAlreadyRunning { .. }));

    assert!(h.service.pause());
    let run = runner.await.unwrap().unwrap();
    assert_eq!(run.summary.status, TaskStatus::Paused);
    assert!(run.state.paused);
    assert!(!h.service.is_executing());
    assert!(!h.service.pause());
}

#[tokio::test]
async fn test_streamed_text_forwarded_as_events() {
    let mut cfg = config(25);
    cfg.planner.streaming = true;
    let (event_tx, mut events) = mpsc::channel(64);
    let h = harness_with(
        &[],
        vec![Reply::Stream(vec![
            "```operation\n{\"type\": \"complete\", ".to_string(),
            "\"message\": \"Nothing needed\"}\n```".to_string(),
        ])],
        cfg,
        Arc::new(AutoConfirm(false)),
        Some(event_tx),
    );
    let run = h.service.run_task("Check").await.unwrap();
    assert_eq!(run.summary.status, TaskStatus::Completed);

    let mut deltas = Vec::new();
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        match event {
            AgentEvent::PlannerDelta { text } => deltas.push(text),
            AgentEvent::TaskFinished { summary } => {
                assert_eq!(summary.message, "Nothing needed");
                finished = true;
            }
            _ => {}
        }
    }
    assert_eq!(deltas.len(), 2);
    assert!(finished);
}
