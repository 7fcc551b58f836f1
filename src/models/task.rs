//! Task Models
//!
//! Per-task state, terminal status and the summary every terminal path
//! reports.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use texpilot_tools::Operation;

/// State of one task. Never shared between tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub task_id: String,
    pub paused: bool,
    pub executing: bool,
    pub iteration_cap: u32,
    pub iteration_count: u32,
}

impl TaskState {
    pub fn new(iteration_cap: u32) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            paused: false,
            executing: false,
            iteration_cap,
            iteration_count: 0,
        }
    }
}

/// Terminal status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The planner issued `complete`
    Completed,
    /// The operator declined to extend the iteration cap
    Stopped,
    /// A pause was requested
    Paused,
    /// A fatal error ended the task
    Aborted,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Stopped => write!(f, "stopped"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a task was aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// Planner transport failed after retries (or was not retryable)
    Transport { message: String },
    /// Planner output could not be turned into an operation
    Protocol { reason: String, raw_text: String },
    /// A write action under `read` or the reverse
    CapabilityViolation { message: String },
    /// The planner repeated an operation it already has the answer to
    Duplicate {
        operation: Operation,
        previous_sequence: u64,
    },
    /// An action outside the catalog reached the executor
    ExecutorContract { message: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Transport { message } => write!(f, "planner transport failed: {}", message),
            AbortReason::Protocol { reason, .. } => {
                write!(f, "planner output could not be parsed: {}", reason)
            }
            AbortReason::CapabilityViolation { message } => write!(f, "{}", message),
            AbortReason::Duplicate {
                operation,
                previous_sequence,
            } => write!(
                f,
                "planner repeated {} (already done as operation #{})",
                operation.describe(),
                previous_sequence
            ),
            AbortReason::ExecutorContract { message } => write!(f, "{}", message),
        }
    }
}

/// Structured result of a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub total_operations: usize,
    pub reads: usize,
    pub writes: usize,
    pub failed_operations: usize,
    pub iteration_count: u32,
    pub iteration_cap: u32,
    /// Completion message, stop reason or abort description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl TaskSummary {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}
