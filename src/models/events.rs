//! Agent Events
//!
//! Progress events emitted by the agent loop. Rendering is up to the host.

use serde::{Deserialize, Serialize};

use texpilot_tools::{Operation, OperationResult};

use super::task::TaskSummary;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    TaskStarted {
        task_id: String,
        request: String,
    },
    TurnStarted {
        turn: u32,
        iteration_cap: u32,
    },
    /// Incremental planner text
    PlannerDelta {
        text: String,
    },
    /// Discard planner text received since the turn started
    PlannerReset,
    OperationParsed {
        sequence_number: u64,
        operation: Operation,
    },
    OperationCompleted {
        sequence_number: u64,
        result: OperationResult,
    },
    AwaitingConfirmation {
        message: String,
        iteration_count: u32,
        iteration_cap: u32,
    },
    CapExtended {
        iteration_cap: u32,
    },
    TaskFinished {
        summary: TaskSummary,
    },
}
