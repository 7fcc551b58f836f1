//! Agent Loop
//!
//! Drives one task: ask the planner for an operation, parse it, check it
//! against recent history, execute it and fold the result into the session
//! context. Repeats until the planner completes, the operator stops, a pause
//! is requested or a fatal error occurs.
//!
//! The loop is strictly sequential. A pause is honoured at the top of a turn
//! (or while waiting on the planner), never in the middle of an operation.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use texpilot_llm::{LlmError, LlmResult, Message, PlannerChunk, PlannerClient, PlannerResponse};
use texpilot_tools::{
    parse_planner_response, ExecutorError, Operation, OperationExecutor, OperationKind,
    OperationResult,
};

use super::accumulator::fold;
use super::confirm::Confirmation;
use super::duplicate_guard::find_duplicate;
use super::governor::{GovernorState, IterationGovernor};
use super::prompt::PromptBuilder;
use crate::models::context::SessionContext;
use crate::models::events::AgentEvent;
use crate::models::history::OperationHistory;
use crate::models::task::{AbortReason, TaskState, TaskStatus, TaskSummary};

/// Everything a finished task leaves behind.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub summary: TaskSummary,
    pub history: OperationHistory,
    pub context: SessionContext,
    pub state: TaskState,
}

/// How the loop ended.
#[derive(Debug)]
enum LoopEnd {
    Completed(String),
    Stopped(String),
    Paused,
    Aborted(AbortReason),
}

pub struct AgentLoop {
    planner: Arc<PlannerClient>,
    executor: Arc<OperationExecutor>,
    confirmation: Arc<dyn Confirmation>,
    governor: IterationGovernor,
    prompts: PromptBuilder,
    events: Option<mpsc::Sender<AgentEvent>>,
}

impl AgentLoop {
    pub fn new(
        planner: Arc<PlannerClient>,
        executor: Arc<OperationExecutor>,
        confirmation: Arc<dyn Confirmation>,
        governor: IterationGovernor,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            planner,
            executor,
            confirmation,
            governor,
            prompts,
            events: None,
        }
    }

    /// Send progress events (and streamed planner text) to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<AgentEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Run a task to a terminal state. Never fails: every ending is
    /// described by the returned summary.
    pub async fn run(&self, request: &str, mut state: TaskState, pause: &CancellationToken) -> TaskRun {
        state.executing = true;
        info!(task_id = %state.task_id, iteration_cap = state.iteration_cap, "task started");
        self.emit(AgentEvent::TaskStarted {
            task_id: state.task_id.clone(),
            request: request.to_string(),
        })
        .await;

        let system = self.prompts.system_prompt();
        let mut context = SessionContext::new();
        let mut history = OperationHistory::new();

        let end = loop {
            if pause.is_cancelled() {
                break LoopEnd::Paused;
            }

            if self.governor.begin_turn(&mut state) == GovernorState::AwaitingConfirmation {
                let message = IterationGovernor::confirmation_message(&state);
                self.emit(AgentEvent::AwaitingConfirmation {
                    message: message.clone(),
                    iteration_count: state.iteration_count,
                    iteration_cap: state.iteration_cap,
                })
                .await;
                let proceed = tokio::select! {
                    answer = self.confirmation.confirm(&message) => answer,
                    _ = pause.cancelled() => false,
                };
                if self.governor.resolve(&mut state, proceed) != GovernorState::Running {
                    break LoopEnd::Stopped(format!(
                        "Stopped by the operator after {} turns",
                        state.iteration_count.saturating_sub(1)
                    ));
                }
                self.emit(AgentEvent::CapExtended {
                    iteration_cap: state.iteration_cap,
                })
                .await;
            }

            self.emit(AgentEvent::TurnStarted {
                turn: state.iteration_count,
                iteration_cap: state.iteration_cap,
            })
            .await;

            let (op, result) = match self
                .turn(request, &system, &context, &history, pause)
                .await
            {
                Ok(step) => step,
                Err(end) => break end,
            };

            context = fold(&context, &op, &result);
            let is_complete = op.kind == OperationKind::Complete;
            let message = op.message.clone().unwrap_or_default();
            let entry = history.record(op, result);
            self.emit(AgentEvent::OperationCompleted {
                sequence_number: entry.sequence_number,
                result: entry.result.clone(),
            })
            .await;

            if is_complete {
                break LoopEnd::Completed(message);
            }
        };

        let summary = summarize(&mut state, &context, end);
        match summary.status {
            TaskStatus::Aborted => error!(
                task_id = %summary.task_id,
                reason = %summary.message,
                "task aborted"
            ),
            status => info!(
                task_id = %summary.task_id,
                status = %status,
                operations = summary.total_operations,
                "task finished"
            ),
        }
        self.emit(AgentEvent::TaskFinished {
            summary: summary.clone(),
        })
        .await;

        TaskRun {
            summary,
            history,
            context,
            state,
        }
    }

    /// One planner round plus execution.
    async fn turn(
        &self,
        request: &str,
        system: &str,
        context: &SessionContext,
        history: &OperationHistory,
        pause: &CancellationToken,
    ) -> Result<(Operation, OperationResult), LoopEnd> {
        let messages = vec![Message::user(
            self.prompts.turn_message(request, context, history),
        )];

        let response = match self.ask(&messages, system, pause).await {
            Ok(response) => response,
            Err(LlmError::Cancelled) => return Err(LoopEnd::Paused),
            Err(e) => {
                return Err(LoopEnd::Aborted(AbortReason::Transport {
                    message: e.to_string(),
                }))
            }
        };

        let op = match parse_planner_response(&response) {
            Ok(op) => op,
            Err(failure) => {
                warn!(reason = %failure.reason, "planner output rejected");
                self.emit(AgentEvent::PlannerReset).await;
                return Err(LoopEnd::Aborted(AbortReason::Protocol {
                    reason: failure.reason,
                    raw_text: failure.raw_text,
                }));
            }
        };

        let sequence_number = history.len() as u64 + 1;
        debug!(sequence_number, operation = %op.describe(), "operation parsed");
        self.emit(AgentEvent::OperationParsed {
            sequence_number,
            operation: op.clone(),
        })
        .await;

        if let Some(previous) = find_duplicate(&op, history.entries()) {
            warn!(
                operation = %op.describe(),
                previous = previous.sequence_number,
                "duplicate operation"
            );
            return Err(LoopEnd::Aborted(AbortReason::Duplicate {
                operation: op,
                previous_sequence: previous.sequence_number,
            }));
        }

        match self.executor.execute(&op).await {
            Ok(result) => Ok((op, result)),
            Err(e @ ExecutorError::CapabilityViolation { .. }) => {
                Err(LoopEnd::Aborted(AbortReason::CapabilityViolation {
                    message: e.to_string(),
                }))
            }
            Err(e @ ExecutorError::UnknownAction { .. }) => {
                Err(LoopEnd::Aborted(AbortReason::ExecutorContract {
                    message: e.to_string(),
                }))
            }
        }
    }

    /// Ask the planner, forwarding streamed text as events when anyone listens.
    async fn ask(
        &self,
        messages: &[Message],
        system: &str,
        pause: &CancellationToken,
    ) -> LlmResult<PlannerResponse> {
        let Some(events) = self.events.as_ref().filter(|_| self.planner.config().streaming) else {
            return self.planner.ask(messages, system, None, pause).await;
        };

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<PlannerChunk>(64);
        let planner = &self.planner;
        let ask = async move { planner.ask(messages, system, Some(&chunk_tx), pause).await };
        let forward = async {
            while let Some(chunk) = chunk_rx.recv().await {
                let event = match chunk {
                    PlannerChunk::Delta(text) => AgentEvent::PlannerDelta { text },
                    PlannerChunk::Reset => AgentEvent::PlannerReset,
                };
                let _ = events.send(event).await;
            }
        };
        let (result, ()) = tokio::join!(ask, forward);
        result
    }
}

fn summarize(state: &mut TaskState, context: &SessionContext, end: LoopEnd) -> TaskSummary {
    state.executing = false;
    let (status, message, abort) = match end {
        LoopEnd::Completed(message) => (TaskStatus::Completed, message, None),
        LoopEnd::Stopped(message) => (TaskStatus::Stopped, message, None),
        LoopEnd::Paused => {
            state.paused = true;
            (
                TaskStatus::Paused,
                format!("Paused after {} operations", context.stats.total),
                None,
            )
        }
        LoopEnd::Aborted(reason) => (TaskStatus::Aborted, reason.to_string(), Some(reason)),
    };
    TaskSummary {
        task_id: state.task_id.clone(),
        status,
        total_operations: context.stats.total,
        reads: context.stats.reads,
        writes: context.stats.writes,
        failed_operations: context.stats.failed,
        iteration_count: state.iteration_count,
        iteration_cap: state.iteration_cap,
        message,
        abort,
    }
}
