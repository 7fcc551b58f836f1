//! Agent Service
//!
//! Owns the single task slot. A second task requested while one is
//! executing is rejected, never queued.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use texpilot_core::{ProjectWorkspace, VirtualFileSystem};
use texpilot_llm::{LlmProvider, OpenAIProvider, PlannerClient};
use texpilot_tools::{operation_tool_definitions, OperationExecutor};

use super::confirm::Confirmation;
use super::governor::IterationGovernor;
use super::orchestrator::{AgentLoop, TaskRun};
use super::prompt::PromptBuilder;
use crate::models::events::AgentEvent;
use crate::models::settings::AgentConfig;
use crate::models::task::TaskState;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone)]
struct RunningTask {
    task_id: String,
    pause: CancellationToken,
}

/// Clears the slot when the task ends, including on panic or drop.
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<RunningTask>>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

pub struct AgentService {
    agent: AgentLoop,
    iteration_cap: u32,
    running: Mutex<Option<RunningTask>>,
}

impl AgentService {
    pub fn new(agent: AgentLoop, iteration_cap: u32) -> Self {
        Self {
            agent,
            iteration_cap,
            running: Mutex::new(None),
        }
    }

    /// Wire a service from configuration using an OpenAI-compatible provider.
    pub fn from_config(
        config: &AgentConfig,
        fs: Arc<dyn VirtualFileSystem>,
        workspace: Arc<dyn ProjectWorkspace>,
        confirmation: Arc<dyn Confirmation>,
        events: Option<mpsc::Sender<AgentEvent>>,
    ) -> AppResult<Self> {
        let provider: Arc<dyn LlmProvider> =
            Arc::new(OpenAIProvider::new(config.provider.clone())?);
        Ok(Self::with_provider(
            config,
            provider,
            fs,
            workspace,
            confirmation,
            events,
        ))
    }

    /// Wire a service around an existing provider.
    pub fn with_provider(
        config: &AgentConfig,
        provider: Arc<dyn LlmProvider>,
        fs: Arc<dyn VirtualFileSystem>,
        workspace: Arc<dyn ProjectWorkspace>,
        confirmation: Arc<dyn Confirmation>,
        events: Option<mpsc::Sender<AgentEvent>>,
    ) -> Self {
        let planner = PlannerClient::new(provider, config.planner_client_config())
            .with_operation_tools(operation_tool_definitions());
        let mut agent = AgentLoop::new(
            Arc::new(planner),
            Arc::new(OperationExecutor::new(fs, workspace)),
            confirmation,
            IterationGovernor::from_settings(&config.governor),
            PromptBuilder::new(config.context.clone()),
        );
        if let Some(tx) = events {
            agent = agent.with_events(tx);
        }
        Self::new(agent, config.governor.iteration_cap)
    }

    /// Run a task to completion, stop, pause or abort.
    ///
    /// Fails only when another task is already executing.
    pub async fn run_task(&self, request: &str) -> AppResult<TaskRun> {
        let state = TaskState::new(self.iteration_cap);
        let pause = CancellationToken::new();
        {
            let mut slot = self
                .running
                .lock()
                .map_err(|_| AppError::internal("task slot lock poisoned"))?;
            if let Some(current) = slot.as_ref() {
                return Err(AppError::TaskAlreadyRunning {
                    task_id: current.task_id.clone(),
                });
            }
            *slot = Some(RunningTask {
                task_id: state.task_id.clone(),
                pause: pause.clone(),
            });
        }
        let _guard = SlotGuard {
            slot: &self.running,
        };

        Ok(self.agent.run(request, state, &pause).await)
    }

    /// Ask the running task to pause at its next turn boundary.
    /// Returns false when nothing is running.
    pub fn pause(&self) -> bool {
        let Ok(slot) = self.running.lock() else {
            return false;
        };
        match slot.as_ref() {
            Some(task) => {
                info!(task_id = %task.task_id, "pause requested");
                task.pause.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_executing(&self) -> bool {
        self.running
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}
