//! Shared fixtures: a scripted planner provider and service wiring over the
//! in-memory file system.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use texpilot::models::{AgentConfig, AgentEvent};
use texpilot::services::agent::{AgentService, AutoConfirm, Confirmation};
use texpilot_core::streaming::UnifiedStreamEvent;
use texpilot_llm::{
    LlmError, LlmProvider, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig,
    StopReason, ToolDefinition, UsageStats,
};
use texpilot_tools::{FsWorkspace, MemoryFileSystem};

/// One scripted planner reply.
pub enum Reply {
    Text(String),
    Fail(LlmError),
    /// Never answers; only a cancel ends the call
    Hang,
    /// Streamed deltas, concatenated into the final text
    Stream(Vec<String>),
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

fn response(content: String) -> LlmResponse {
    LlmResponse {
        content: Some(content),
        tool_calls: vec![],
        stop_reason: StopReason::EndTurn,
        usage: UsageStats::default(),
        model: "scripted".to_string(),
    }
}

pub struct ScriptedPlanner {
    config: ProviderConfig,
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            config: ProviderConfig::default(),
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// User turns the planner received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next(&self, messages: &[Message]) -> Reply {
        let prompt = messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Reply::Fail(LlmError::InvalidRequest {
                message: "script exhausted".to_string(),
            })
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedPlanner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn supports_tools(&self) -> bool {
        false
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        _tools: Vec<ToolDefinition>,
        _options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        match self.next(&messages) {
            Reply::Text(content) => Ok(response(content)),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
            Reply::Stream(parts) => Ok(response(parts.concat())),
        }
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        _options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        match self.next(&messages) {
            Reply::Stream(parts) => {
                for part in &parts {
                    let _ = tx
                        .send(UnifiedStreamEvent::TextDelta {
                            content: part.clone(),
                        })
                        .await;
                }
                Ok(response(parts.concat()))
            }
            Reply::Text(content) => Ok(response(content)),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Fenced operation block, the way a planner is told to answer.
pub fn fenced(json: &str) -> Reply {
    Reply::Text(format!("Next step.\n```operation\n{}\n```", json))
}

pub struct Harness {
    pub planner: Arc<ScriptedPlanner>,
    pub fs: Arc<MemoryFileSystem>,
    pub service: AgentService,
}

pub fn config(iteration_cap: u32) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.governor.iteration_cap = iteration_cap;
    config.planner.max_retries = 0;
    config
}

pub fn harness(files: &[(&str, &str)], replies: Vec<Reply>) -> Harness {
    harness_with(files, replies, config(25), Arc::new(AutoConfirm(false)), None)
}

pub fn harness_with(
    files: &[(&str, &str)],
    replies: Vec<Reply>,
    config: AgentConfig,
    confirmation: Arc<dyn Confirmation>,
    events: Option<mpsc::Sender<AgentEvent>>,
) -> Harness {
    let planner = ScriptedPlanner::new(replies);
    let fs = Arc::new(MemoryFileSystem::with_files(files.iter().copied()));
    let workspace = Arc::new(FsWorkspace::new(fs.clone(), "paper"));
    let service = AgentService::with_provider(
        &config,
        planner.clone(),
        fs.clone(),
        workspace,
        confirmation,
        events,
    );
    Harness {
        planner,
        fs,
        service,
    }
}
