//! Planner Client
//!
//! Wraps an [`LlmProvider`] with the transport policy the agent loop relies
//! on: per-attempt timeout, cooperative cancellation, bounded exponential
//! backoff on transient failures, and optional streaming of text deltas.
//!
//! A single call either streams free text or negotiates exactly one
//! operation through native tool calling, never both.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::LlmProvider;
use crate::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ToolCallMode, ToolDefinition,
};
use texpilot_core::streaming::UnifiedStreamEvent;

/// Base delay for the first retry.
const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Maximum delay between two attempts.
const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Delay after the failed attempt with the given zero-based index.
pub fn retry_delay(attempt: u32) -> Duration {
    let backoff = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(backoff.min(RETRY_MAX_DELAY_MS))
}

/// The planner's answer for one turn, resolved once at the client boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannerResponse {
    /// Free text expected to contain an operation object
    Text { text: String },
    /// A natively negotiated operation call
    OperationCall {
        name: String,
        arguments: serde_json::Value,
    },
}

impl PlannerResponse {
    /// Resolve a provider response. The first tool call wins over text.
    pub fn from_llm(response: LlmResponse) -> LlmResult<Self> {
        if response.tool_calls.len() > 1 {
            warn!(
                count = response.tool_calls.len(),
                "planner returned several operation calls, using the first"
            );
        }
        if let Some(call) = response.tool_calls.into_iter().next() {
            return Ok(PlannerResponse::OperationCall {
                name: call.name,
                arguments: call.arguments,
            });
        }
        match response.content {
            Some(text) if !text.trim().is_empty() => Ok(PlannerResponse::Text { text }),
            _ => Err(LlmError::ParseError {
                message: "planner returned an empty response".to_string(),
            }),
        }
    }

    /// Raw text for diagnostics.
    pub fn raw_text(&self) -> String {
        match self {
            PlannerResponse::Text { text } => text.clone(),
            PlannerResponse::OperationCall { name, arguments } => {
                format!("{}({})", name, arguments)
            }
        }
    }
}

/// Chunk delivered to a streaming sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerChunk {
    /// Incremental text
    Delta(String),
    /// The attempt that produced earlier deltas failed; discard them
    Reset,
}

/// Transport policy for planner calls.
#[derive(Debug, Clone)]
pub struct PlannerClientConfig {
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// Read free-text responses incrementally when a sink is supplied
    pub streaming: bool,
    /// Negotiate operations through native tool calling
    pub native_operations: bool,
}

impl Default for PlannerClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            request_timeout: Duration::from_secs(120),
            streaming: false,
            native_operations: false,
        }
    }
}

/// Planner client with retry, timeout and cancellation.
pub struct PlannerClient {
    provider: Arc<dyn LlmProvider>,
    config: PlannerClientConfig,
    operation_tools: Vec<ToolDefinition>,
}

impl PlannerClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: PlannerClientConfig) -> Self {
        Self {
            provider,
            config,
            operation_tools: Vec::new(),
        }
    }

    /// Tool definitions offered when native operation negotiation is on.
    pub fn with_operation_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.operation_tools = tools;
        self
    }

    pub fn config(&self) -> &PlannerClientConfig {
        &self.config
    }

    fn negotiates_operations(&self) -> bool {
        self.config.native_operations
            && self.provider.supports_tools()
            && !self.operation_tools.is_empty()
    }

    /// Ask the planner for the next operation.
    ///
    /// Deltas go to `sink` only when streaming is enabled and the call is not
    /// negotiating an operation natively. On a failed streamed attempt the
    /// sink receives [`PlannerChunk::Reset`] before the retry.
    pub async fn ask(
        &self,
        messages: &[Message],
        system: &str,
        sink: Option<&mpsc::Sender<PlannerChunk>>,
        cancel: &CancellationToken,
    ) -> LlmResult<PlannerResponse> {
        let negotiate = self.negotiates_operations();
        let stream_sink = if self.config.streaming && !negotiate {
            sink
        } else {
            None
        };

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }

            debug!(
                provider = self.provider.name(),
                model = self.provider.model(),
                attempt = attempt + 1,
                streaming = stream_sink.is_some(),
                negotiate,
                "planner request"
            );

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                result = tokio::time::timeout(
                    self.config.request_timeout,
                    self.attempt(messages, system, stream_sink, negotiate),
                ) => match result {
                    Ok(inner) => inner.and_then(PlannerResponse::from_llm),
                    Err(_) => Err(LlmError::Timeout {
                        seconds: self.config.request_timeout.as_secs(),
                    }),
                },
            };

            let err = match outcome {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if let Some(sink) = stream_sink {
                let _ = sink.send(PlannerChunk::Reset).await;
            }

            if !err.is_retryable() || attempt >= self.config.max_retries {
                return Err(err);
            }

            let wait = retry_delay(attempt);
            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "planner call failed, backing off"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        messages: &[Message],
        system: &str,
        sink: Option<&mpsc::Sender<PlannerChunk>>,
        negotiate: bool,
    ) -> LlmResult<LlmResponse> {
        let system = Some(system.to_string());

        if let Some(sink) = sink {
            let (tx, mut rx) = mpsc::channel::<UnifiedStreamEvent>(64);
            let call = self.provider.stream_message(
                messages.to_vec(),
                system,
                tx,
                LlmRequestOptions {
                    tool_call_mode: ToolCallMode::None,
                    ..Default::default()
                },
            );
            let forward = async {
                while let Some(event) = rx.recv().await {
                    if let UnifiedStreamEvent::TextDelta { content } = event {
                        let _ = sink.send(PlannerChunk::Delta(content)).await;
                    }
                }
            };
            let (result, ()) = tokio::join!(call, forward);
            return result;
        }

        let (tools, mode) = if negotiate {
            (self.operation_tools.clone(), ToolCallMode::Required)
        } else {
            (Vec::new(), ToolCallMode::None)
        };
        self.provider
            .send_message(
                messages.to_vec(),
                system,
                tools,
                LlmRequestOptions {
                    tool_call_mode: mode,
                    ..Default::default()
                },
            )
            .await
    }
}
