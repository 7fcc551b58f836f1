//! Texpilot LLM
//!
//! Planner-side transport for the agent loop:
//! - a provider abstraction with an OpenAI-compatible implementation
//!   (OpenAI, DeepSeek, Ollama, any self-hosted chat-completions endpoint)
//! - the SSE stream adapter and HTTP client factory
//! - [`PlannerClient`], which adds timeout, cancellation, retry with
//!   exponential backoff, and streaming resets on top of a provider

pub mod http_client;
pub mod openai;
pub mod planner;
pub mod provider;
pub mod streaming_adapters;
pub mod types;

// Re-export main types
pub use http_client::build_http_client;
pub use openai::OpenAIProvider;
pub use planner::{retry_delay, PlannerChunk, PlannerClient, PlannerClientConfig, PlannerResponse};
pub use provider::LlmProvider;
pub use streaming_adapters::{OpenAIAdapter, SseLineBuffer};
pub use types::*;
