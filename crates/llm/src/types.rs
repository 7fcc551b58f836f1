//! LLM Types
//!
//! Core types for planner provider interactions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported provider types. All of them speak the OpenAI chat-completions
/// wire format; they differ in default endpoint and authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    DeepSeek,
    Ollama,
    /// Any other OpenAI-compatible endpoint; `base_url` is required
    Custom,
}

impl ProviderType {
    /// Default chat-completions endpoint for this provider.
    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAI => Some("https://api.openai.com/v1/chat/completions"),
            ProviderType::DeepSeek => Some("https://api.deepseek.com/chat/completions"),
            ProviderType::Ollama => Some("http://localhost:11434/v1/chat/completions"),
            ProviderType::Custom => None,
        }
    }

    /// Whether requests must carry an API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderType::Ollama | ProviderType::Custom)
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::DeepSeek => write!(f, "deepseek"),
            ProviderType::Ollama => write!(f, "ollama"),
            ProviderType::Custom => write!(f, "custom"),
        }
    }
}

/// Tool calling mode preference for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMode {
    /// Provider chooses when to call tools.
    #[default]
    Auto,
    /// Provider must answer with a tool call.
    Required,
    /// Disable tool calling for this request.
    None,
}

/// Per-request options for provider behavior.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmRequestOptions {
    /// Tool calling behavior for this request.
    #[serde(default)]
    pub tool_call_mode: ToolCallMode,
    /// Optional temperature override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_override: Option<f32>,
}

/// Configuration for an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The provider type
    #[serde(default = "default_provider")]
    pub provider: ProviderType,
    /// API key (not needed for Ollama)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL override (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model name to use
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Proxy URL (`http://`, `https://` or `socks5://`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_provider() -> ProviderType {
    ProviderType::OpenAI
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            base_url: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            proxy: None,
        }
    }
}

impl ProviderConfig {
    /// Endpoint to post chat requests to, honoring the override.
    pub fn endpoint(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .or_else(|| self.provider.default_base_url())
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message. The planner protocol is text-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Tool definition offered to providers that negotiate operations natively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: serde_json::Value,
}

/// A tool call returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    ContentFilter,
    Other(String),
}

impl From<&str> for StopReason {
    fn from(value: &str) -> Self {
        match value {
            "stop" | "end_turn" => StopReason::EndTurn,
            "length" | "max_tokens" => StopReason::MaxTokens,
            "tool_calls" | "function_call" | "tool_use" => StopReason::ToolUse,
            "content_filter" => StopReason::ContentFilter,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Complete response from a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Text content (if any)
    pub content: Option<String>,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: UsageStats,
    pub model: String,
}

/// Errors from provider calls.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },
    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limited: {message}")]
    RateLimited { message: String },
    /// Model not found or not available
    #[error("Model not found: {model}")]
    ModelNotFound { model: String },
    /// Invalid request (bad parameters, malformed body)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
    /// Server error from the provider (HTTP 5xx)
    #[error("Server error ({}): {message}", status_label(.status))]
    ServerError {
        message: String,
        status: Option<u16>,
    },
    /// Network/connection error
    #[error("Network error: {message}")]
    NetworkError { message: String },
    /// Response parsing error
    #[error("Parse error: {message}")]
    ParseError { message: String },
    /// Provider not reachable (e.g., Ollama not running)
    #[error("Provider unavailable: {message}")]
    ProviderUnavailable { message: String },
    /// The request did not finish within the configured timeout
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,
    /// Other error
    #[error("Error: {message}")]
    Other { message: String },
}

impl LlmError {
    /// Whether this error is transient and the call should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::ServerError { .. }
                | LlmError::NetworkError { .. }
                | LlmError::ProviderUnavailable { .. }
                | LlmError::Timeout { .. }
        )
    }
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "stream".to_string())
}

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;
