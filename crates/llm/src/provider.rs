//! LLM Provider Trait
//!
//! Defines the common interface for planner backends.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, ProviderConfig, ToolDefinition,
};
use texpilot_core::streaming::UnifiedStreamEvent;

/// Trait that all planner providers must implement.
///
/// Provides a unified interface for:
/// - Single completions, optionally negotiating a tool call (send_message)
/// - Streaming free-text completions (stream_message)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider name for identification.
    fn name(&self) -> &'static str;

    /// Returns the current model being used.
    fn model(&self) -> &str;

    /// Returns whether this provider supports native tool calling.
    fn supports_tools(&self) -> bool;

    /// Send a message and get a complete response.
    ///
    /// When `tools` is non-empty the provider may answer with tool calls
    /// instead of (or alongside) text.
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Stream a free-text response, forwarding events through `tx`.
    ///
    /// Returns the final accumulated response. A stream that errors or ends
    /// before the provider signals completion is an `Err`, never a partial
    /// `Ok`.
    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse>;

    /// Get the configuration for this provider.
    fn config(&self) -> &ProviderConfig;
}

/// Helper function to create an error for missing API key
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {}", provider),
    }
}

/// Map an HTTP error status to the error taxonomy.
///
/// 429 and 5xx land in retryable variants; every other 4xx fails fast.
pub fn parse_http_error(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        401 => LlmError::AuthenticationFailed {
            message: format!("{}: Invalid API key", provider),
        },
        403 => LlmError::AuthenticationFailed {
            message: format!("{}: Access denied", provider),
        },
        404 => LlmError::ModelNotFound {
            model: body.to_string(),
        },
        429 => LlmError::RateLimited {
            message: body.to_string(),
        },
        400..=499 => LlmError::InvalidRequest {
            message: format!("HTTP {}: {}", status, body),
        },
        500..=599 => LlmError::ServerError {
            message: body.to_string(),
            status: Some(status),
        },
        _ => LlmError::Other {
            message: format!("HTTP {}: {}", status, body),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_error() {
        let err = missing_api_key_error("deepseek");
        match err {
            LlmError::AuthenticationFailed { message } => {
                assert!(message.contains("deepseek"));
            }
            _ => panic!("Expected AuthenticationFailed"),
        }
    }

    #[test]
    fn test_parse_http_error() {
        let err = parse_http_error(401, "unauthorized", "openai");
        assert!(matches!(err, LlmError::AuthenticationFailed { .. }));

        let err = parse_http_error(429, "rate limited", "openai");
        assert!(matches!(err, LlmError::RateLimited { .. }));
        assert!(err.is_retryable());

        let err = parse_http_error(503, "unavailable", "openai");
        assert!(matches!(err, LlmError::ServerError { status: Some(503), .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        for status in [400u16, 413, 422] {
            let err = parse_http_error(status, "bad body", "openai");
            assert!(matches!(err, LlmError::InvalidRequest { .. }));
            assert!(!err.is_retryable(), "HTTP {} must fail fast", status);
        }
    }
}
