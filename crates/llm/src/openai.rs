//! OpenAI-Compatible Provider
//!
//! Implementation of the LlmProvider trait for any endpoint that speaks the
//! chat-completions wire format (OpenAI, DeepSeek, Ollama, self-hosted).

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::provider::{missing_api_key_error, parse_http_error, LlmProvider};
use super::types::{
    LlmError, LlmRequestOptions, LlmResponse, LlmResult, Message, MessageRole, ProviderConfig,
    StopReason, ToolCall, ToolCallMode, ToolDefinition, UsageStats,
};
use crate::http_client::build_http_client;
use crate::streaming_adapters::{OpenAIAdapter, SseLineBuffer};
use texpilot_core::streaming::{StreamAdapter, UnifiedStreamEvent};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: ProviderConfig) -> LlmResult<Self> {
        let client = build_http_client(config.proxy.as_deref())?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> LlmResult<&str> {
        self.config
            .endpoint()
            .ok_or_else(|| LlmError::InvalidRequest {
                message: format!("no base_url configured for {} provider", self.config.provider),
            })
    }

    fn api_key(&self) -> LlmResult<Option<&str>> {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(Some(key)),
            _ if self.config.provider.requires_api_key() => {
                Err(missing_api_key_error(&self.config.provider.to_string()))
            }
            _ => Ok(None),
        }
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolDefinition],
        stream: bool,
        request_options: &LlmRequestOptions,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": request_options
                .temperature_override
                .unwrap_or(self.config.temperature),
            "stream": stream,
        });

        let mut openai_messages: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);
        if let Some(sys) = system {
            openai_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        openai_messages.extend(messages.iter().map(message_to_openai));
        body["messages"] = serde_json::json!(openai_messages);

        if !tools.is_empty() && request_options.tool_call_mode != ToolCallMode::None {
            let openai_tools: Vec<serde_json::Value> = tools.iter().map(tool_to_openai).collect();
            body["tools"] = serde_json::json!(openai_tools);
            if request_options.tool_call_mode == ToolCallMode::Required {
                body["tool_choice"] = serde_json::json!("required");
            }
        }

        if stream {
            body["stream_options"] = serde_json::json!({
                "include_usage": true
            });
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> LlmResult<reqwest::Response> {
        let mut request = self
            .client
            .post(self.endpoint()?)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = self.api_key()? {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(map_transport_error)?;

        let status = response.status().as_u16();
        if status != 200 {
            let body_text = response.text().await.map_err(map_transport_error)?;
            return Err(parse_http_error(status, &body_text, self.name()));
        }
        Ok(response)
    }

    /// Parse a non-streaming response
    fn parse_response(&self, response: OpenAIResponse) -> LlmResponse {
        let choice = response.choices.into_iter().next();
        let stop_reason = choice
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .map(StopReason::from)
            .unwrap_or(StopReason::EndTurn);

        let mut content = None;
        let mut tool_calls = Vec::new();
        if let Some(msg) = choice.and_then(|c| c.message) {
            content = msg.content.filter(|c| !c.is_empty());
            for tc in msg.tool_calls.unwrap_or_default() {
                // Malformed argument JSON is kept as a string so the
                // operation parser can attempt recovery on it.
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::String(tc.function.arguments));
                tool_calls.push(ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments,
                });
            }
        }

        let usage = response
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
            model: response.model.unwrap_or_else(|| self.config.model.clone()),
        }
    }
}

/// Convert a Message to chat-completions format
fn message_to_openai(message: &Message) -> serde_json::Value {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    };
    serde_json::json!({
        "role": role,
        "content": message.content
    })
}

/// Convert a ToolDefinition to chat-completions format
fn tool_to_openai(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema
        }
    })
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_connect() {
        LlmError::ProviderUnavailable {
            message: e.to_string(),
        }
    } else {
        LlmError::NetworkError {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        match self.config.provider {
            super::types::ProviderType::OpenAI => "openai",
            super::types::ProviderType::DeepSeek => "deepseek",
            super::types::ProviderType::Ollama => "ollama",
            super::types::ProviderType::Custom => "custom",
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let body = self.build_request_body(
            &messages,
            system.as_deref(),
            &tools,
            false,
            &request_options,
        );

        let response = self.post(&body).await?;
        let body_text = response.text().await.map_err(map_transport_error)?;

        let parsed: OpenAIResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ParseError {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(self.parse_response(parsed))
    }

    async fn stream_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tx: mpsc::Sender<UnifiedStreamEvent>,
        request_options: LlmRequestOptions,
    ) -> LlmResult<LlmResponse> {
        let body =
            self.build_request_body(&messages, system.as_deref(), &[], true, &request_options);
        let response = self.post(&body).await?;

        let mut adapter = OpenAIAdapter::new();
        let mut accumulated_content = String::new();
        let mut usage = UsageStats::default();
        let mut stop_reason = StopReason::EndTurn;

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_transport_error)?;

            for line in lines.push(&chunk) {
                if line.trim().is_empty() {
                    continue;
                }

                let events = match adapter.adapt(&line) {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(provider = self.name(), error = %e, "skipping malformed stream line");
                        continue;
                    }
                };

                for event in events {
                    match event {
                        UnifiedStreamEvent::TextDelta { content } => {
                            accumulated_content.push_str(&content);
                            // A dropped receiver only loses the live preview.
                            let _ = tx.send(UnifiedStreamEvent::TextDelta { content }).await;
                        }
                        UnifiedStreamEvent::Usage {
                            input_tokens,
                            output_tokens,
                        } => {
                            usage.input_tokens = input_tokens;
                            usage.output_tokens = output_tokens;
                        }
                        UnifiedStreamEvent::Complete {
                            stop_reason: Some(reason),
                        } => {
                            stop_reason = StopReason::from(reason.as_str());
                        }
                        UnifiedStreamEvent::Error { message, code } => {
                            return Err(LlmError::ServerError {
                                message: match code {
                                    Some(code) => format!("{} ({})", message, code),
                                    None => message,
                                },
                                status: None,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }

        // A trailing line without newline still counts
        if let Some(rest) = lines.finish().filter(|rest| !rest.trim().is_empty()) {
            if let Ok(events) = adapter.adapt(&rest) {
                for event in events {
                    if let UnifiedStreamEvent::TextDelta { content } = event {
                        accumulated_content.push_str(&content);
                        let _ = tx.send(UnifiedStreamEvent::TextDelta { content }).await;
                    }
                }
            }
        }

        if !adapter.is_completed() {
            debug!(
                provider = self.name(),
                received = accumulated_content.len(),
                "stream closed before completion"
            );
            return Err(LlmError::NetworkError {
                message: "stream ended before the provider signalled completion".to_string(),
            });
        }

        Ok(LlmResponse {
            content: if accumulated_content.is_empty() {
                None
            } else {
                Some(accumulated_content)
            },
            tool_calls: Vec::new(),
            stop_reason,
            usage,
            model: self.config.model.clone(),
        })
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

/// Chat-completions response format
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
