//! OpenAI-Compatible SSE Adapter
//!
//! Handles `data: {...}` lines from chat-completions streams.

use serde::Deserialize;
use texpilot_core::streaming::{AdapterError, StreamAdapter, UnifiedStreamEvent};

#[derive(Debug, Deserialize)]
struct OpenAIEvent {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Adapter for OpenAI-compatible SSE streams
pub struct OpenAIAdapter {
    completed: bool,
}

impl OpenAIAdapter {
    pub fn new() -> Self {
        Self { completed: false }
    }

    /// Whether a `Complete` event has been emitted for the current stream.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Default for OpenAIAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamAdapter for OpenAIAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn adapt(&mut self, input: &str) -> Result<Vec<UnifiedStreamEvent>, AdapterError> {
        let trimmed = input.trim();

        // SSE comments and event names carry nothing for us
        if trimmed.is_empty() || trimmed.starts_with(':') || trimmed.starts_with("event:") {
            return Ok(vec![]);
        }

        let json_str = match trimmed.strip_prefix("data:") {
            Some(rest) => rest.trim_start(),
            None => trimmed,
        };

        if json_str == "[DONE]" {
            if self.completed {
                return Ok(vec![]);
            }
            self.completed = true;
            return Ok(vec![UnifiedStreamEvent::Complete { stop_reason: None }]);
        }

        let event: OpenAIEvent =
            serde_json::from_str(json_str).map_err(|e| AdapterError::ParseError(e.to_string()))?;

        let mut events = vec![];

        if let Some(err) = event.error {
            events.push(UnifiedStreamEvent::Error {
                message: err
                    .message
                    .unwrap_or_else(|| "provider reported a stream error".to_string()),
                code: err.code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            });
            return Ok(events);
        }

        for choice in event.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        events.push(UnifiedStreamEvent::TextDelta { content });
                    }
                }
                for tc in delta.tool_calls.unwrap_or_default() {
                    if let (Some(id), Some(name)) = (tc.id, tc.function.and_then(|f| f.name)) {
                        events.push(UnifiedStreamEvent::ToolStart {
                            tool_id: id,
                            tool_name: name,
                        });
                    }
                }
            }

            if let Some(finish_reason) = choice.finish_reason {
                if !self.completed {
                    self.completed = true;
                    events.push(UnifiedStreamEvent::Complete {
                        stop_reason: Some(finish_reason),
                    });
                }
            }
        }

        // Usage arrives in a trailing chunk with empty choices
        if let Some(usage) = event.usage {
            events.push(UnifiedStreamEvent::Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.completed = false;
    }
}
