//! Provider-agnostic LLM gateway types.
//!
//! The loop speaks only these types; each provider module translates them to
//! its wire dialect. All of them serialize cleanly because think substeps
//! journal the full [`AssistantMessage`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the model's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One block of assistant output, in the order the model produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolCall(ToolCall),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    Stop,
    ToolCall,
    MaxTokens,
    /// Provider-level failure surfaced as data (4xx API responses).
    /// Transport and 5xx failures are errors instead, so the substep retries.
    Error { message: String },
    Other { value: String },
}

/// The model's reply for one think step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl AssistantMessage {
    /// Concatenated text of every text block.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// All tool calls, in emission order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall(call) => Some(call.clone()),
                ContentBlock::Text { .. } => None,
            })
            .collect()
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.stop_reason {
            StopReason::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// The result of one tool execution, folded back into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

/// In-memory conversation entry. Exists only for the duration of one run;
/// the persisted session keeps user/assistant text records only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User { text: String },
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage::User { text: text.into() }
    }

    /// A plain-text assistant turn (used when replaying persisted history).
    pub fn assistant_text(text: impl Into<String>) -> Self {
        ChatMessage::Assistant(AssistantMessage {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
        })
    }
}

/// One completion request to the gateway.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

/// Common interface for all LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send one completion request and wait for the full response.
    async fn complete(&self, req: &CompletionRequest) -> Result<AssistantMessage, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with_blocks() -> AssistantMessage {
        AssistantMessage {
            content: vec![
                ContentBlock::Text {
                    text: "let me check".into(),
                },
                ContentBlock::ToolCall(ToolCall {
                    id: "tc_1".into(),
                    name: "read".into(),
                    arguments: serde_json::json!({"path": "a.md"}),
                }),
            ],
            usage: Usage {
                input_tokens: 12,
                output_tokens: 8,
            },
            stop_reason: StopReason::ToolCall,
        }
    }

    #[test]
    fn text_and_tool_call_accessors() {
        let msg = reply_with_blocks();
        assert_eq!(msg.text(), "let me check");
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read");
    }

    #[test]
    fn chat_message_round_trips_through_json() {
        let messages = vec![
            ChatMessage::user("hello"),
            ChatMessage::Assistant(reply_with_blocks()),
            ChatMessage::ToolResult(ToolResultMessage {
                tool_call_id: "tc_1".into(),
                tool_name: "read".into(),
                content: "contents".into(),
                is_error: false,
            }),
        ];
        let json = serde_json::to_string(&messages).expect("serialize");
        let back: Vec<ChatMessage> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, messages);
    }
}
