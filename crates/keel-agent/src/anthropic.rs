//! Anthropic Messages API dialect.
//!
//! Error policy: 4xx API responses (including context-overflow rejections)
//! come back as `StopReason::Error` so the loop can classify them; network
//! failures, 429 and 5xx are returned as `Err` so the surrounding durable
//! substep retries.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{
    AssistantMessage, ChatMessage, CompletionRequest, ContentBlock, LlmProvider, ProviderError,
    StopReason, ToolCall, Usage,
};

const API_VERSION: &str = "2023-06-01";
/// Per-call timeout; a slower response is treated as transient and retried.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<AssistantMessage, ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %req.model, messages = req.messages.len(), "sending request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if status >= 500 {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic server error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        if !(200..300).contains(&status) {
            // 4xx: surface as an error stop reason so the loop can inspect
            // the message (context-overflow recovery keys off this text).
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API rejected request");
            return Ok(AssistantMessage {
                content: Vec::new(),
                usage: Usage::default(),
                stop_reason: StopReason::Error {
                    message: format!("API error ({status}): {text}"),
                },
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp))
    }
}

fn build_request_body(req: &CompletionRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req.messages.iter().map(message_to_wire).collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "max_tokens": req.max_tokens,
        "system": req.system,
        "messages": messages,
        "stream": false,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

/// Translate one runtime message into Anthropic wire format.
///
/// Tool results become user-role `tool_result` blocks, which is how the
/// Messages API expects observations to be fed back.
fn message_to_wire(msg: &ChatMessage) -> serde_json::Value {
    match msg {
        ChatMessage::User { text } => serde_json::json!({
            "role": "user",
            "content": text,
        }),
        ChatMessage::Assistant(reply) => {
            let blocks: Vec<serde_json::Value> = reply
                .content
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => serde_json::json!({
                        "type": "text",
                        "text": text,
                    }),
                    ContentBlock::ToolCall(call) => serde_json::json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }),
                })
                .collect();
            serde_json::json!({
                "role": "assistant",
                "content": blocks,
            })
        }
        ChatMessage::ToolResult(result) => serde_json::json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": result.tool_call_id,
                "content": result.content,
                "is_error": result.is_error,
            }],
        }),
    }
}

fn parse_response(resp: ApiResponse) -> AssistantMessage {
    let content: Vec<ContentBlock> = resp
        .content
        .into_iter()
        .map(|block| match block {
            WireBlock::Text { text } => ContentBlock::Text { text },
            WireBlock::ToolUse { id, name, input } => ContentBlock::ToolCall(ToolCall {
                id,
                name,
                arguments: input,
            }),
        })
        .collect();

    let has_tool_call = content
        .iter()
        .any(|b| matches!(b, ContentBlock::ToolCall(_)));

    let stop_reason = match resp.stop_reason.as_deref() {
        Some("end_turn") | None => StopReason::Stop,
        Some("tool_use") => StopReason::ToolCall,
        Some("max_tokens") => StopReason::MaxTokens,
        Some(other) => {
            // some providers omit "tool_use" even when tool blocks are present
            if has_tool_call {
                StopReason::ToolCall
            } else {
                StopReason::Other {
                    value: other.to_string(),
                }
            }
        }
    };

    AssistantMessage {
        content,
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
        stop_reason,
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<WireBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolResultMessage;

    #[test]
    fn tool_result_is_wired_as_user_block() {
        let wire = message_to_wire(&ChatMessage::ToolResult(ToolResultMessage {
            tool_call_id: "tc_9".into(),
            tool_name: "read".into(),
            content: "file body".into(),
            is_error: false,
        }));
        assert_eq!(wire["role"], "user");
        assert_eq!(wire["content"][0]["type"], "tool_result");
        assert_eq!(wire["content"][0]["tool_use_id"], "tc_9");
    }

    #[test]
    fn response_blocks_keep_model_order() {
        let resp: ApiResponse = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "text", "text": "checking" },
                { "type": "tool_use", "id": "t1", "name": "read", "input": {"path": "a"} },
                { "type": "text", "text": "and more" },
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 3, "output_tokens": 7 },
        }))
        .expect("parse");

        let msg = parse_response(resp);
        assert_eq!(msg.content.len(), 3);
        assert!(matches!(msg.content[1], ContentBlock::ToolCall(_)));
        assert_eq!(msg.stop_reason, StopReason::ToolCall);
        assert_eq!(msg.usage.output_tokens, 7);
    }

    #[test]
    fn tools_are_omitted_from_body_when_empty() {
        let req = CompletionRequest {
            model: "m".into(),
            system: "s".into(),
            messages: vec![ChatMessage::user("hi")],
            tools: Vec::new(),
            max_tokens: 64,
        };
        let body = build_request_body(&req);
        assert!(body.get("tools").is_none());
    }
}
