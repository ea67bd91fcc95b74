//! Deterministic providers for tests and offline runs (`LLM_PROVIDER=mock`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::{
    AssistantMessage, ChatMessage, CompletionRequest, ContentBlock, LlmProvider, ProviderError,
    StopReason, ToolCall, Usage,
};

/// Echoes the last user message back as the assistant reply.
#[derive(Default)]
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<AssistantMessage, ProviderError> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find_map(|m| match m {
                ChatMessage::User { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "[no input]".to_string());

        Ok(AssistantMessage {
            content: vec![ContentBlock::Text {
                text: format!("MOCK: {reply}"),
            }],
            usage: Usage {
                input_tokens: 10,
                output_tokens: 10,
            },
            stop_reason: StopReason::Stop,
        })
    }
}

/// Pre-scripted provider. Each `complete` call pops the next scripted reply;
/// tests can specify exact sequences, including tool calls, without
/// network access. The last request seen is retained for inspection.
pub struct ScriptedProvider {
    scripts: Mutex<Vec<AssistantMessage>>,
    calls: AtomicUsize,
    pub last_request_messages: Mutex<Vec<ChatMessage>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<AssistantMessage>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            calls: AtomicUsize::new(0),
            last_request_messages: Mutex::new(Vec::new()),
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A reply that is plain text with no tool calls.
    pub fn text_reply(text: impl Into<String>) -> AssistantMessage {
        AssistantMessage {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: Usage {
                input_tokens: 5,
                output_tokens: 5,
            },
            stop_reason: StopReason::Stop,
        }
    }

    /// A reply requesting a single tool call.
    pub fn tool_reply(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> AssistantMessage {
        AssistantMessage {
            content: vec![ContentBlock::ToolCall(ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            })],
            usage: Usage {
                input_tokens: 5,
                output_tokens: 5,
            },
            stop_reason: StopReason::ToolCall,
        }
    }

    /// A reply carrying an error stop reason (e.g. a simulated overflow).
    pub fn error_reply(message: impl Into<String>) -> AssistantMessage {
        AssistantMessage {
            content: Vec::new(),
            usage: Usage::default(),
            stop_reason: StopReason::Error {
                message: message.into(),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<AssistantMessage, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request_messages.lock().unwrap() = req.messages.clone();

        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            return Err(ProviderError::Unavailable(
                "scripted provider ran out of replies".to_string(),
            ));
        }
        Ok(scripts.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_pop_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::text_reply("one"),
            ScriptedProvider::text_reply("two"),
        ]);
        let req = CompletionRequest {
            model: "m".into(),
            system: "s".into(),
            messages: vec![ChatMessage::user("hi")],
            tools: Vec::new(),
            max_tokens: 32,
        };

        assert_eq!(provider.complete(&req).await.unwrap().text(), "one");
        assert_eq!(provider.complete(&req).await.unwrap().text(), "two");
        assert!(provider.complete(&req).await.is_err());
        assert_eq!(provider.call_count(), 3);
    }
}
