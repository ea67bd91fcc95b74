//! Canonical events exchanged between the ingress, the agent engine, and the
//! channel dispatchers. Channel adapters normalize their webhook payloads
//! into [`MessageReceived`]; the engine answers with [`ReplyReady`].

use serde::{Deserialize, Serialize};

/// Event name for a normalized inbound message.
pub const MESSAGE_RECEIVED: &str = "agent.message.received";
/// Event name for a completed agent reply awaiting dispatch.
pub const REPLY_READY: &str = "agent.reply.ready";
/// Lifecycle event raised when a durable function exhausts its retries.
pub const FUNCTION_FAILED: &str = "function.failed";

/// Who sent the inbound message, as reported by the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sender {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Where the reply should be delivered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// A normalized inbound message (`agent.message.received`).
///
/// `channel_meta` is an opaque per-channel payload carried through to the
/// channel handler untouched; the core never inspects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceived {
    pub message: String,
    pub session_key: String,
    pub channel: String,
    pub sender: Sender,
    pub destination: Destination,
    #[serde(default)]
    pub channel_meta: serde_json::Value,
}

/// A finished reply awaiting channel dispatch (`agent.reply.ready`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyReady {
    pub response: String,
    pub channel: String,
    pub destination: Destination,
    #[serde(default)]
    pub channel_meta: serde_json::Value,
}

/// Lifecycle payload for `function.failed`: a durable function exhausted its
/// retries. Carries the originating event when one is known so the failure
/// handler can route an apology back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionFailed {
    pub function: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<MessageReceived>,
}

/// Outcome of one complete agent run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResult {
    pub response: String,
    pub iterations: u32,
    pub tool_calls: u32,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_received_deserializes_without_optional_fields() {
        let ev: MessageReceived = serde_json::from_value(serde_json::json!({
            "message": "hello",
            "session_key": "telegram-42",
            "channel": "telegram",
            "sender": { "id": "7", "name": "Ada" },
            "destination": { "chat_id": "42" },
        }))
        .expect("deserialize");
        assert_eq!(ev.session_key, "telegram-42");
        assert!(ev.sender.username.is_none());
        assert!(ev.destination.thread_id.is_none());
        assert!(ev.channel_meta.is_null());
    }

    #[test]
    fn destination_omits_absent_fields_on_the_wire() {
        let dest = Destination {
            chat_id: "42".into(),
            message_id: None,
            thread_id: None,
        };
        let json = serde_json::to_value(&dest).expect("serialize");
        assert_eq!(json, serde_json::json!({ "chat_id": "42" }));
    }
}
