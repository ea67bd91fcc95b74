//! Telegram webhook transform: raw Bot API update JSON → canonical event.
//!
//! Session keys are chat-scoped (`telegram-{chat_id}`), or thread-scoped
//! (`telegram-{chat_id}-{thread_id}`) inside forum topics. Non-message
//! updates, bot senders, and text-less messages are discarded as
//! `telegram/message.unsupported`; undecodable payloads as
//! `telegram/transform.failed`.

use std::collections::HashMap;

use keel_channels::{ChannelTransform, TransformOutcome};
use keel_core::event::{Destination, MessageReceived, Sender};
use serde::Deserialize;
use tracing::debug;

pub const CHANNEL: &str = "telegram";

/// The slice of a Bot API `Update` the transform cares about. Unknown
/// fields are ignored so new Telegram features do not break ingestion.
#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
    caption: Option<String>,
    message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    is_bot: bool,
    first_name: String,
    username: Option<String>,
}

pub struct TelegramTransform;

impl ChannelTransform for TelegramTransform {
    fn channel(&self) -> &str {
        CHANNEL
    }

    fn transform(
        &self,
        payload: &serde_json::Value,
        _headers: &HashMap<String, String>,
        _query: &HashMap<String, String>,
    ) -> TransformOutcome {
        let update: Update = match serde_json::from_value(payload.clone()) {
            Ok(u) => u,
            Err(_) => return TransformOutcome::failed(CHANNEL),
        };

        // Edited messages, channel posts, callback queries etc. never reach
        // the agent.
        let Some(message) = update.message else {
            return TransformOutcome::unsupported(CHANNEL);
        };

        let Some(from) = message.from else {
            return TransformOutcome::unsupported(CHANNEL);
        };
        if from.is_bot {
            return TransformOutcome::unsupported(CHANNEL);
        }

        let text = message
            .text
            .or(message.caption)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return TransformOutcome::unsupported(CHANNEL);
        }

        let chat_id = message.chat.id;
        let session_key = match message.message_thread_id {
            Some(thread) => format!("{CHANNEL}-{chat_id}-{thread}"),
            None => format!("{CHANNEL}-{chat_id}"),
        };

        debug!(update_id = update.update_id, session = %session_key, "telegram update normalized");

        TransformOutcome::Event(Box::new(MessageReceived {
            message: text,
            session_key,
            channel: CHANNEL.to_string(),
            sender: Sender {
                id: from.id.to_string(),
                name: from.first_name,
                username: from.username,
            },
            destination: Destination {
                chat_id: chat_id.to_string(),
                message_id: Some(message.message_id.to_string()),
                thread_id: message.message_thread_id.map(|t| t.to_string()),
            },
            channel_meta: serde_json::json!({
                "chat_id": chat_id,
                "thread_id": message.message_thread_id,
                "update_id": update.update_id,
            }),
        }))
    }
}
