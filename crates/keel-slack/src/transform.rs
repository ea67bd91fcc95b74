//! Slack Events API transform.
//!
//! Classification rules:
//! - `url_verification` payloads answer synchronously with the challenge.
//! - Deliveries carrying `X-Slack-Retry-Num` are duplicates of an event we
//!   already accepted; they map to `slack/event.retry` so the agent never
//!   sees them twice.
//! - Bot messages and subtyped messages (edits, joins, ...) are unsupported.
//! - Session keys are thread-scoped where a thread exists:
//!   `slack-{channel}-{thread_ts}`, else `slack-{channel}`.

use std::collections::HashMap;

use keel_channels::{ChannelTransform, TransformOutcome};
use keel_core::event::{Destination, MessageReceived, Sender};
use serde::Deserialize;
use tracing::debug;

pub const CHANNEL: &str = "slack";

const RETRY_HEADER: &str = "x-slack-retry-num";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Payload {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event: Event,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    user: Option<String>,
    bot_id: Option<String>,
    subtype: Option<String>,
    text: Option<String>,
    channel: Option<String>,
    ts: Option<String>,
    thread_ts: Option<String>,
}

pub struct SlackTransform;

impl ChannelTransform for SlackTransform {
    fn channel(&self) -> &str {
        CHANNEL
    }

    fn transform(
        &self,
        payload: &serde_json::Value,
        headers: &HashMap<String, String>,
        _query: &HashMap<String, String>,
    ) -> TransformOutcome {
        if headers.keys().any(|k| k.eq_ignore_ascii_case(RETRY_HEADER)) {
            return TransformOutcome::retry(CHANNEL);
        }

        let parsed: Payload = match serde_json::from_value(payload.clone()) {
            Ok(p) => p,
            Err(_) => return TransformOutcome::failed(CHANNEL),
        };

        let event = match parsed {
            Payload::UrlVerification { challenge } => {
                return TransformOutcome::Challenge(challenge)
            }
            Payload::EventCallback { event } => event,
            Payload::Other => return TransformOutcome::unsupported(CHANNEL),
        };

        if event.kind != "message" || event.bot_id.is_some() || event.subtype.is_some() {
            return TransformOutcome::unsupported(CHANNEL);
        }

        let (Some(user), Some(channel), Some(ts)) = (event.user, event.channel, event.ts) else {
            return TransformOutcome::unsupported(CHANNEL);
        };
        let text = event.text.unwrap_or_default();
        if text.trim().is_empty() {
            return TransformOutcome::unsupported(CHANNEL);
        }

        let session_key = match &event.thread_ts {
            Some(thread) => format!("{CHANNEL}-{channel}-{thread}"),
            None => format!("{CHANNEL}-{channel}"),
        };

        debug!(session = %session_key, "slack event normalized");

        TransformOutcome::Event(Box::new(MessageReceived {
            message: text,
            session_key,
            channel: CHANNEL.to_string(),
            sender: Sender {
                id: user.clone(),
                name: user,
                username: None,
            },
            destination: Destination {
                chat_id: channel.clone(),
                message_id: Some(ts.clone()),
                thread_id: event.thread_ts.clone(),
            },
            channel_meta: serde_json::json!({
                "channel": channel,
                "ts": ts,
                "thread_ts": event.thread_ts,
            }),
        }))
    }
}
