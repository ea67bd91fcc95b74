//! Webhook transform contract.
//!
//! One transform per channel runs at the ingest boundary and classifies the
//! raw payload: a canonical event for the agent, a synchronous platform
//! challenge response, or a named discard event that bypasses the agent
//! (unsupported payloads, parse failures, platform retries).

use std::collections::HashMap;

use keel_core::event::MessageReceived;

/// What a transform produced for one webhook delivery.
#[derive(Debug)]
pub enum TransformOutcome {
    /// A normalized message for the agent.
    Event(Box<MessageReceived>),
    /// Respond synchronously with this body (platform URL verification).
    Challenge(String),
    /// Not for the agent; `event` names why (`{channel}/message.unsupported`,
    /// `{channel}/transform.failed`, `{channel}/event.retry`).
    Discard { event: String },
}

impl TransformOutcome {
    pub fn unsupported(channel: &str) -> Self {
        TransformOutcome::Discard {
            event: format!("{channel}/message.unsupported"),
        }
    }

    pub fn failed(channel: &str) -> Self {
        TransformOutcome::Discard {
            event: format!("{channel}/transform.failed"),
        }
    }

    pub fn retry(channel: &str) -> Self {
        TransformOutcome::Discard {
            event: format!("{channel}/event.retry"),
        }
    }
}

/// Pure normalization function per channel. Must be deterministic and
/// self-contained: headers and query parameters are handed in, nothing else
/// may be consulted.
pub trait ChannelTransform: Send + Sync {
    /// Channel this transform feeds (matches the handler's name).
    fn channel(&self) -> &str;

    fn transform(
        &self,
        payload: &serde_json::Value,
        headers: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> TransformOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_helpers_name_events_by_channel() {
        match TransformOutcome::unsupported("telegram") {
            TransformOutcome::Discard { event } => {
                assert_eq!(event, "telegram/message.unsupported")
            }
            _ => panic!("expected discard"),
        }
        match TransformOutcome::retry("slack") {
            TransformOutcome::Discard { event } => assert_eq!(event, "slack/event.retry"),
            _ => panic!("expected discard"),
        }
    }
}
