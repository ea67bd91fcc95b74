//! In-process event bus.
//!
//! The substrate's protocol is two event names plus one lifecycle event
//! (`agent.message.received`, `agent.reply.ready`, `function.failed`).
//! Subscribers get their own broadcast receiver; a discarded normalization
//! outcome is also published so it can be observed in tests and logs.

use keel_core::event::{self, FunctionFailed, MessageReceived, ReplyReady};
use tokio::sync::broadcast;
use tracing::debug;

const BUS_CAPACITY: usize = 256;

/// Everything that can travel on the bus.
#[derive(Debug, Clone)]
pub enum BusEvent {
    MessageReceived(MessageReceived),
    ReplyReady(ReplyReady),
    FunctionFailed(FunctionFailed),
    /// A webhook payload the normalizer classified away from the agent.
    Discarded {
        event: String,
        payload: serde_json::Value,
    },
}

impl BusEvent {
    /// Canonical event name, used for logging and subscriber filtering.
    pub fn name(&self) -> &str {
        match self {
            BusEvent::MessageReceived(_) => event::MESSAGE_RECEIVED,
            BusEvent::ReplyReady(_) => event::REPLY_READY,
            BusEvent::FunctionFailed(_) => event::FUNCTION_FAILED,
            BusEvent::Discarded { event, .. } => event,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Delivery is best-effort: an event emitted while no
    /// subscriber exists is dropped, matching fire-and-forget bus semantics.
    pub fn emit(&self, event: BusEvent) {
        debug!(event = %event.name(), "bus emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use keel_core::event::{Destination, Sender};

    use super::*;

    fn sample_event() -> MessageReceived {
        MessageReceived {
            message: "hi".into(),
            session_key: "telegram-1".into(),
            channel: "telegram".into(),
            sender: Sender {
                id: "1".into(),
                name: "Ada".into(),
                username: None,
            },
            destination: Destination {
                chat_id: "1".into(),
                message_id: None,
                thread_id: None,
            },
            channel_meta: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(BusEvent::MessageReceived(sample_event()));

        match rx.recv().await.expect("event") {
            BusEvent::MessageReceived(ev) => assert_eq!(ev.session_key, "telegram-1"),
            other => panic!("unexpected event: {}", other.name()),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.emit(BusEvent::Discarded {
            event: "telegram/message.unsupported".into(),
            payload: serde_json::Value::Null,
        });
    }
}
