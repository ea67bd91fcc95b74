//! Outbound dispatchers: acknowledge fan-out, reply delivery with retries,
//! and the global failure handler.

use std::time::Duration;

use keel_core::event::{FunctionFailed, MessageReceived, ReplyReady};
use tracing::{debug, error, warn};

use crate::error::ChannelError;
use crate::registry::ChannelRegistry;

/// Delivery attempts for one reply before it is given up on.
const REPLY_ATTEMPTS: u32 = 3;
/// Base backoff between reply attempts; doubles each retry.
const REPLY_BACKOFF: Duration = Duration::from_millis(500);

/// What the failure handler tells the user when a run died.
const FAILURE_APOLOGY: &str =
    "Sorry, something went wrong while handling your message. Please try again.";

/// Best-effort receipt signal. No retries; failures are swallowed inside
/// the handler, and an unknown channel is only logged.
pub async fn acknowledge(registry: &ChannelRegistry, event: &MessageReceived) {
    match registry.handler(&event.channel) {
        Some(handler) => {
            debug!(channel = %event.channel, session = %event.session_key, "acknowledging");
            handler
                .acknowledge(&event.destination, &event.channel_meta)
                .await;
        }
        None => warn!(channel = %event.channel, "acknowledge: unknown channel"),
    }
}

/// Deliver a finished reply to its channel, retrying with backoff.
///
/// Exhausting the attempts returns the last error so the caller can raise
/// `function.failed`.
pub async fn send_reply(
    registry: &ChannelRegistry,
    event: &ReplyReady,
) -> Result<(), ChannelError> {
    let handler = registry
        .handler(&event.channel)
        .ok_or_else(|| ChannelError::UnknownChannel(event.channel.clone()))?;

    let mut backoff = REPLY_BACKOFF;
    let mut last_err: Option<ChannelError> = None;

    for attempt in 1..=REPLY_ATTEMPTS {
        match handler
            .send_reply(&event.response, &event.destination, &event.channel_meta)
            .await
        {
            Ok(()) => {
                debug!(channel = %event.channel, attempt, "reply delivered");
                return Ok(());
            }
            Err(e) => {
                warn!(channel = %event.channel, attempt, error = %e, "reply delivery failed");
                last_err = Some(e);
                if attempt < REPLY_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ChannelError::Send("reply delivery failed".to_string())))
}

/// Global failure handler: recover the originating event from the
/// `function.failed` payload and send the user a short apology. Best
/// effort; if even the apology fails, it is only logged.
pub async fn handle_failure(registry: &ChannelRegistry, failed: &FunctionFailed) {
    error!(function = %failed.function, error = %failed.error, "durable function failed");

    let Some(event) = &failed.event else {
        return;
    };
    let Some(handler) = registry.handler(&event.channel) else {
        warn!(channel = %event.channel, "failure handler: unknown channel");
        return;
    };

    if let Err(e) = handler
        .send_reply(FAILURE_APOLOGY, &event.destination, &event.channel_meta)
        .await
    {
        warn!(channel = %event.channel, error = %e, "failed to deliver failure apology");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use keel_core::event::{Destination, Sender};

    use super::*;
    use crate::handler::ChannelHandler;
    use crate::transform::{ChannelTransform, TransformOutcome};

    struct FlakyHandler {
        fail_first: u32,
        sends: AtomicU32,
        delivered: Mutex<Vec<String>>,
        acks: AtomicU32,
    }

    impl FlakyHandler {
        fn new(fail_first: u32) -> Self {
            Self {
                fail_first,
                sends: AtomicU32::new(0),
                delivered: Mutex::new(Vec::new()),
                acks: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ChannelHandler for FlakyHandler {
        fn name(&self) -> &str {
            "test"
        }

        async fn send_reply(
            &self,
            response: &str,
            _destination: &Destination,
            _meta: &serde_json::Value,
        ) -> Result<(), ChannelError> {
            let n = self.sends.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ChannelError::Send("simulated outage".to_string()));
            }
            self.delivered.lock().unwrap().push(response.to_string());
            Ok(())
        }

        async fn acknowledge(&self, _destination: &Destination, _meta: &serde_json::Value) {
            self.acks.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullTransform;

    impl ChannelTransform for NullTransform {
        fn channel(&self) -> &str {
            "test"
        }

        fn transform(
            &self,
            _payload: &serde_json::Value,
            _headers: &std::collections::HashMap<String, String>,
            _query: &std::collections::HashMap<String, String>,
        ) -> TransformOutcome {
            TransformOutcome::unsupported("test")
        }
    }

    fn registry_with(handler: Arc<FlakyHandler>) -> ChannelRegistry {
        let mut registry = ChannelRegistry::new();
        registry.register(handler, Arc::new(NullTransform));
        registry
    }

    fn reply_event() -> ReplyReady {
        ReplyReady {
            response: "hi there".into(),
            channel: "test".into(),
            destination: Destination {
                chat_id: "42".into(),
                message_id: None,
                thread_id: None,
            },
            channel_meta: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn reply_retries_until_delivery() {
        let handler = Arc::new(FlakyHandler::new(2));
        let registry = registry_with(Arc::clone(&handler));

        send_reply(&registry, &reply_event()).await.expect("delivered");
        assert_eq!(handler.sends.load(Ordering::SeqCst), 3);
        assert_eq!(*handler.delivered.lock().unwrap(), vec!["hi there"]);
    }

    #[tokio::test]
    async fn reply_gives_up_after_three_attempts() {
        let handler = Arc::new(FlakyHandler::new(10));
        let registry = registry_with(Arc::clone(&handler));

        let result = send_reply(&registry, &reply_event()).await;
        assert!(result.is_err());
        assert_eq!(handler.sends.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_handler_routes_apology_to_origin_channel() {
        let handler = Arc::new(FlakyHandler::new(0));
        let registry = registry_with(Arc::clone(&handler));

        let failed = FunctionFailed {
            function: "handle_message".into(),
            error: "retries exhausted".into(),
            event: Some(MessageReceived {
                message: "hello".into(),
                session_key: "test-42".into(),
                channel: "test".into(),
                sender: Sender {
                    id: "7".into(),
                    name: "Ada".into(),
                    username: None,
                },
                destination: Destination {
                    chat_id: "42".into(),
                    message_id: None,
                    thread_id: None,
                },
                channel_meta: serde_json::Value::Null,
            }),
        };

        handle_failure(&registry, &failed).await;
        let delivered = handler.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("something went wrong"));
    }
}
