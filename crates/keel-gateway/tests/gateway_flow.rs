//! Gateway-level flows: webhook ingress through the bus to channel
//! delivery, platform challenges, and cancel-on-new-message semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use keel_agent::mock::ScriptedProvider;
use keel_agent::Services;
use keel_channels::{
    ChannelError, ChannelHandler, ChannelRegistry, ChannelTransform, TransformOutcome,
};
use keel_core::config::KeelConfig;
use keel_core::event::{Destination, MessageReceived, Sender};
use keel_gateway::{build_router, spawn_event_handlers, AppState};

// ── fake channel ──────────────────────────────────────────────────────────

struct FakeHandler {
    delivered: Mutex<Vec<String>>,
    acks: AtomicU32,
}

impl FakeHandler {
    fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            acks: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ChannelHandler for FakeHandler {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send_reply(
        &self,
        response: &str,
        _destination: &Destination,
        _meta: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        self.delivered.lock().unwrap().push(response.to_string());
        Ok(())
    }

    async fn acknowledge(&self, _destination: &Destination, _meta: &serde_json::Value) {
        self.acks.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transform for a toy payload shape:
/// `{"challenge": "..."}` answers synchronously, `{"text", "session"}`
/// becomes a message event, anything else is unsupported.
struct FakeTransform;

impl ChannelTransform for FakeTransform {
    fn channel(&self) -> &str {
        "fake"
    }

    fn transform(
        &self,
        payload: &serde_json::Value,
        _headers: &HashMap<String, String>,
        _query: &HashMap<String, String>,
    ) -> TransformOutcome {
        if let Some(challenge) = payload.get("challenge").and_then(|v| v.as_str()) {
            return TransformOutcome::Challenge(challenge.to_string());
        }
        let (Some(text), Some(session)) = (
            payload.get("text").and_then(|v| v.as_str()),
            payload.get("session").and_then(|v| v.as_str()),
        ) else {
            return TransformOutcome::unsupported("fake");
        };
        TransformOutcome::Event(Box::new(MessageReceived {
            message: text.to_string(),
            session_key: format!("fake-{session}"),
            channel: "fake".to_string(),
            sender: Sender {
                id: "1".into(),
                name: "Tester".into(),
                username: None,
            },
            destination: Destination {
                chat_id: session.to_string(),
                message_id: payload.get("id").and_then(|v| v.as_str()).map(String::from),
                thread_id: None,
            },
            channel_meta: serde_json::Value::Null,
        }))
    }
}

fn build_state(
    dir: &std::path::Path,
    provider: Arc<ScriptedProvider>,
    handler: Arc<FakeHandler>,
) -> Arc<AppState> {
    let mut config = KeelConfig::default();
    config.agent.workspace = dir.display().to_string();

    let services = Arc::new(Services::with_provider(config.clone(), provider));
    let mut registry = ChannelRegistry::new();
    registry.register(handler, Arc::new(FakeTransform));

    Arc::new(AppState::with_parts(config, services, Arc::new(registry)))
}

async fn post_webhook(
    router: axum::Router,
    channel: &str,
    payload: serde_json::Value,
) -> (StatusCode, String) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/webhooks/{channel}"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).to_string())
}

async fn wait_for<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn webhook_event_flows_to_reply_delivery() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text_reply(
        "hello from the agent",
    )]));
    let handler = Arc::new(FakeHandler::new());
    let state = build_state(dir.path(), provider, Arc::clone(&handler));

    spawn_event_handlers(Arc::clone(&state));
    let router = build_router(Arc::clone(&state));

    let (status, _) = post_webhook(
        router,
        "fake",
        serde_json::json!({"text": "hi", "session": "s1", "id": "m1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    wait_for("reply delivery", || {
        !handler.delivered.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(
        *handler.delivered.lock().unwrap(),
        vec!["hello from the agent"]
    );
    // acknowledge ran too
    wait_for("acknowledge", || handler.acks.load(Ordering::SeqCst) >= 1).await;
}

#[tokio::test]
async fn challenge_is_answered_synchronously() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let handler = Arc::new(FakeHandler::new());
    let state = build_state(dir.path(), provider, handler);
    let router = build_router(state);

    let (status, body) =
        post_webhook(router, "fake", serde_json::json!({"challenge": "c0ffee"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "c0ffee");
}

#[tokio::test]
async fn unknown_channel_is_a_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(ScriptedProvider::new(Vec::new()));
    let handler = Arc::new(FakeHandler::new());
    let state = build_state(dir.path(), provider, handler);
    let router = build_router(state);

    let (status, _) = post_webhook(router, "nope", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn newer_message_cancels_the_inflight_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Run A: think emits a slow bash call, then A is cancelled mid-run.
    // Run B: a single text reply.
    let provider = Arc::new(ScriptedProvider::new(vec![
        ScriptedProvider::tool_reply("t1", "bash", serde_json::json!({"command": "sleep 2"})),
        ScriptedProvider::text_reply("reply to B"),
    ]));
    let handler = Arc::new(FakeHandler::new());
    let state = build_state(dir.path(), provider, Arc::clone(&handler));

    spawn_event_handlers(Arc::clone(&state));
    let router = build_router(Arc::clone(&state));

    let (status, _) = post_webhook(
        router.clone(),
        "fake",
        serde_json::json!({"text": "message A", "session": "s9", "id": "a"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Let A start its bash substep, then send B for the same session.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (status, _) = post_webhook(
        router,
        "fake",
        serde_json::json!({"text": "message B", "session": "s9", "id": "b"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    wait_for("reply to B", || {
        !handler.delivered.lock().unwrap().is_empty()
    })
    .await;

    // A was cancelled without a user-visible reply; only B's landed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*handler.delivered.lock().unwrap(), vec!["reply to B"]);
}
