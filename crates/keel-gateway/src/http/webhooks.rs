//! Webhook ingress: POST /webhooks/{channel}.
//!
//! Runs the channel's transform and either publishes the canonical event,
//! answers a platform challenge synchronously, or records a discard. All
//! classified outcomes return 200 so platforms do not re-deliver payloads
//! we have already judged.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use keel_channels::TransformOutcome;
use keel_runtime::BusEvent;

use crate::app::AppState;

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let Some(transform) = state.registry.transform(&channel) else {
        warn!(channel = %channel, "webhook for unknown channel");
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown channel"})),
        )
            .into_response();
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(channel = %channel, error = %e, "webhook body is not JSON");
            state.bus.emit(BusEvent::Discarded {
                event: format!("{channel}/transform.failed"),
                payload: Value::Null,
            });
            return (StatusCode::OK, Json(json!({"ok": true}))).into_response();
        }
    };

    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    match transform.transform(&payload, &header_map, &query) {
        TransformOutcome::Event(event) => {
            info!(
                channel = %channel,
                session = %event.session_key,
                "webhook normalized to message event"
            );
            state.bus.emit(BusEvent::MessageReceived(*event));
            (StatusCode::OK, Json(json!({"ok": true}))).into_response()
        }
        TransformOutcome::Challenge(answer) => {
            debug!(channel = %channel, "answering platform challenge");
            (StatusCode::OK, answer).into_response()
        }
        TransformOutcome::Discard { event } => {
            debug!(channel = %channel, event = %event, "webhook discarded");
            state.bus.emit(BusEvent::Discarded { event, payload });
            (StatusCode::OK, Json(json!({"ok": true}))).into_response()
        }
    }
}
