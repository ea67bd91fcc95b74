//! GET /healthz: liveness plus the registered channel list.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "agent": state.config.agent.name,
        "channels": state.registry.channel_names(),
    }))
}
