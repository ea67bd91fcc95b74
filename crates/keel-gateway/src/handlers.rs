//! Event wiring: the fan-out from `agent.message.received` to acknowledge
//! and the durable agent run, reply dispatch, the global failure handler,
//! and the heartbeat cron.

use std::sync::Arc;

use keel_agent::heartbeat::run_heartbeat;
use keel_agent::run::run_agent;
use keel_channels::dispatch;
use keel_core::event::{FunctionFailed, MessageReceived, ReplyReady};
use keel_runtime::cron::CronTrigger;
use keel_runtime::{BusEvent, RuntimeError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::AppState;

/// Subscribe to the bus and drive every handler. Each event kind is
/// processed in its own task so the fan-out never serializes.
pub fn spawn_event_handlers(state: Arc<AppState>) {
    let mut rx = state.bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(ev) => ev,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "event handler lagged behind the bus");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            };

            match event {
                BusEvent::MessageReceived(ev) => {
                    // Acknowledge and handle in parallel.
                    let ack_state = Arc::clone(&state);
                    let ack_event = ev.clone();
                    tokio::spawn(async move {
                        dispatch::acknowledge(&ack_state.registry, &ack_event).await;
                    });
                    handle_message(Arc::clone(&state), ev).await;
                }
                BusEvent::ReplyReady(ev) => {
                    let reply_state = Arc::clone(&state);
                    tokio::spawn(async move {
                        deliver_reply(reply_state, ev).await;
                    });
                }
                BusEvent::FunctionFailed(failed) => {
                    let fail_state = Arc::clone(&state);
                    tokio::spawn(async move {
                        dispatch::handle_failure(&fail_state.registry, &failed).await;
                    });
                }
                BusEvent::Discarded { event, .. } => {
                    debug!(event = %event, "discarded by normalizer");
                }
            }
        }
    });
}

/// Run the agent for one inbound message under the per-session singleton:
/// a newer message for the same key cancels the in-flight run first.
pub async fn handle_message(state: Arc<AppState>, event: MessageReceived) {
    let session_key = event.session_key.clone();
    let run_state = Arc::clone(&state);

    state
        .supervisor
        .submit(&session_key, move |cancel| async move {
            run_message(run_state, event, cancel).await;
        })
        .await;
}

async fn run_message(state: Arc<AppState>, event: MessageReceived, cancel: CancellationToken) {
    // Stable per-message run id: retries of this run replay its journal.
    let run_id = format!(
        "{}-{}",
        event.session_key,
        event
            .destination
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    );

    let services = Arc::clone(&state.services);
    let session_key = event.session_key.clone();
    let message = event.message.clone();

    let result = state
        .executor
        .run(&run_id, cancel, |ctx| {
            let services = Arc::clone(&services);
            let session_key = session_key.clone();
            let message = message.clone();
            async move { run_agent(&services, &ctx, &session_key, &message, false).await }
        })
        .await;

    match result {
        Ok(run) => {
            info!(
                session = %event.session_key,
                iterations = run.iterations,
                tool_calls = run.tool_calls,
                "reply ready"
            );
            state.bus.emit(BusEvent::ReplyReady(ReplyReady {
                response: run.response,
                channel: event.channel,
                destination: event.destination,
                channel_meta: event.channel_meta,
            }));
        }
        Err(RuntimeError::Cancelled) => {
            info!(session = %event.session_key, "run cancelled by a newer message");
        }
        Err(e) => {
            state.bus.emit(BusEvent::FunctionFailed(FunctionFailed {
                function: "handle_message".to_string(),
                error: e.to_string(),
                event: Some(event),
            }));
        }
    }
}

async fn deliver_reply(state: Arc<AppState>, event: ReplyReady) {
    if let Err(e) = dispatch::send_reply(&state.registry, &event).await {
        state.bus.emit(BusEvent::FunctionFailed(FunctionFailed {
            function: "send_reply".to_string(),
            error: e.to_string(),
            event: None,
        }));
    }
}

/// Start the heartbeat cron. Each firing runs the distillation as its own
/// durable function keyed by the fire minute.
pub fn spawn_heartbeat(state: Arc<AppState>) -> keel_core::Result<()> {
    let trigger = CronTrigger::parse(&state.config.heartbeat.cron)
        .map_err(|e| keel_core::KeelError::Config(e.to_string()))?;

    tokio::spawn(async move {
        let state = state;
        trigger
            .run(CancellationToken::new(), || {
                let state = Arc::clone(&state);
                async move {
                    let run_id = format!(
                        "heartbeat-{}",
                        chrono::Utc::now().format("%Y%m%d%H%M")
                    );
                    let services = Arc::clone(&state.services);
                    let outcome = state
                        .executor
                        .run(&run_id, CancellationToken::new(), |ctx| {
                            let services = Arc::clone(&services);
                            async move { run_heartbeat(&services, &ctx).await }
                        })
                        .await;
                    if let Err(e) = outcome {
                        warn!(error = %e, "heartbeat run failed");
                    }
                }
            })
            .await;
    });

    Ok(())
}
