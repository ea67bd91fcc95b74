//! Sub-agent delegation: an isolated child run in its own context window.
//!
//! The child gets a fresh session key (no parent history), the sub-agent
//! tool registry (no recursive delegation), and its own journal. The parent
//! only ever sees the child's final response; a failed child becomes an
//! error tool result rather than a parent failure.

use chrono::Utc;
use keel_runtime::Executor;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::run::run_agent;
use crate::services::Services;

/// What the parent's `delegate` substep records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateOutcome {
    pub summary: String,
    pub is_error: bool,
}

/// Fresh session key for a child run, derived from the parent's.
pub fn sub_session_key(parent: &str) -> String {
    format!("sub-{parent}-{}", Utc::now().timestamp_millis())
}

/// Run `task` in an isolated sub-agent and return its summary.
///
/// Infallible by design: child failures are folded into the outcome, except
/// cancellation, which must propagate so the parent stops too.
pub async fn spawn(
    services: &Services,
    cancel: CancellationToken,
    parent_session_key: &str,
    task: String,
) -> Result<DelegateOutcome, keel_runtime::RuntimeError> {
    let session_key = sub_session_key(parent_session_key);
    info!(parent = %parent_session_key, sub = %session_key, "spawning sub-agent");

    let framed = format!(
        "## Sub-Agent Context\n\
         You are a sub-agent working on one delegated task. You have a fresh \
         context window and cannot see the parent conversation. Work the task \
         to completion, then reply with a concise summary of what you did and \
         found; that summary is the only thing the parent agent receives.\n\n\
         ## Your Task\n{task}"
    );

    let executor = Executor::new(services.workspace());
    let result = executor
        .run(&session_key, cancel, |ctx| {
            let framed = framed.clone();
            let session_key = session_key.clone();
            async move { Box::pin(run_agent(services, &ctx, &session_key, &framed, true)).await }
        })
        .await;

    match result {
        Ok(run) => Ok(DelegateOutcome {
            summary: run.response,
            is_error: false,
        }),
        Err(keel_runtime::RuntimeError::Cancelled) => Err(keel_runtime::RuntimeError::Cancelled),
        Err(e) => {
            warn!(sub = %session_key, error = %e, "sub-agent run failed");
            Ok(DelegateOutcome {
                summary: format!("Error: sub-agent failed: {e}"),
                is_error: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_session_keys_are_namespaced_under_the_parent() {
        let key = sub_session_key("telegram-42");
        assert!(key.starts_with("sub-telegram-42-"));
    }
}
