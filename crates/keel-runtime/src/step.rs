//! Named durable substeps with journal replay, auto-indexing, and retry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};
use crate::journal::RunJournal;

/// Attempts per substep before the run itself is failed.
const STEP_ATTEMPTS: u32 = 3;
/// Base backoff between substep attempts; doubles each retry.
const STEP_BACKOFF: Duration = Duration::from_millis(500);

/// Execution context threaded through one durable run.
///
/// `step` is the only suspension point the engine is allowed to use: it
/// checks for cancellation, resolves the auto-indexed step name, replays a
/// previously recorded output when one exists, and otherwise executes the
/// body with retries before journaling its output.
pub struct StepContext {
    run_id: String,
    journal: RunJournal,
    cancel: CancellationToken,
    counters: Mutex<HashMap<String, u32>>,
}

impl StepContext {
    pub fn new(run_id: String, journal: RunJournal, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            journal,
            cancel,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token cancelled whenever this run is cancelled. Handed to child
    /// runs (sub-agents) so cancellation propagates through delegation.
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Reset step-name counters. Called once per run attempt so a retried
    /// run resolves the same names (`think:0`, `think:1`, ...) and hits the
    /// journal instead of re-executing.
    pub fn reset_counters(&self) {
        self.counters.lock().unwrap().clear();
    }

    /// Resolve `name` to its indexed form for this attempt: the first
    /// occurrence of `think` becomes `think:0`, the next `think:1`, etc.
    fn next_indexed(&self, name: &str) -> String {
        let mut counters = self.counters.lock().unwrap();
        let idx = counters.entry(name.to_string()).or_insert(0);
        let full = format!("{name}:{idx}");
        *idx += 1;
        full
    }

    /// Execute `body` as the named durable substep.
    ///
    /// The body is a factory producing one attempt's future; it runs up to
    /// [`STEP_ATTEMPTS`] times with exponential backoff. Output is recorded
    /// in the journal only after a successful attempt, so a crash mid-step
    /// re-executes it on the next run attempt.
    pub async fn step<T, E, F, Fut>(&self, name: &str, body: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        E: std::fmt::Display,
        F: Fn() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let step_name = self.next_indexed(name);

        if let Some(recorded) = self.journal.lookup(&step_name) {
            debug!(run = %self.run_id, step = %step_name, "replaying recorded substep output");
            return serde_json::from_value(recorded).map_err(|e| {
                RuntimeError::Journal(format!("corrupt recorded output for '{step_name}': {e}"))
            });
        }

        let mut backoff = STEP_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=STEP_ATTEMPTS {
            if self.cancel.is_cancelled() {
                return Err(RuntimeError::Cancelled);
            }

            match body().await {
                Ok(output) => {
                    let value = serde_json::to_value(&output)?;
                    self.journal.record(&step_name, value)?;
                    return Ok(output);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        run = %self.run_id,
                        step = %step_name,
                        attempt,
                        error = %last_error,
                        "substep attempt failed"
                    );
                    if attempt < STEP_ATTEMPTS {
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = self.cancel.cancelled() => return Err(RuntimeError::Cancelled),
                        }
                        backoff *= 2;
                    }
                }
            }
        }

        Err(RuntimeError::StepFailed {
            step: step_name,
            attempts: STEP_ATTEMPTS,
            reason: last_error,
        })
    }
}
