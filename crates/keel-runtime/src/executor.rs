//! Run-level durability: re-invoke a failed durable function over its
//! existing journal so completed substeps replay instead of re-executing.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, RuntimeError};
use crate::journal::RunJournal;
use crate::step::StepContext;

/// Additional attempts after the first failed invocation of a run body.
const RUN_RETRIES: u32 = 2;
/// Pause between run-level attempts.
const RUN_BACKOFF: Duration = Duration::from_secs(1);

/// Executes durable functions against journals stored under
/// `{workspace}/runs/`.
#[derive(Clone)]
pub struct Executor {
    runs_dir: PathBuf,
}

impl Executor {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: workspace.into().join("runs"),
        }
    }

    /// Run `body` durably under `run_id`.
    ///
    /// The body receives a shared [`StepContext`] and must route every
    /// external effect through [`StepContext::step`]. On failure the body is
    /// re-invoked (up to [`RUN_RETRIES`] more times) with reset step
    /// counters over the same journal, so completed substeps replay their
    /// recorded outputs. Cancellation is terminal and never retried.
    pub async fn run<T, F, Fut>(
        &self,
        run_id: &str,
        cancel: CancellationToken,
        body: F,
    ) -> Result<T>
    where
        F: Fn(Arc<StepContext>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let journal = RunJournal::open(&self.runs_dir, run_id)?;
        let ctx = Arc::new(StepContext::new(run_id.to_string(), journal, cancel));

        let mut last_err: Option<RuntimeError> = None;
        for attempt in 0..=RUN_RETRIES {
            ctx.reset_counters();
            match body(Arc::clone(&ctx)).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(run = run_id, attempt, "durable run recovered on retry");
                    }
                    return Ok(value);
                }
                Err(RuntimeError::Cancelled) => return Err(RuntimeError::Cancelled),
                Err(e) => {
                    warn!(run = run_id, attempt, error = %e, "durable run attempt failed");
                    last_err = Some(e);
                    if attempt < RUN_RETRIES {
                        tokio::time::sleep(RUN_BACKOFF).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RuntimeError::Other("run failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retried_run_replays_completed_substeps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = Executor::new(dir.path());
        let side_effects = Arc::new(AtomicU32::new(0));
        let invocations = Arc::new(AtomicU32::new(0));

        let fx = Arc::clone(&side_effects);
        let inv = Arc::clone(&invocations);
        let result: Result<String> = executor
            .run("run-x", CancellationToken::new(), move |ctx| {
                let fx = Arc::clone(&fx);
                let inv = Arc::clone(&inv);
                async move {
                    let attempt = inv.fetch_add(1, Ordering::SeqCst);

                    let first: u32 = ctx
                        .step("effect", || {
                            let fx = Arc::clone(&fx);
                            async move { Ok::<_, String>(fx.fetch_add(1, Ordering::SeqCst)) }
                        })
                        .await?;

                    // Fail between substeps on the first invocation only.
                    if attempt == 0 {
                        return Err(RuntimeError::Other("crash between substeps".into()));
                    }

                    Ok(format!("effect ran with value {first}"))
                }
            })
            .await;

        assert_eq!(result.unwrap(), "effect ran with value 0");
        // the side effect executed exactly once despite two invocations
        assert_eq!(side_effects.load(Ordering::SeqCst), 1);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_is_not_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = Executor::new(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let invocations = Arc::new(AtomicU32::new(0));
        let inv = Arc::clone(&invocations);
        let result: Result<u32> = executor
            .run("run-y", cancel, move |ctx| {
                let inv = Arc::clone(&inv);
                async move {
                    inv.fetch_add(1, Ordering::SeqCst);
                    ctx.step("noop", || async { Ok::<_, String>(1) }).await
                }
            })
            .await;

        assert!(matches!(result, Err(RuntimeError::Cancelled)));
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
