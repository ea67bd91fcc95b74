//! Per-session singleton supervisor with cancel-on-new-message semantics.
//!
//! At most one run is in flight per session key. Submitting work for a key
//! that already has a run in flight cancels the old run, waits for it to
//! stop at its next substep boundary, and only then starts the new one, so
//! a cancelled run never commits further substeps after its replacement has
//! begun.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct RunSlot {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SessionSupervisor {
    /// Per-key submit lock: serializes concurrent submissions for one key.
    locks: DashMap<String, Arc<Mutex<()>>>,
    slots: DashMap<String, RunSlot>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
            slots: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Submit a run for `session_key`. `body` receives the run's
    /// cancellation token and must observe it at substep boundaries.
    pub async fn submit<F, Fut>(&self, session_key: &str, body: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let lock = self.lock_for(session_key);
        let _guard = lock.lock().await;

        // Cancel-on-new: stop the in-flight run before starting the new one.
        if let Some((_, old)) = self.slots.remove(session_key) {
            if !old.handle.is_finished() {
                info!(session = %session_key, "newer message arrived, cancelling in-flight run");
            }
            old.cancel.cancel();
            let _ = old.handle.await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(body(cancel.clone()));
        self.slots
            .insert(session_key.to_string(), RunSlot { cancel, handle });
        debug!(session = %session_key, "run started");
    }

    /// True if a run for `session_key` has been started and not yet finished.
    pub fn is_running(&self, session_key: &str) -> bool {
        self.slots
            .get(session_key)
            .map(|slot| !slot.handle.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the current run for `session_key` (if any) to finish.
    /// Used by shutdown and tests; does not cancel.
    pub async fn wait_idle(&self, session_key: &str) {
        let lock = self.lock_for(session_key);
        let _guard = lock.lock().await;
        if let Some((_, slot)) = self.slots.remove(session_key) {
            let _ = slot.handle.await;
        }
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
