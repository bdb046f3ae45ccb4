//! Deferred execution of non-urgent work.
//!
//! Work submitted here runs when the host reports itself idle, and never later
//! than the submission's deferral bound. Each work item is keyed; a second
//! submission under a key that is still waiting to run is ignored.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Dispatch delay used when the host cannot report idleness at all.
pub const UNSUPPORTED_IDLE_FALLBACK: Duration = Duration::from_millis(250);

/// Why a work item was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Idle,
    Deadline,
}

/// Host-side handle used to report idleness to the scheduler.
#[derive(Debug, Clone)]
pub struct IdleSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl IdleSignal {
    pub fn mark_idle(&self) {
        self.tx.send_replace(true);
    }

    pub fn mark_busy(&self) {
        self.tx.send_replace(false);
    }
}

enum IdleSource {
    Signal(watch::Receiver<bool>),
    Unsupported,
}

pub struct IdleScheduler {
    source: IdleSource,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl IdleScheduler {
    /// Scheduler driven by an explicit idle signal. The host starts busy.
    pub fn new() -> (Self, IdleSignal) {
        let (tx, rx) = watch::channel(false);
        let scheduler = Self {
            source: IdleSource::Signal(rx),
            pending: Arc::new(Mutex::new(HashSet::new())),
        };
        (scheduler, IdleSignal { tx: Arc::new(tx) })
    }

    /// Scheduler for hosts with no idle detection; work runs after
    /// [`UNSUPPORTED_IDLE_FALLBACK`] (or the deferral bound, if shorter).
    pub fn without_idle_detection() -> Self {
        Self {
            source: IdleSource::Unsupported,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.lock().contains(key)
    }

    /// Submit `work` under `key`. Returns `None` if the same key is still
    /// waiting to be dispatched. Must be called inside a tokio runtime.
    pub fn schedule<F, Fut>(
        &self,
        key: &str,
        max_deferral: Duration,
        work: F,
    ) -> Option<ScheduledTask<Fut::Output>>
    where
        F: FnOnce(Dispatch) -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        if !self.pending.lock().insert(key.to_string()) {
            debug!(key, "work already pending, ignoring duplicate submission");
            return None;
        }

        let guard = PendingGuard {
            key: key.to_string(),
            pending: self.pending.clone(),
        };
        let mut idle = match &self.source {
            IdleSource::Signal(rx) => Some(rx.clone()),
            IdleSource::Unsupported => None,
        };
        let key_owned = key.to_string();

        let handle = tokio::spawn(async move {
            let dispatch = match idle.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = wait_idle(rx) => Dispatch::Idle,
                        _ = tokio::time::sleep(max_deferral) => Dispatch::Deadline,
                    }
                }
                None => {
                    tokio::time::sleep(UNSUPPORTED_IDLE_FALLBACK.min(max_deferral)).await;
                    Dispatch::Deadline
                }
            };
            debug!(key = %key_owned, ?dispatch, "dispatching deferred work");
            // Once dispatched the key may be submitted again
            drop(guard);
            work(dispatch).await
        });

        Some(ScheduledTask {
            key: key.to_string(),
            handle,
        })
    }
}

async fn wait_idle(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|idle| *idle).await.is_err() {
        // Signal gone: never idle, the deadline decides
        std::future::pending::<()>().await;
    }
}

// Clears the pending key on dispatch, or when the task is aborted before it
struct PendingGuard {
    key: String,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}

/// Handle to a submitted work item.
pub struct ScheduledTask<T> {
    key: String,
    handle: JoinHandle<T>,
}

impl<T> ScheduledTask<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cancel the work item. Has no effect once the work has finished.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the work to finish. `None` if it was cancelled or panicked.
    pub async fn wait(self) -> Option<T> {
        self.handle.await.ok()
    }
}
