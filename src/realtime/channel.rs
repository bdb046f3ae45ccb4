//! One logical subscription to the live score feed, kept alive across
//! transport churn.
//!
//! `Closed → Connecting → Connected → Subscribed`; a lost or failed connection
//! goes through `Reconnecting` and back to `Connecting` after a fixed delay,
//! forever, until the consumer closes the channel. The retry loop is owned by a
//! single task, so messages are handled one at a time in arrival order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::snapshot::ScoreSnapshot;
use super::{Connection, SubscriptionId, Transport};
use crate::config::RealtimeSettings;
use crate::net::{with_deadline, RequestError, TransportError};

// Upper bound on unsubscribe + disconnect during teardown
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Connected,
    Subscribed,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Fixed delay between a failure and the next connect attempt. No
    /// exponential growth and no retry cap.
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from(&RealtimeSettings::default())
    }
}

impl From<&RealtimeSettings> for ChannelConfig {
    fn from(s: &RealtimeSettings) -> Self {
        Self {
            reconnect_delay: s.reconnect_delay(),
            connect_timeout: s.connect_timeout(),
        }
    }
}

/// Open a channel on `topic`. Every inbound message replaces the snapshot and
/// is then passed to `handler`. Must be called inside a tokio runtime.
pub fn open<H>(
    transport: Arc<dyn Transport>,
    topic: &str,
    config: ChannelConfig,
    handler: H,
) -> ChannelHandle
where
    H: FnMut(&ScoreSnapshot) + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
    let (snapshot_tx, snapshot_rx) = watch::channel(None);

    let task = ChannelTask {
        transport,
        topic: topic.to_string(),
        config,
        handler: Box::new(handler),
        shutdown: shutdown_rx,
        state: state_tx,
        snapshot: snapshot_tx,
    };
    info!(topic, "opening realtime channel");
    let join = tokio::spawn(task.run());

    ChannelHandle {
        topic: topic.to_string(),
        shutdown: shutdown_tx,
        state: state_rx,
        snapshot: snapshot_rx,
        task: Mutex::new(Some(join)),
    }
}

/// Consumer side of an open channel. Dropping it tears the channel down.
pub struct ChannelHandle {
    topic: String,
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<ChannelState>,
    snapshot: watch::Receiver<Option<ScoreSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Latest live payload, if any arrived yet.
    pub fn snapshot(&self) -> Option<ScoreSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Latest live payload, or `fallback` while nothing live has arrived.
    pub fn snapshot_or(&self, fallback: Option<&ScoreSnapshot>) -> Option<ScoreSnapshot> {
        self.snapshot().or_else(|| fallback.cloned())
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Option<ScoreSnapshot>> {
        self.snapshot.clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Unsubscribe, disconnect, cancel any pending reconnect, and wait for
    /// the channel to reach `Closed`. Calling it again does nothing.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(topic = %self.topic, error = %e, "realtime channel task ended abnormally");
            }
            debug!(topic = %self.topic, "realtime channel closed");
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        // The task sees this and tears down on its own
        self.shutdown.send_replace(true);
    }
}

enum SessionEnd {
    Closed,
    Lost(RequestError),
}

/// Transport handles held for one connection attempt.
struct ChannelSession {
    connection: Box<dyn Connection>,
    subscription: Option<SubscriptionId>,
}

impl ChannelSession {
    // Unsubscribe (when the link is still usable) and disconnect
    async fn release(mut self, graceful: bool) {
        let teardown = async move {
            if let (true, Some(id)) = (graceful, self.subscription.take()) {
                if let Err(e) = self.connection.unsubscribe(&id).await {
                    debug!(error = %e, "unsubscribe failed during teardown");
                }
            }
            self.connection.disconnect().await;
        };
        if tokio::time::timeout(TEARDOWN_TIMEOUT, teardown).await.is_err() {
            warn!("transport teardown timed out, dropping connection");
        }
    }
}

struct ChannelTask {
    transport: Arc<dyn Transport>,
    topic: String,
    config: ChannelConfig,
    handler: Box<dyn FnMut(&ScoreSnapshot) + Send>,
    shutdown: watch::Receiver<bool>,
    state: watch::Sender<ChannelState>,
    snapshot: watch::Sender<Option<ScoreSnapshot>>,
}

impl ChannelTask {
    async fn run(mut self) {
        loop {
            if self.is_closed() {
                break;
            }
            self.set_state(ChannelState::Connecting);

            match self.run_session().await {
                SessionEnd::Closed => break,
                SessionEnd::Lost(e) => {
                    self.set_state(ChannelState::Reconnecting);
                    metrics::counter!("ipl_sync_realtime_reconnects_total").increment(1);
                    warn!(
                        topic = %self.topic,
                        error = %e,
                        "realtime connection lost, reconnecting in {:?}",
                        self.config.reconnect_delay
                    );
                    if !self.backoff().await {
                        break;
                    }
                }
            }
        }
        self.set_state(ChannelState::Closed);
        info!(topic = %self.topic, "realtime channel stopped");
    }

    async fn run_session(&mut self) -> SessionEnd {
        let connected = tokio::select! {
            biased;
            _ = closed(&mut self.shutdown) => None,
            res = with_deadline(self.config.connect_timeout, self.transport.connect()) => Some(res),
        };
        let connection = match connected {
            None => return SessionEnd::Closed,
            Some(Ok(c)) => c,
            Some(Err(e)) => return SessionEnd::Lost(e),
        };
        let mut session = ChannelSession { connection, subscription: None };
        self.set_state(ChannelState::Connected);

        let subscribed = tokio::select! {
            biased;
            _ = closed(&mut self.shutdown) => None,
            res = session.connection.subscribe(&self.topic) => Some(res),
        };
        match subscribed {
            None => {
                session.release(true).await;
                return SessionEnd::Closed;
            }
            Some(Err(e)) => {
                session.release(false).await;
                return SessionEnd::Lost(e.into());
            }
            Some(Ok(id)) => session.subscription = Some(id),
        }
        self.set_state(ChannelState::Subscribed);
        info!(topic = %self.topic, "realtime channel subscribed");

        loop {
            let next = tokio::select! {
                biased;
                _ = closed(&mut self.shutdown) => None,
                msg = session.connection.next_message() => Some(msg),
            };
            match next {
                None => {
                    session.release(true).await;
                    return SessionEnd::Closed;
                }
                Some(Some(Ok(text))) => self.deliver(&text),
                Some(Some(Err(e))) => {
                    session.release(false).await;
                    return SessionEnd::Lost(e.into());
                }
                Some(None) => {
                    session.release(false).await;
                    return SessionEnd::Lost(TransportError::Closed.into());
                }
            }
        }
    }

    fn deliver(&mut self, text: &str) {
        let snapshot = match ScoreSnapshot::from_json(text) {
            Ok(s) => s,
            Err(e) => {
                warn!(topic = %self.topic, error = %e, "dropping non-json message");
                return;
            }
        };
        metrics::counter!("ipl_sync_realtime_messages_total").increment(1);
        self.snapshot.send_replace(Some(snapshot.clone()));
        (self.handler)(&snapshot);
    }

    // false when the channel was closed while waiting
    async fn backoff(&mut self) -> bool {
        tokio::select! {
            biased;
            _ = closed(&mut self.shutdown) => false,
            _ = tokio::time::sleep(self.config.reconnect_delay) => true,
        }
    }

    fn is_closed(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    fn set_state(&self, state: ChannelState) {
        let prev = self.state.send_replace(state);
        if prev != state {
            debug!(topic = %self.topic, ?prev, ?state, "channel state");
        }
    }
}

// Resolves once close was requested or the handle is gone
async fn closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}
