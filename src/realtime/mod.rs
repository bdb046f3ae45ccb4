// Live score feed: transport seam, STOMP over WebSocket, and the reconnecting channel.
pub mod channel;  // open/close state machine with fixed-delay reconnect
pub mod snapshot; // latest payload + fallback fetch
pub mod stomp;    // frame codec
pub mod ws;       // tokio-tungstenite transport

pub use channel::{open, ChannelConfig, ChannelHandle, ChannelState};
pub use snapshot::{fetch_snapshot, LiveScore, ScoreSnapshot};
pub use ws::StompTransport;

use crate::net::TransportError;

/// Opaque id of one topic subscription on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionId(pub String);

/// Factory for persistent connections to the push feed.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// One live transport connection.
#[async_trait::async_trait]
pub trait Connection: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError>;

    /// Next message body. `None` once the peer has gone away.
    async fn next_message(&mut self) -> Option<Result<String, TransportError>>;

    async fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError>;

    /// Tear down the connection. Best effort; never fails.
    async fn disconnect(self: Box<Self>);
}
