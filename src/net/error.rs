use std::time::Duration;

use thiserror::Error;

/// Failure of a single deadline-bounded outbound call.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }
}

/// Anything that went wrong below the application layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    // Non-2xx responses count as transport failures for this subsystem
    #[error("unexpected status {status}")]
    Status { status: u16, body: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Url(u) => TransportError::InvalidUrl(u.to_string()),
            other => TransportError::Connection(other.to_string()),
        }
    }
}
