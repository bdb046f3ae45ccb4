// STOMP over a tokio-tungstenite WebSocket.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::stomp::{self, Frame, Inbound};
use super::{Connection, SubscriptionId, Transport};
use crate::net::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct StompTransport {
    url: String,
    host: String,
}

impl StompTransport {
    pub fn new(url: &str) -> Result<Self, TransportError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => return Err(TransportError::InvalidUrl(format!("unsupported scheme {other}"))),
        }
        let host = parsed.host_str().unwrap_or("localhost").to_string();
        Ok(Self { url: url.to_string(), host })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Transport for StompTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        debug!(url = %self.url, "opening websocket");
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (write, read) = ws.split();
        let mut conn = StompConnection { write, read, next_sub: 0 };

        conn.send(Frame::connect(&self.host)).await?;
        match conn.next_frame().await {
            Some(Ok(f)) if f.command == "CONNECTED" => {
                debug!(version = ?f.get("version"), "stomp session established");
                Ok(Box::new(conn) as Box<dyn Connection>)
            }
            Some(Ok(f)) if f.command == "ERROR" => Err(TransportError::Protocol(format!(
                "broker refused connect: {}",
                f.get("message").unwrap_or(f.body.as_str())
            ))),
            Some(Ok(f)) => Err(TransportError::Protocol(format!(
                "expected CONNECTED, got {}",
                f.command
            ))),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Closed),
        }
    }
}

struct StompConnection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    next_sub: u64,
}

impl StompConnection {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.write.send(Message::Text(frame.encode())).await?;
        Ok(())
    }

    // Next non-heartbeat frame, answering pings along the way
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let msg = match self.read.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            match msg {
                Message::Text(text) => match stomp::decode(&text) {
                    Ok(Inbound::Frame(f)) => return Some(Ok(f)),
                    Ok(Inbound::Heartbeat) => continue,
                    Err(e) => return Some(Err(e)),
                },
                Message::Binary(bytes) => match std::str::from_utf8(&bytes).map(stomp::decode) {
                    Ok(Ok(Inbound::Frame(f))) => return Some(Ok(f)),
                    Ok(Ok(Inbound::Heartbeat)) => continue,
                    Ok(Err(e)) => return Some(Err(e)),
                    Err(_) => {
                        return Some(Err(TransportError::Protocol("binary frame is not utf-8".into())))
                    }
                },
                Message::Ping(data) => {
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Message::Close(frame) => {
                    debug!(?frame, "websocket closed by server");
                    return None;
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl Connection for StompConnection {
    async fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId(format!("sub-{}", self.next_sub));
        self.next_sub += 1;
        self.send(Frame::subscribe(&id.0, topic)).await?;
        Ok(id)
    }

    async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let frame = match self.next_frame().await? {
                Ok(f) => f,
                Err(e) => return Some(Err(e)),
            };
            match frame.command.as_str() {
                "MESSAGE" => return Some(Ok(frame.body)),
                "ERROR" => {
                    return Some(Err(TransportError::Protocol(
                        frame.get("message").unwrap_or(frame.body.as_str()).to_string(),
                    )))
                }
                other => debug!(command = other, "ignoring stomp frame"),
            }
        }
    }

    async fn unsubscribe(&mut self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.send(Frame::unsubscribe(&id.0)).await
    }

    async fn disconnect(self: Box<Self>) {
        let mut conn = self;
        if let Err(e) = conn.send(Frame::disconnect()).await {
            debug!(error = %e, "stomp disconnect not delivered");
        }
        if let Err(e) = conn.write.close().await {
            warn!(error = %e, "websocket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_ws_scheme() {
        assert!(StompTransport::new("wss://backend.example.com/ws").is_ok());
        assert!(matches!(
            StompTransport::new("https://backend.example.com/ws"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_host_from_url() {
        let t = StompTransport::new("ws://localhost:8080/ws").unwrap();
        assert_eq!(t.host, "localhost");
        assert_eq!(t.url(), "ws://localhost:8080/ws");
    }
}
