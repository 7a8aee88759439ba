//! Trait abstraction for the telemetry socket to enable testing

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{DashboardError, Result};

/// Event delivered by an open socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text payload for the aggregator
    Message(String),
    /// Transport-level failure; a `Closed` event follows
    Error(String),
    /// The socket is closed and will deliver nothing further
    Closed,
}

/// An open telemetry socket
#[async_trait]
pub trait TelemetrySocket: Send {
    /// Wait for the next event
    async fn next_event(&mut self) -> SocketEvent;

    /// Send a text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Close the socket
    async fn close(&mut self) -> Result<()>;
}

/// Opens telemetry sockets
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn TelemetrySocket>>;
}

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn TelemetrySocket>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| DashboardError::Transport(format!("Failed to connect to {}: {}", url, e)))?;

        debug!("WebSocket handshake with {} completed ({})", url, response.status());
        Ok(Box::new(WsSocket { stream, failed: false }))
    }
}

/// Wrapper around a `WebSocketStream` that implements [`TelemetrySocket`]
pub struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Set once an error has been reported so the next event is `Closed`
    failed: bool,
}

impl std::fmt::Debug for WsSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSocket")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TelemetrySocket for WsSocket {
    async fn next_event(&mut self) -> SocketEvent {
        if self.failed {
            return SocketEvent::Closed;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketEvent::Message(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return SocketEvent::Message(text),
                    Err(e) => warn!("Dropping non-UTF-8 binary frame: {}", e),
                },
                // Ping/pong are answered by tungstenite; a close frame is
                // followed by the end of the stream.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.failed = true;
                    return SocketEvent::Error(e.to_string());
                }
                None => return SocketEvent::Closed,
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| DashboardError::Transport(format!("Failed to send frame: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| DashboardError::Transport(format!("Failed to close socket: {}", e)))
    }
}
