//! Duplex text links to the server.
//!
//! The transport only needs two things from a connection: send a text frame
//! and wait a bounded time for the next one. [`Link`] captures exactly that so
//! the session loop can run over a WebSocket in production and over an
//! in-memory pipe in tests.

use std::io;
use std::net::TcpStream;
use std::time::Duration;
use thiserror::Error;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message as Frame, WebSocket};

/// Failure of a connection attempt or of an established link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("connection closed")]
    Closed,

    #[error("websocket failure")]
    WebSocket(#[from] tungstenite::Error),

    #[error("socket failure")]
    Io(#[from] io::Error),
}

/// An established connection.
pub trait Link: Send {
    /// Send one text frame.
    fn send(&mut self, text: &str) -> Result<(), LinkError>;

    /// Wait up to `timeout` for the next text frame. `Ok(None)` means nothing
    /// arrived in time and the link is still usable.
    fn receive(&mut self, timeout: Duration) -> Result<Option<String>, LinkError>;
}

/// Opens new links; called once per connection attempt.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Link>, LinkError>;

    /// Human-readable endpoint for log lines.
    fn describe(&self) -> String;
}

/// Plain `ws://` connector.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    address: String,
}

impl WebSocketConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self) -> Result<Box<dyn Link>, LinkError> {
        let (socket, _response) =
            tungstenite::connect(self.address.as_str()).map_err(|e| LinkError::Connect {
                address: self.address.clone(),
                source: Box::new(e),
            })?;
        Ok(Box::new(WebSocketLink { socket }))
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}

struct WebSocketLink {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl WebSocketLink {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), LinkError> {
        // A zero timeout is rejected by the OS
        let timeout = timeout.max(Duration::from_millis(1));
        if let MaybeTlsStream::Plain(stream) = self.socket.get_mut() {
            stream.set_read_timeout(Some(timeout))?;
        }
        Ok(())
    }
}

impl Link for WebSocketLink {
    fn send(&mut self, text: &str) -> Result<(), LinkError> {
        self.socket.send(Frame::Text(text.to_string()))?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<String>, LinkError> {
        self.set_read_timeout(timeout)?;
        match self.socket.read() {
            Ok(Frame::Text(text)) => Ok(Some(text)),
            Ok(Frame::Close(_)) => Err(LinkError::Closed),
            // Pings are answered by tungstenite on the next read or write
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(LinkError::Closed)
            }
            Err(e) => Err(LinkError::WebSocket(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_connection_reports_address() {
        // Port 1 on loopback is reserved and normally closed
        let connector = WebSocketConnector::new("ws://127.0.0.1:1");
        let err = connector.connect().err().expect("connection must fail");
        assert!(matches!(err, LinkError::Connect { ref address, .. } if address == "ws://127.0.0.1:1"));
        assert_eq!(connector.describe(), "ws://127.0.0.1:1");
    }
}
