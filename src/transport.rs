//! Transport collaborator contract between the engine and a connection adapter
//!
//! The engine never touches sockets. An adapter (see `ws_client`) owns the
//! connection and retry policy, delivers [`TransportEvent`]s in arrival order
//! over an mpsc channel, and drains outbound frames from a [`FrameSink`].

use tokio::sync::mpsc;

/// Reason reported with a connection loss
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection cleanly
    Closed,
    /// The connection failed with a transport error
    Error(String),
    /// The adapter was shut down locally
    Shutdown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Closed => write!(f, "closed by peer"),
            DisconnectReason::Error(e) => write!(f, "transport error: {}", e),
            DisconnectReason::Shutdown => write!(f, "local shutdown"),
        }
    }
}

/// Connection lifecycle and inbound frames, in arrival order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Handshake completed; fired once per successful connect
    Connected,
    /// Connection lost; fired once per loss
    Disconnected { reason: DisconnectReason },
    /// One complete inbound text frame
    Frame(String),
}

/// Coarse connection state published on the engine's status watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Outbound frame handle
///
/// Sending serializes and transmits immediately when a connection is up;
/// otherwise frames are silently dropped. The handle is cheap to clone.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::UnboundedSender<String>,
}

impl FrameSink {
    /// Create a sink and the receiving half an adapter drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue one serialized frame; dropped if the adapter is gone
    pub fn send_text(&self, text: String) {
        let _ = self.tx.send(text);
    }
}
