//! Per-connection state for WebSocket connections.

use super::protocol::Message;
use crate::fingerprint::FingerprintMap;
use tokio::sync::{mpsc, Mutex};

/// Unique connection ID.
pub type ConnectionId = String;

/// Outgoing message to send to a WebSocket client.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    /// JSON text frame
    Text(String),
    /// Close the connection with a code and reason
    Close { code: u16, reason: String },
}

/// One connected peer as the hub sees it.
#[derive(Debug)]
pub struct WsConnection {
    /// Unique connection ID (server-generated UUID)
    pub id: ConnectionId,

    /// What this peer last sent or was sent, per file
    fingerprints: Mutex<FingerprintMap>,

    /// Sender for outgoing messages to this connection
    sender: mpsc::Sender<OutgoingMessage>,
}

impl WsConnection {
    /// Create a new connection.
    pub fn new(sender: mpsc::Sender<OutgoingMessage>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprints: Mutex::new(FingerprintMap::new()),
            sender,
        }
    }

    /// Access this connection's fingerprint map.
    pub fn fingerprints(&self) -> &Mutex<FingerprintMap> {
        &self.fingerprints
    }

    /// Send a message to this connection (non-blocking).
    /// Returns false if the channel is full or closed.
    pub fn try_send(&self, msg: OutgoingMessage) -> bool {
        self.sender.try_send(msg).is_ok()
    }

    /// Send a protocol message.
    pub fn try_send_message(&self, msg: &Message) -> bool {
        self.try_send(OutgoingMessage::Text(msg.encode()))
    }

    /// Send a patch unless this peer already has that content.
    /// Returns true if the patch was queued.
    pub async fn send_if_changed(&self, wire_name: &str, msg: &Message, content: &str) -> bool {
        let mut fingerprints = self.fingerprints.lock().await;
        if fingerprints.is_unchanged(wire_name, content) {
            return false;
        }
        if self.try_send_message(msg) {
            fingerprints.record(wire_name, content);
            true
        } else {
            false
        }
    }
}
