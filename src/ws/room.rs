//! Registry of connected peers on the hub.

use super::connection::{ConnectionId, OutgoingMessage, WsConnection};
use super::protocol::{Message, Patch};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// All WebSocket connections attached to the hub.
#[derive(Default)]
pub struct Room {
    connections: RwLock<HashMap<ConnectionId, Arc<WsConnection>>>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to this room.
    pub async fn add_connection(&self, conn: Arc<WsConnection>) {
        self.connections.write().await.insert(conn.id.clone(), conn);
    }

    /// Remove a connection from this room.
    pub async fn remove_connection(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Get the number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a patch to every connection except its author.
    ///
    /// Recipients that already hold this content are skipped. Returns the
    /// number of connections the patch was queued for.
    pub async fn broadcast_patch_except(&self, except_conn_id: &str, patch: &Patch) -> usize {
        let wire_name = match patch.filename.as_deref() {
            Some(name) => name,
            None => return 0,
        };
        let msg = Message::Patch(patch.clone());

        // Snapshot the recipients so the registry lock is not held across sends
        let recipients: Vec<Arc<WsConnection>> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(conn_id, _)| conn_id.as_str() != except_conn_id)
                .map(|(_, conn)| conn.clone())
                .collect()
        };

        let mut sent = 0;
        for conn in recipients {
            if conn.send_if_changed(wire_name, &msg, &patch.code).await {
                sent += 1;
            }
        }
        sent
    }

    /// Close every connection with the given code.
    pub async fn close_all(&self, code: u16, reason: &str) {
        let connections = self.connections.read().await;
        for conn in connections.values() {
            let _ = conn.try_send(OutgoingMessage::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}
