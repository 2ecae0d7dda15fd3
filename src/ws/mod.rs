//! WebSocket endpoint for hub connections.

pub mod connection;
pub mod protocol;
pub mod room;

use crate::hub::Hub;
use axum::extract::ws::{CloseFrame, Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use connection::{OutgoingMessage, WsConnection};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound queue depth per connection.
const OUTBOUND_BUFFER: usize = 256;

pub async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutgoingMessage>(OUTBOUND_BUFFER);
    let conn = Arc::new(WsConnection::new(tx));
    hub.room().add_connection(conn.clone()).await;
    tracing::info!("[hub] Client connected.");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                OutgoingMessage::Text(text) => {
                    if sink.send(WsFrame::Text(text)).await.is_err() {
                        break;
                    }
                }
                OutgoingMessage::Close { code, reason } => {
                    let _ = sink
                        .send(WsFrame::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsFrame::Text(text)) => hub.handle_text(&conn, &text).await,
            Ok(WsFrame::Binary(_)) => {
                tracing::warn!("[hub] Invalid message: {}", protocol::ProtocolError::Binary);
            }
            Ok(WsFrame::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("[hub] Socket error: {}", e);
                break;
            }
        }
    }

    hub.room().remove_connection(&conn.id).await;
    drop(conn);
    let _ = writer.await;
    tracing::info!("[hub] Client disconnected.");
}
