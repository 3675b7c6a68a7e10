use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use ocs_core::types::{ConnId, Timestamp};
use ocs_core::Envelope;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Registry of every open client connection.
///
/// Membership is the sole authority for who receives broadcasts.
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<ConnId, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink. Registering an existing ID
    /// replaces the previous connection.
    pub async fn register(&self, conn_id: ConnId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID. Unknown IDs are a no-op.
    ///
    /// Dropping the sender ends the connection's outbound stream; sends that
    /// race with removal fail silently.
    pub async fn unregister(&self, conn_id: &str) {
        if let Some(conn) = self.connections.write().await.remove(conn_id) {
            let lifetime = chrono::Utc::now() - conn.connected_at;
            tracing::debug!(
                conn_id = %conn_id,
                lifetime_ms = lifetime.num_milliseconds(),
                "Connection unregistered",
            );
        }
    }

    /// Send an envelope to a single connection.
    ///
    /// Returns `false` if the connection is unknown or its channel is closed.
    pub async fn send_to(&self, conn_id: &str, envelope: &Envelope) -> bool {
        let conns = self.connections.read().await;
        match conns.get(conn_id) {
            Some(conn) => conn
                .sender
                .send(Message::Text(envelope.to_json().into()))
                .is_ok(),
            None => false,
        }
    }

    /// Broadcast an envelope to every connected client.
    ///
    /// Connections whose send channels are closed are skipped (they are
    /// cleaned up when their receive loop ends). Returns the number of
    /// connections the envelope was handed to.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let text = envelope.to_json();
        let conns = self.connections.read().await;
        let mut delivered = 0;
        for conn in conns.values() {
            if conn.sender.send(Message::Text(text.clone().into())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Return the current number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
