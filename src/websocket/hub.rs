//! WebSocket Connection Hub
//!
//! Holds the set of live viewer connections and fans every published event
//! out to all of them. Each connection is an unbounded channel drained by
//! that socket's writer task, so publishing never waits on a slow viewer.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::ServerMessage;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// A serialized envelope, shared by every connection it is sent to
pub type Frame = Arc<str>;

/// Manages all WebSocket connections
pub struct ConnectionHub {
    /// Active connections: ConnectionId → frame sender
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Frame>>>,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached.
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<Frame>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(id.clone(), sender);

        tracing::info!(connection_id = %id, "WebSocket connected");
        Ok(id)
    }

    /// Unregister a connection
    pub async fn unregister(&self, id: &str) {
        if self.connections.write().await.remove(id).is_some() {
            tracing::info!(connection_id = %id, "WebSocket disconnected");
        }
    }

    /// Serialize an event once and send it to every open connection
    ///
    /// Connections whose channel is closed are skipped and pruned afterwards;
    /// they never stop delivery to the rest. Returns how many connections the
    /// event was handed to.
    pub async fn publish(&self, message: &ServerMessage) -> usize {
        let frame: Frame = match serde_json::to_string(message) {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(error = %e, kind = message.kind(), "Failed to serialize event");
                return 0;
            }
        };

        // Snapshot, then send without holding the lock
        let targets: Vec<(ConnectionId, mpsc::UnboundedSender<Frame>)> = self
            .connections
            .read()
            .await
            .iter()
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.send(Arc::clone(&frame)).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for id in &dead {
                // Only drop it if it is still the same closed channel
                if connections.get(id).is_some_and(|tx| tx.is_closed()) {
                    connections.remove(id);
                    tracing::debug!(connection_id = %id, "Pruned closed connection");
                }
            }
        }

        tracing::trace!(kind = message.kind(), viewers = delivered, "Broadcast event");
        delivered
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: &ServerMessage) -> Result<(), HubError> {
        let text = serde_json::to_string(message)
            .map_err(|e| HubError::Serialization(e.to_string()))?;

        let connections = self.connections.read().await;
        let sender = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        sender.send(text.into()).map_err(|_| HubError::SendFailed)
    }

    /// Drop every connection; their writer tasks end once the channels drain
    pub async fn close_all(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        tracing::info!(connections = count, "Closed all WebSocket connections");
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,

    #[error("Failed to serialize message: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::ZoneActivation;

    fn occupancy_event(device_id: &str) -> ServerMessage {
        ServerMessage::Occupancy {
            device_id: device_id.to_string(),
            state: true,
            zones: ZoneActivation::default(),
            timestamp: 1699000000000,
        }
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.max_connections, 1000);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = ConnectionHub::default();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = hub.register(tx).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let hub = ConnectionHub::new(HubConfig { max_connections: 2 });

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (tx3, _rx3) = mpsc::unbounded_channel();

        hub.register(tx1).await.unwrap();
        hub.register(tx2).await.unwrap();
        let result = hub.register(tx3).await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_publish_reaches_every_connection() {
        let hub = ConnectionHub::default();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register(tx1).await.unwrap();
        hub.register(tx2).await.unwrap();

        let delivered = hub.publish(&occupancy_event("PIR1")).await;
        assert_eq!(delivered, 2);

        let frame1 = rx1.try_recv().unwrap();
        let frame2 = rx2.try_recv().unwrap();
        assert_eq!(frame1, frame2);
        assert!(frame1.contains("\"deviceId\":\"PIR1\""));
    }

    #[tokio::test]
    async fn test_failed_connection_does_not_block_others() {
        let hub = ConnectionHub::default();

        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        hub.register(dead_tx).await.unwrap();
        hub.register(live_tx).await.unwrap();

        // Peer went away
        drop(dead_rx);

        let delivered = hub.publish(&occupancy_event("PIR2")).await;
        assert_eq!(delivered, 1);
        assert!(live_rx.try_recv().is_ok());

        // The dead connection was pruned
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_publish_preserves_order_per_connection() {
        let hub = ConnectionHub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(tx).await.unwrap();

        for id in ["PIR1", "PIR2", "PIR3"] {
            hub.publish(&occupancy_event(id)).await;
        }

        for id in ["PIR1", "PIR2", "PIR3"] {
            let frame = rx.try_recv().unwrap();
            assert!(frame.contains(&format!("\"deviceId\":\"{}\"", id)));
        }
    }

    #[tokio::test]
    async fn test_publish_with_no_connections() {
        let hub = ConnectionHub::default();
        assert_eq!(hub.publish(&occupancy_event("PIR1")).await, 0);
    }

    #[tokio::test]
    async fn test_unregistered_connection_misses_later_events() {
        let hub = ConnectionHub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        hub.unregister(&id).await;
        hub.publish(&occupancy_event("PIR1")).await;

        // Sender was dropped by the hub, so the channel is closed and empty
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to() {
        let hub = ConnectionHub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register(tx).await.unwrap();

        hub.send_to(&id, &ServerMessage::Pong).await.unwrap();
        assert_eq!(&*rx.try_recv().unwrap(), r#"{"type":"pong"}"#);

        let result = hub.send_to("missing", &ServerMessage::Pong).await;
        assert!(matches!(result, Err(HubError::ConnectionNotFound)));
    }

    #[tokio::test]
    async fn test_close_all() {
        let hub = ConnectionHub::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(tx).await.unwrap();

        hub.close_all().await;
        assert_eq!(hub.connection_count().await, 0);
        assert!(rx.recv().await.is_none());
    }
}
