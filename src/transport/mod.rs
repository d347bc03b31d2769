//! Broker transport
//!
//! Owns the MQTT connection and turns every inbound publish into a
//! [`RawMessage`](crate::telemetry::RawMessage) on one or more bounded queues.
//! Nothing here looks inside topics or payloads.

mod backoff;
mod mqtt;

pub use backoff::Backoff;
pub use mqtt::MqttIngress;

use std::time::Duration;
use thiserror::Error;

/// Connection settings for the ingress client
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Topic filters, (re)subscribed on every connection
    pub subscriptions: Vec<String>,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "sensorcast".to_string(),
            keep_alive: Duration::from_secs(30),
            subscriptions: vec!["/server/#".to_string()],
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("Subscribe failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    #[error("Pipeline queue closed")]
    QueueClosed,
}
