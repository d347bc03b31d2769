//! # Sensorcast
//!
//! Home telemetry relay: subscribes to a broker carrying sensor and appliance
//! telemetry, fuses it into per-device state, derives occupancy zones and
//! rolling averages, and pushes every accepted update to live WebSocket
//! viewers.
//!
//! ## Features
//!
//! - **Classification**: topic parsing, allow-list and rule-based device categories
//! - **State fusion**: latest value per device property, shallow-merged bundles
//! - **Zones**: room activation plus a 3×3 grid from four corner sensors
//! - **Aggregation**: per-metric averages on a fixed period, bounded history
//! - **Real-time**: WebSocket fan-out with per-viewer ordering
//! - **Analytics**: optional Elasticsearch indexing of the raw stream
//!
//! ## Modules
//!
//! - [`telemetry`]: Classifier, state store, zones, aggregation and pipeline
//! - [`transport`]: MQTT ingress with reconnect backoff
//! - [`websocket`]: Viewer hub and socket handler
//! - [`api`]: HTTP server with Axum
//! - [`sink`]: Analytics sink
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensorcast::telemetry::*;
//! use sensorcast::websocket::ConnectionHub;
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, RwLock};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = sensorcast::Config::default();
//!     let hub = Arc::new(ConnectionHub::default());
//!
//!     let pipeline = Pipeline::new(
//!         config.topic_classifier(),
//!         Arc::new(RwLock::new(DeviceStateStore::new())),
//!         Arc::new(config.zone_engine()),
//!         Arc::new(Aggregator::new(config.aggregation_config())),
//!         config.devices.occupancy_properties.clone(),
//!     );
//!
//!     let (tx, rx) = mpsc::channel(16);
//!     let runner = tokio::spawn(pipeline.run(rx, hub));
//!
//!     tx.send(RawMessage::new(
//!         "/server/home/PIR1/properties/motion",
//!         r#"{"motion": true}"#,
//!     ))
//!     .await
//!     .unwrap();
//!
//!     drop(tx);
//!     runner.await.unwrap();
//! }
//! ```

pub mod api;
pub mod config;
pub mod sink;
pub mod telemetry;
pub mod transport;
pub mod websocket;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError};

pub use telemetry::{
    Aggregator, Device, DeviceCategory, DeviceStateStore, GridZone, OccupancyVector, Pipeline,
    RawMessage, RejectReason, TopicClassifier, ZoneActivation, ZoneEngine,
};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use transport::{MqttIngress, TransportConfig, TransportError};

pub use sink::{DocumentBuilder, ElasticsearchSink, EventSink, SinkDocument, SinkError};

pub use websocket::{ConnectionHub, HubConfig, HubError, ServerMessage};
