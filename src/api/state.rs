//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::telemetry::{Aggregator, DeviceStateStore, TopicClassifier, ZoneEngine};
use crate::websocket::ConnectionHub;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// WebSocket connection hub for live viewers
    pub hub: Arc<ConnectionHub>,
    /// Latest device properties and occupancy, written by the pipeline
    pub store: Arc<RwLock<DeviceStateStore>>,
    /// Room and grid definitions
    pub zones: Arc<ZoneEngine>,
    /// Rolling averages
    pub aggregator: Arc<Aggregator>,
    /// Used to classify devices that have not reported yet
    pub classifier: Arc<TopicClassifier>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        hub: Arc<ConnectionHub>,
        store: Arc<RwLock<DeviceStateStore>>,
        zones: Arc<ZoneEngine>,
        aggregator: Arc<Aggregator>,
        classifier: Arc<TopicClassifier>,
    ) -> Self {
        Self {
            hub,
            store,
            zones,
            aggregator,
            classifier,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get WebSocket connection count
    pub async fn connection_count(&self) -> usize {
        self.hub.connection_count().await
    }
}
