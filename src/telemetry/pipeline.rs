//! Ingestion pipeline
//!
//! Drains the transport queue one message at a time and turns each accepted
//! message into exactly one viewer event:
//!
//! ```text
//! RawMessage → classify → fuse into store → zones | aggregation → envelope → hub
//! ```
//!
//! A single task owns this path, so store writes are applied in arrival order
//! and zone inference always sees a consistent occupancy vector.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use super::aggregation::{metric_key, Aggregator};
use super::error::RejectReason;
use super::state::DeviceStateStore;
use super::topic::{ClassifiedMessage, TopicClassifier};
use super::types::{DeviceCategory, RawMessage};
use super::zones::ZoneEngine;
use crate::websocket::{ConnectionHub, ServerMessage};

/// Properties an occupancy sensor reports its state under
pub fn default_occupancy_properties() -> Vec<String> {
    vec!["motion".to_string(), "motion_raw".to_string()]
}

/// The classify → fuse → derive stages
pub struct Pipeline {
    classifier: TopicClassifier,
    store: Arc<RwLock<DeviceStateStore>>,
    zones: Arc<ZoneEngine>,
    aggregator: Arc<Aggregator>,
    occupancy_properties: HashSet<String>,
}

impl Pipeline {
    pub fn new(
        classifier: TopicClassifier,
        store: Arc<RwLock<DeviceStateStore>>,
        zones: Arc<ZoneEngine>,
        aggregator: Arc<Aggregator>,
        occupancy_properties: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            classifier,
            store,
            zones,
            aggregator,
            occupancy_properties: occupancy_properties.into_iter().collect(),
        }
    }

    /// Process one message, returning the event to broadcast
    pub async fn process(&self, msg: &RawMessage) -> Result<ServerMessage, RejectReason> {
        let classified = self.classifier.classify(msg)?;

        match classified.device.category {
            DeviceCategory::OccupancySensor => self.on_occupancy(classified).await,
            DeviceCategory::EnvironmentSensor => self.on_environment(classified).await,
            DeviceCategory::Appliance => self.on_appliance(classified).await,
            DeviceCategory::Unknown => Err(RejectReason::UnknownCategory(classified.device.id)),
        }
    }

    async fn on_occupancy(&self, msg: ClassifiedMessage) -> Result<ServerMessage, RejectReason> {
        if !self.occupancy_properties.contains(&msg.property) {
            return Err(RejectReason::IgnoredProperty {
                device_id: msg.device.id,
                property: msg.property,
            });
        }

        let raw = msg.payload.get(&msg.property).cloned();
        let state = match raw.as_ref().and_then(occupancy_state) {
            Some(state) => state,
            None => {
                return Err(RejectReason::MissingValue {
                    device_id: msg.device.id,
                    property: msg.property,
                })
            }
        };

        let zones = {
            let mut store = self.store.write().await;
            if let Some(raw) = raw {
                store.upsert(&msg.device, &msg.property, raw, msg.received_at);
            }
            store.set_occupancy(&msg.device.id, state);
            self.zones.infer(store.occupancy())
        };

        Ok(ServerMessage::Occupancy {
            device_id: msg.device.id,
            state,
            zones,
            timestamp: msg.received_at,
        })
    }

    async fn on_environment(&self, msg: ClassifiedMessage) -> Result<ServerMessage, RejectReason> {
        let reading = match msg.property_value() {
            Some(reading) if !reading.value.is_null() => reading,
            _ => {
                return Err(RejectReason::MissingValue {
                    device_id: msg.device.id,
                    property: msg.property,
                })
            }
        };

        self.store.write().await.upsert(
            &msg.device,
            &reading.property_name,
            reading.value.clone(),
            reading.received_at,
        );

        if let Some(sample) = reading.value.as_f64().filter(|v| v.is_finite()) {
            self.aggregator
                .record(&metric_key(&reading.device_id, &reading.property_name), sample)
                .await;
        }

        Ok(ServerMessage::EnvironmentReading {
            device_id: reading.device_id,
            property: reading.property_name,
            value: reading.value,
            timestamp: reading.received_at,
        })
    }

    async fn on_appliance(&self, msg: ClassifiedMessage) -> Result<ServerMessage, RejectReason> {
        let value = resolve_appliance_value(&msg);

        self.store
            .write()
            .await
            .apply(&msg.device, &msg.property, &value, msg.received_at);

        Ok(ServerMessage::ApplianceState {
            device_id: msg.device.id,
            property: msg.property,
            value,
            timestamp: msg.received_at,
        })
    }

    /// Drain the queue until the transport side closes it
    pub async fn run(self, mut rx: mpsc::Receiver<RawMessage>, hub: Arc<ConnectionHub>) {
        tracing::info!("Ingestion pipeline started");

        let mut accepted: u64 = 0;
        let mut rejected: u64 = 0;

        while let Some(msg) = rx.recv().await {
            match self.process(&msg).await {
                Ok(event) => {
                    accepted += 1;
                    let viewers = hub.publish(&event).await;
                    tracing::debug!(
                        kind = event.kind(),
                        device_id = event.device_id().unwrap_or_default(),
                        viewers,
                        "Relayed event"
                    );
                }
                Err(reason) => {
                    rejected += 1;
                    tracing::trace!(
                        topic = %msg.topic,
                        reason = reason.kind(),
                        detail = %reason,
                        "Discarded message"
                    );
                }
            }
        }

        tracing::info!(accepted, rejected, "Ingestion pipeline stopped");
    }
}

/// Named field if the bundle has it, otherwise the whole bundle
fn resolve_appliance_value(msg: &ClassifiedMessage) -> Value {
    match msg.property_value() {
        Some(field) => field.value,
        None => Value::Object(msg.payload.clone()),
    }
}

/// Interpret a reported value as occupied / unoccupied
///
/// Booleans as-is, non-zero numbers as occupied, and the strings `1`, `true`
/// and `on` (any case) as occupied. Null and composite values are unusable.
pub fn occupancy_state(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            Some(matches!(s.as_str(), "1" | "true" | "on"))
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
