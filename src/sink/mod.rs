//! Analytics sink
//!
//! Indexes every raw message as one document for offline analysis. The sink
//! reads its own copy of the transport stream, so it sees messages the
//! pipeline drops (devices outside the allow-list, undecodable payloads) and
//! never holds the pipeline up.

mod elasticsearch;

pub use elasticsearch::{ElasticsearchConfig, ElasticsearchSink};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::telemetry::{DeviceCategory, DeviceClassifier, RawMessage, TopicLayout};

/// How often progress is logged, in documents
const LOG_EVERY: u64 = 50;

/// Destination for sink documents
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn index(&self, doc: &SinkDocument) -> Result<(), SinkError>;
}

/// One indexed message
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SinkDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    pub tenant: String,
    pub device_id: String,
    pub device_type: String,
    pub property: String,
    /// Decoded payload, or `{"_raw": ...}` when it is not JSON
    pub payload: Value,
    pub extracted_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_key: Option<String>,
}

/// Turns raw messages into sink documents
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    layout: TopicLayout,
    devices: DeviceClassifier,
    persist_unknown: bool,
}

impl DocumentBuilder {
    pub fn new(layout: TopicLayout, devices: DeviceClassifier, persist_unknown: bool) -> Self {
        Self {
            layout,
            devices,
            persist_unknown,
        }
    }

    /// `None` for malformed topics and, unless configured otherwise, devices
    /// no rule recognizes
    pub fn build(&self, msg: &RawMessage) -> Option<SinkDocument> {
        let parts = self.layout.parse(&msg.topic).ok()?;
        let device = self.devices.classify(parts.device_id);
        if device.category == DeviceCategory::Unknown && !self.persist_unknown {
            return None;
        }

        let payload = match serde_json::from_slice::<Value>(&msg.payload) {
            Ok(value) => value,
            Err(_) => json!({ "_raw": String::from_utf8_lossy(&msg.payload) }),
        };
        let (value_key, extracted_value) = extract_value(&payload);

        Some(SinkDocument {
            timestamp: Utc
                .timestamp_millis_opt(msg.received_at)
                .single()
                .unwrap_or_else(Utc::now),
            topic: msg.topic.clone(),
            tenant: parts.tenant.to_string(),
            device_id: device.id,
            device_type: device.family,
            property: parts.property.to_string(),
            payload,
            extracted_value,
            value_key,
        })
    }
}

/// Pull a representative scalar out of a payload
///
/// A single-field object with a scalar value yields that field; a wrapped
/// raw payload yields the raw text. Anything else yields null.
fn extract_value(payload: &Value) -> (Option<String>, Value) {
    let Some(map) = payload.as_object() else {
        return (None, Value::Null);
    };

    if map.len() == 1 {
        if let Some((key, value)) = map.iter().next() {
            if !value.is_object() && !value.is_array() {
                return (Some(key.clone()), value.clone());
            }
        }
    }

    match map.get("_raw") {
        Some(raw) => (Some("_raw".to_string()), raw.clone()),
        None => (None, Value::Null),
    }
}

/// Drain the sink queue until the transport closes it
///
/// Failures are logged and the document is dropped; nothing is retried.
pub async fn run_sink<S: EventSink>(
    mut rx: mpsc::Receiver<RawMessage>,
    sink: S,
    builder: DocumentBuilder,
) {
    tracing::info!("Analytics sink started");

    let mut indexed: u64 = 0;
    while let Some(msg) = rx.recv().await {
        let Some(doc) = builder.build(&msg) else {
            tracing::trace!(topic = %msg.topic, "Sink skipped message");
            continue;
        };

        match sink.index(&doc).await {
            Ok(()) => {
                indexed += 1;
                if indexed % LOG_EVERY == 0 {
                    tracing::info!(
                        indexed,
                        device_type = %doc.device_type,
                        device_id = %doc.device_id,
                        property = %doc.property,
                        "Sink progress"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, device_id = %doc.device_id, "Failed to index document");
            }
        }
    }

    tracing::info!(indexed, "Analytics sink stopped");
}

/// Sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Sink rejected document ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Sink unavailable")]
    Unavailable,
}
