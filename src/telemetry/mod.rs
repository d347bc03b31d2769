//! Telemetry processing core
//!
//! Everything between a raw transport message and a viewer event:
//!
//! - **topic**: topic parsing, allow-list and device classification
//! - **state**: last-known properties per device and the occupancy vector
//! - **zones**: room and 3×3 grid activation from occupancy
//! - **aggregation**: per-metric averaging into bounded series
//! - **pipeline**: the single-consumer ingestion loop tying them together
//!
//! None of these modules know about MQTT or WebSockets; the transport feeds
//! [`RawMessage`]s in and the hub takes [`crate::websocket::ServerMessage`]s out.

pub mod aggregation;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod topic;
pub mod types;
pub mod zones;

pub use aggregation::{
    metric_key, AggregationBuffer, AggregationConfig, Aggregator, MetricSeries, SeriesPoint,
    SeriesSummary,
};
pub use error::RejectReason;
pub use pipeline::{default_occupancy_properties, occupancy_state, Pipeline};
pub use state::{DeviceRecord, DeviceStateStore};
pub use topic::{
    decode_payload, default_rules, ClassificationRule, ClassifiedMessage, DeviceClassifier,
    DevicePattern, TopicClassifier, TopicLayout, TopicParts,
};
pub use types::{Device, DeviceCategory, OccupancyVector, PropertyMap, PropertyValue, RawMessage};
pub use zones::{CornerReadings, GridLayout, GridZone, RoomDefinition, ZoneActivation, ZoneEngine};
