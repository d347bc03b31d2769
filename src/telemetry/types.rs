//! Core data types for the telemetry pipeline
//!
//! This module defines the values that flow between pipeline stages:
//! - `RawMessage`: One message as it came off the transport
//! - `Device` and `DeviceCategory`: Identity and classification of a source
//! - `PropertyValue`: One classified property sample
//! - `OccupancyVector`: Last-known state of every occupancy sensor

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Property name → last-known value for one device
pub type PropertyMap = Map<String, Value>;

/// A message received from the transport, before classification
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Full topic string (e.g. `/server/<tenant>/PIR1/properties/motion`)
    pub topic: String,
    /// Undecoded payload bytes
    pub payload: Bytes,
    /// Unix timestamp in milliseconds at which the message was received
    pub received_at: i64,
}

impl RawMessage {
    /// Create a message stamped with the current time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now().timestamp_millis(),
        }
    }

    /// Create a message with a specific receive timestamp
    pub fn with_timestamp(
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
        received_at: i64,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at,
        }
    }
}

/// Coarse device classification derived from the device id
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceCategory {
    /// Binary presence detector (PIR)
    OccupancySensor,
    /// Air quality / climate sensor (CO2, temperature, humidity...)
    EnvironmentSensor,
    /// Appliance reporting its own state (air purifier, air conditioner)
    Appliance,
    /// Nothing matched; dropped by the live pipeline
    Unknown,
}

impl DeviceCategory {
    /// Get all categories for iteration
    pub fn all() -> &'static [DeviceCategory] {
        &[
            DeviceCategory::OccupancySensor,
            DeviceCategory::EnvironmentSensor,
            DeviceCategory::Appliance,
            DeviceCategory::Unknown,
        ]
    }
}

impl std::fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceCategory::OccupancySensor => write!(f, "occupancy-sensor"),
            DeviceCategory::EnvironmentSensor => write!(f, "environment-sensor"),
            DeviceCategory::Appliance => write!(f, "appliance"),
            DeviceCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// A telemetry source
///
/// The category and family are derived once from the id and never change.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub category: DeviceCategory,
    /// Finer-grained family label (e.g. "pir", "air_purifier")
    pub family: String,
}

impl Device {
    pub fn new(id: impl Into<String>, category: DeviceCategory, family: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            family: family.into(),
        }
    }
}

/// One classified property sample
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    pub device_id: String,
    pub property_name: String,
    pub value: Value,
    /// Unix timestamp in milliseconds
    pub received_at: i64,
}

/// Last-known boolean state of every occupancy sensor that has reported
///
/// Entries only change when a new sample for that sensor arrives; there is
/// no decay. A sensor that never reported reads as unoccupied.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct OccupancyVector {
    states: HashMap<String, bool>,
}

impl OccupancyVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest state for a sensor
    pub fn set(&mut self, sensor_id: impl Into<String>, occupied: bool) {
        self.states.insert(sensor_id.into(), occupied);
    }

    /// Builder method: set a sensor state
    pub fn with(mut self, sensor_id: impl Into<String>, occupied: bool) -> Self {
        self.set(sensor_id, occupied);
        self
    }

    /// State of a sensor; unreported sensors are `false`
    pub fn is_occupied(&self, sensor_id: &str) -> bool {
        self.states.get(sensor_id).copied().unwrap_or(false)
    }

    /// Whether the sensor has ever reported
    pub fn contains(&self, sensor_id: &str) -> bool {
        self.states.contains_key(sensor_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.states.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
