//! Device State Store
//!
//! Latest value per `(device, property)` plus the occupancy vector. Only the
//! ingestion loop writes to it; everything else reads snapshots.
//!
//! There is no TTL and no eviction. The device population is the configured
//! allow-list, so the map stays small for the process lifetime.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use super::types::{Device, OccupancyVector, PropertyMap};

/// Stored state for one device
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device: Device,
    pub properties: PropertyMap,
    /// Unix timestamp in milliseconds of the last write
    pub updated_at: i64,
}

impl DeviceRecord {
    fn new(device: Device, at: i64) -> Self {
        Self {
            device,
            properties: PropertyMap::new(),
            updated_at: at,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceStateStore {
    devices: HashMap<String, DeviceRecord>,
    occupancy: OccupancyVector,
}

impl DeviceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for a device, created on first sight. The identity recorded the
    /// first time wins.
    fn record_mut(&mut self, device: &Device, at: i64) -> &mut DeviceRecord {
        let record = self
            .devices
            .entry(device.id.clone())
            .or_insert_with(|| DeviceRecord::new(device.clone(), at));
        record.updated_at = at;
        record
    }

    /// Overwrite one property unconditionally
    pub fn upsert(&mut self, device: &Device, property: &str, value: Value, at: i64) {
        self.record_mut(device, at)
            .properties
            .insert(property.to_string(), value);
    }

    /// Shallow-merge a bundle of fields into the device's property map
    ///
    /// Fields present in the bundle overwrite; all other keys keep their value.
    pub fn merge(&mut self, device: &Device, bundle: &PropertyMap, at: i64) {
        let properties = &mut self.record_mut(device, at).properties;
        for (key, value) in bundle {
            properties.insert(key.clone(), value.clone());
        }
    }

    /// Apply a resolved value: objects are merged, scalars are upserted
    pub fn apply(&mut self, device: &Device, property: &str, value: &Value, at: i64) {
        match value {
            Value::Object(bundle) => self.merge(device, bundle, at),
            scalar => self.upsert(device, property, scalar.clone(), at),
        }
    }

    /// Snapshot of a device's properties; unknown devices give an empty map
    pub fn get(&self, device_id: &str) -> PropertyMap {
        self.devices
            .get(device_id)
            .map(|r| r.properties.clone())
            .unwrap_or_default()
    }

    pub fn record(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    /// All known devices, sorted by id
    pub fn records(&self) -> Vec<&DeviceRecord> {
        let mut records: Vec<_> = self.devices.values().collect();
        records.sort_by(|a, b| a.device.id.cmp(&b.device.id));
        records
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Record an occupancy sensor's latest state
    pub fn set_occupancy(&mut self, sensor_id: &str, occupied: bool) {
        self.occupancy.set(sensor_id, occupied);
    }

    pub fn occupancy(&self) -> &OccupancyVector {
        &self.occupancy
    }
}
