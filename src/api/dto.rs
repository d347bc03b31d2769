//! Data Transfer Objects
//!
//! Response types for the query endpoints.
//! These types are serialized to JSON.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::telemetry::{
    DeviceCategory, GridLayout, PropertyMap, RoomDefinition, SeriesPoint, SeriesSummary,
    ZoneActivation,
};

// ============================================
// SERIES DTOs
// ============================================

/// Every metric that has at least one aggregated point
#[derive(Debug, Serialize)]
pub struct SeriesListResponse {
    pub total: usize,
    pub series: Vec<SeriesSummary>,
}

/// Points of one metric, oldest first
#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub metric: String,
    pub capacity: usize,
    pub points: Vec<SeriesPoint>,
}

// ============================================
// DEVICE DTOs
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub device_id: String,
    pub category: DeviceCategory,
    pub family: String,
    pub property_count: usize,
    pub updated_at: i64,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub total: usize,
    pub devices: Vec<DeviceSummary>,
}

/// Current properties of one device
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub device_id: String,
    pub category: DeviceCategory,
    pub family: String,
    /// Empty when the device has not reported
    pub properties: PropertyMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

// ============================================
// ZONE DTOs
// ============================================

/// Zone activation derived from the current occupancy vector
#[derive(Debug, Serialize)]
pub struct ZonesResponse {
    pub active: ZoneActivation,
    pub occupancy: BTreeMap<String, bool>,
    pub rooms: Vec<RoomDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridLayout>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub devices: usize,
    pub version: String,
}
