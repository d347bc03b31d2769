//! Device Routes
//!
//! - GET /api/v1/devices - Devices that have reported
//! - GET /api/v1/devices/:device_id - Current properties of one device

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{DeviceListResponse, DeviceResponse, DeviceSummary};
use crate::api::state::AppState;

/// GET /api/v1/devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<DeviceListResponse> {
    let store = state.store.read().await;

    let devices: Vec<DeviceSummary> = store
        .records()
        .into_iter()
        .map(|record| DeviceSummary {
            device_id: record.device.id.clone(),
            category: record.device.category,
            family: record.device.family.clone(),
            property_count: record.properties.len(),
            updated_at: record.updated_at,
        })
        .collect();

    Json(DeviceListResponse {
        total: devices.len(),
        devices,
    })
}

/// GET /api/v1/devices/:device_id
///
/// A device that never reported is not an error; it has no properties yet.
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Json<DeviceResponse> {
    let store = state.store.read().await;

    let response = match store.record(&device_id) {
        Some(record) => DeviceResponse {
            device_id: record.device.id.clone(),
            category: record.device.category,
            family: record.device.family.clone(),
            properties: record.properties.clone(),
            updated_at: Some(record.updated_at),
        },
        None => {
            let device = state.classifier.device(&device_id);
            DeviceResponse {
                device_id: device.id,
                category: device.category,
                family: device.family,
                properties: store.get(&device_id),
                updated_at: None,
            }
        }
    };

    Json(response)
}
