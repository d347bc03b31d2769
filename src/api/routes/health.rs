//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
///
/// Process status with viewer and device counts. The broker connection is
/// retried in the background, so it does not affect the status.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let devices = state.store.read().await.device_count();

    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.uptime_seconds(),
        connections: state.connection_count().await,
        devices,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
