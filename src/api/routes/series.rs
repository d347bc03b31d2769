//! Series Routes
//!
//! Read access to the aggregated series. Series are only ever pulled; the
//! live stream carries instantaneous values.
//!
//! - GET /api/v1/series - List all series
//! - GET /api/v1/series/:device_id/:property - Points of one series

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{SeriesListResponse, SeriesResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::telemetry::metric_key;

/// GET /api/v1/series
pub async fn list_series(State(state): State<Arc<AppState>>) -> Json<SeriesListResponse> {
    let series = state.aggregator.summaries().await;

    Json(SeriesListResponse {
        total: series.len(),
        series,
    })
}

/// GET /api/v1/series/:device_id/:property
///
/// 404 until the first tick that saw a sample for this property.
pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Path((device_id, property)): Path<(String, String)>,
) -> ApiResult<Json<SeriesResponse>> {
    let metric = metric_key(&device_id, &property);

    let points = state
        .aggregator
        .series(&metric)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No series for {}", metric)))?;

    Ok(Json(SeriesResponse {
        capacity: state.aggregator.config().capacity,
        metric,
        points,
    }))
}
