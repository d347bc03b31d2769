//! Zone Routes
//!
//! - GET /api/v1/zones - Current room and grid activation

use axum::{extract::State, Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::api::dto::ZonesResponse;
use crate::api::state::AppState;

/// GET /api/v1/zones
///
/// Inferred from the occupancy vector at request time, the same way the
/// pipeline does after each occupancy update.
pub async fn current_zones(State(state): State<Arc<AppState>>) -> Json<ZonesResponse> {
    let store = state.store.read().await;
    let occupancy = store.occupancy();

    Json(ZonesResponse {
        active: state.zones.infer(occupancy),
        occupancy: occupancy
            .iter()
            .map(|(id, occupied)| (id.to_string(), occupied))
            .collect::<BTreeMap<_, _>>(),
        rooms: state.zones.rooms().to_vec(),
        grid: state.zones.grid().cloned(),
    })
}
