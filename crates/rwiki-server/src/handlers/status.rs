//! Engine status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use rwiki_site::EngineStatus;

use crate::state::AppState;

/// Handle GET /api/status.
pub(crate) async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine.status().await)
}
