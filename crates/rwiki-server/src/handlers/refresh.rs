//! Manual refresh endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::error::ServerError;
use crate::state::AppState;

/// Response for POST /api/refresh.
#[derive(Serialize)]
pub(crate) struct RefreshResponse {
    /// Generation of the snapshot now being served.
    generation: u64,
}

/// Handle POST /api/refresh.
///
/// Waits for the pipeline to finish.
pub(crate) async fn post_refresh(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ServerError> {
    let generation = state.engine.refresh().await?;
    tracing::info!(generation, "Refreshed on request");
    Ok(Json(RefreshResponse { generation }))
}
