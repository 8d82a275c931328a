//! Navigation API endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::state::AppState;

/// Handle GET /api/toc.
pub(crate) async fn get_toc(State(state): State<Arc<AppState>>) -> Result<Response, ServerError> {
    let toc = state.engine.toc().await.ok_or(ServerError::NotReady)?;
    Ok(Json(toc.as_ref()).into_response())
}
