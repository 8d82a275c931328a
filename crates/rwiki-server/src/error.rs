//! Error types for the HTTP server.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use rwiki_site::{RefreshError, RenderError};
use serde_json::json;

/// Seconds clients are asked to wait while no site is loaded.
const RETRY_AFTER_SECS: &str = "5";

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Nothing is served at the given path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request path is not valid UTF-8 after percent-decoding.
    #[error("Invalid request path: {0}")]
    BadPath(String),

    /// Only GET and HEAD are served outside the API.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// No site snapshot has been loaded yet.
    #[error("Site not loaded yet")]
    NotReady,

    /// Refresh failed or was rejected.
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Page render failed.
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// I/O error while reading a resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadPath(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NotReady
            | Self::Render(RenderError::Stopped)
            | Self::Refresh(RefreshError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Refresh(RefreshError::InProgress { .. }) => StatusCode::CONFLICT,
            Self::Refresh(_) => StatusCode::BAD_GATEWAY,
            Self::Render(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = match &self {
            Self::NotFound(path) => json!({"error": "Not found", "path": path}),
            Self::Refresh(RefreshError::InProgress { generation }) => {
                json!({"error": self.to_string(), "generation": generation})
            }
            _ => json!({"error": self.to_string()}),
        };

        if matches!(self, Self::NotReady) {
            return (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
                axum::Json(body),
            )
                .into_response();
        }
        (status, axum::Json(body)).into_response()
    }
}
