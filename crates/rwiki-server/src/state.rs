//! Application state.

use rwiki_site::Engine;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Site engine answering render and refresh requests.
    pub(crate) engine: Engine,
    /// Application version, mixed into page `ETag`s.
    pub(crate) version: String,
}
