//! HTTP server for rwiki documentation sites.
//!
//! Serves one [`Engine`] over axum:
//!
//! - `GET /*`: rendered pages and source files of the current snapshot
//! - `GET /api/toc`: navigation tree as JSON
//! - `GET /api/status`: engine state
//! - `POST /api/refresh`: fetch the archive again and swap snapshots
//!
//! # Quick Start
//!
//! ```ignore
//! use rwiki_server::{ServerConfig, run_server};
//! use rwiki_site::EngineConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         engine: EngineConfig::new("https://git.example.com/wiki/archive/main.zip"),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```

mod app;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rwiki_config::{Config, ConfigError};
use rwiki_site::{Engine, EngineConfig, RenderCacheConfig};
use state::AppState;

pub use error::ServerError;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Engine settings.
    pub engine: EngineConfig,
    /// Refresh once before accepting requests completes.
    pub refresh_on_startup: bool,
    /// Periodic refresh interval (`None` disables).
    pub refresh_interval: Option<Duration>,
    /// Application version, mixed into page `ETag`s.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
            engine: EngineConfig::default(),
            refresh_on_startup: true,
            refresh_interval: None,
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl ServerConfig {
    /// Create server configuration from rwiki config.
    ///
    /// Fails when no archive source is configured.
    pub fn from_config(config: &Config, version: String) -> Result<Self, ConfigError> {
        let source = config.require_source()?;
        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            engine: engine_config(config, source),
            refresh_on_startup: config.refresh.on_startup,
            refresh_interval: config.refresh.interval(),
            version,
        })
    }
}

/// Build engine settings from rwiki config for the given source.
#[must_use]
pub fn engine_config(config: &Config, source: &str) -> EngineConfig {
    EngineConfig {
        source: source.to_owned(),
        strip_root: config.source.strip_root,
        home_page: config.source.home_page.clone(),
        title: config.source.title.clone(),
        cache: RenderCacheConfig {
            max_pages: config.cache.max_pages,
            ttl: config.cache.ttl(),
        },
        fetch_timeout: config.timeouts.fetch(),
        extract_timeout: config.timeouts.extract(),
        render_timeout: config.timeouts.render(),
        work_dir: config.source.work_dir.clone(),
    }
}

/// Run the server until Ctrl-C.
///
/// A failed startup refresh is logged and the server starts anyway, answering
/// 503 until a later refresh succeeds.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::spawn(config.engine.clone());

    if config.refresh_on_startup {
        match engine.refresh().await {
            Ok(generation) => tracing::info!(generation, "Initial refresh complete"),
            Err(e) => tracing::warn!(error = %e, "Initial refresh failed"),
        }
    }
    let scheduler = config
        .refresh_interval
        .map(|every| engine.schedule_refresh(every));

    let state = Arc::new(AppState {
        engine,
        version: config.version.clone(),
    });
    let app = app::create_router(state);

    let addr = SocketAddr::from_str(&format!("{}:{}", config.host, config.port))?;
    tracing::info!(address = %addr, source = %config.engine.source, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server");
}
