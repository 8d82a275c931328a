//! `rwiki serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use rwiki_config::{CliSettings, Config};
use rwiki_server::{ServerConfig, run_server};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover rwiki.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive URL or file path (overrides config).
    #[arg(short, long, env = "RWIKI_SOURCE")]
    source: Option<String>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Strip the archive's single top-level directory (default: enabled).
    #[arg(long)]
    strip_root: Option<bool>,

    /// Keep the archive's top-level directory.
    #[arg(long, conflicts_with = "strip_root")]
    no_strip_root: bool,

    /// Enable verbose output (refresh and request logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            source: self.source,
            strip_root: self.no_strip_root.then_some(false).or(self.strip_root),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let server_config = ServerConfig::from_config(&config, version.to_owned())?;

        output.info(&format!(
            "Starting server on {}:{}",
            server_config.host, server_config.port
        ));
        output.info(&format!("Archive: {}", server_config.engine.source));
        match server_config.refresh_interval {
            Some(every) => output.info(&format!("Refresh every {}s", every.as_secs())),
            None => output.info("Periodic refresh: disabled"),
        }

        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))
    }
}
