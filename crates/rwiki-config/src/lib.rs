//! Configuration management for rwiki.
//!
//! Parses `rwiki.toml` configuration files with serde and discovers them in
//! the current directory or its parents. CLI settings can be applied during
//! load via [`CliSettings`].
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [source]
//! url = "https://git.example.com/team/wiki/archive/main.zip"
//! strip_root = true
//!
//! [cache]
//! max_pages = 500
//!
//! [refresh]
//! interval_secs = 300
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `server.host` and `source.url` support `${VAR}` (error if unset) and
//! `${VAR:-default}`.

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "rwiki.toml";

/// Schemes accepted for `source.url`.
const SOURCE_SCHEMES: [&str; 3] = ["http://", "https://", "file://"];

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override archive reference.
    pub source: Option<String>,
    /// Override root segment stripping.
    pub strip_root: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Archive source settings.
    pub source: SourceConfig,
    /// Render cache bounds.
    pub cache: CacheConfig,
    /// Pipeline and render time limits.
    pub timeouts: TimeoutsConfig,
    /// Refresh scheduling.
    pub refresh: RefreshConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
        }
    }
}

/// Archive source configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Archive reference: `http(s)://` URL, `file://` URL or local path.
    pub url: Option<String>,
    /// Drop the first path segment of every archive entry.
    pub strip_root: bool,
    /// Page path also served as the site index.
    pub home_page: String,
    /// Site title.
    pub title: String,
    /// Directory for temporary archives and extracted sites.
    pub work_dir: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            strip_root: true,
            home_page: "Home.html".to_owned(),
            title: "Documentation".to_owned(),
            work_dir: None,
        }
    }
}

/// Render cache configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached pages per snapshot.
    pub max_pages: Option<u64>,
    /// Seconds after which a cached page is dropped.
    pub ttl_secs: Option<u64>,
}

impl CacheConfig {
    /// Cached page lifetime.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Time limits in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Fetching and spooling the archive.
    pub fetch_secs: u64,
    /// Unpacking and building navigation.
    pub extract_secs: u64,
    /// Rendering one page.
    pub render_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 120,
            extract_secs: 120,
            render_secs: 30,
        }
    }
}

impl TimeoutsConfig {
    #[must_use]
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    #[must_use]
    pub fn extract(&self) -> Duration {
        Duration::from_secs(self.extract_secs)
    }

    #[must_use]
    pub fn render(&self) -> Duration {
        Duration::from_secs(self.render_secs)
    }
}

/// Refresh scheduling configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Refresh once when the server starts.
    pub on_startup: bool,
    /// Seconds between periodic refreshes. Disabled when unset.
    pub interval_secs: Option<u64>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            on_startup: true,
            interval_secs: None,
        }
    }
}

impl RefreshConfig {
    /// Periodic refresh interval.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "source.url").
        field: String,
        /// Error message (e.g., "${`WIKI_URL`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise, searches
    /// for `rwiki.toml` in the current directory and its parents, falling back
    /// to defaults.
    ///
    /// CLI settings are applied after loading and validated with the rest.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;

        Ok(config)
    }

    /// Archive reference to serve.
    ///
    /// Returns `ConfigError::Validation` when neither the config file nor the
    /// command line set one.
    pub fn require_source(&self) -> Result<&str, ConfigError> {
        self.source.url.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "source.url must be set in config or with --source".to_owned(),
            )
        })
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_source()?;
        self.validate_timeouts()?;
        Ok(())
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(source) = &settings.source {
            self.source.url = Some(source.clone());
        }
        if let Some(strip_root) = settings.strip_root {
            self.source.strip_root = strip_root;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Validation(
                "server.host cannot be empty".to_owned(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_source(&self) -> Result<(), ConfigError> {
        if self.source.home_page.trim_matches('/').is_empty() {
            return Err(ConfigError::Validation(
                "source.home_page cannot be empty".to_owned(),
            ));
        }
        let Some(url) = &self.source.url else {
            return Ok(());
        };
        if url.is_empty() {
            return Err(ConfigError::Validation(
                "source.url cannot be empty".to_owned(),
            ));
        }
        if url.contains("://") && !SOURCE_SCHEMES.iter().any(|s| url.starts_with(s)) {
            return Err(ConfigError::Validation(format!(
                "source.url must use http://, https:// or file://, got {url}"
            )));
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (self.timeouts.fetch_secs, "timeouts.fetch_secs"),
            (self.timeouts.extract_secs, "timeouts.extract_secs"),
            (self.timeouts.render_secs, "timeouts.render_secs"),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "{field} must be greater than 0"
                )));
            }
        }
        if self.refresh.interval_secs == Some(0) {
            return Err(ConfigError::Validation(
                "refresh.interval_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        if let Some(url) = &self.source.url {
            self.source.url = Some(expand::expand_env(url, "source.url")?);
        }
        Ok(())
    }

    /// Resolve local paths relative to the config file directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        if let Some(url) = &self.source.url
            && !url.contains("://")
            && Path::new(url).is_relative()
        {
            self.source.url = Some(config_dir.join(url).to_string_lossy().into_owned());
        }
        if let Some(work_dir) = &self.source.work_dir
            && work_dir.is_relative()
        {
            self.source.work_dir = Some(config_dir.join(work_dir));
        }
    }
}
