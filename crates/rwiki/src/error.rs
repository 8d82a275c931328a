//! CLI error types.

use rwiki_config::ConfigError;
use rwiki_site::RefreshError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Refresh(#[from] RefreshError),

    #[error("{0}")]
    Server(String),
}
