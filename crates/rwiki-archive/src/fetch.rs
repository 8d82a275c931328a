//! Archive fetching.
//!
//! An [`ArchiveFetcher`] opens a readable byte stream for a source reference.
//! Fetchers have no persistent side effects; callers either drain the stream
//! or drop it.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ureq::Agent;

/// Default HTTP timeout covering the request and the body download.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Byte stream of a fetched archive.
pub type ArchiveStream = Box<dyn Read + Send>;

/// Error returned when an archive cannot be fetched.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request failed (unreachable host, TLS failure, timeout).
    #[error("HTTP request failed")]
    Http(#[from] ureq::Error),

    /// Server answered with a non-2xx status.
    #[error("HTTP error {status} fetching {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Local archive could not be opened.
    #[error("cannot open archive {}", .path.display())]
    Io {
        /// Archive path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Stream broke off while the archive was being downloaded.
    #[error("failed reading archive stream")]
    Stream(#[source] std::io::Error),

    /// Reference uses a scheme no fetcher understands.
    #[error("unsupported source reference: {0}")]
    UnsupportedSource(String),
}

/// Opens archive byte streams for source references.
///
/// Implementations are blocking; async callers run them on a blocking thread.
pub trait ArchiveFetcher: Send + Sync {
    /// Open a byte stream for `source`.
    fn fetch(&self, source: &str) -> Result<ArchiveStream, FetchError>;
}

/// Fetches archives over HTTP(S) with a shared [`Agent`].
pub struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    /// Create a fetcher whose requests (including body download) are bounded
    /// by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, source: &str) -> Result<ArchiveStream, FetchError> {
        let response = self.agent.get(source).call()?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                status,
                url: source.to_owned(),
            });
        }

        tracing::debug!(url = %source, status, "Archive response received");
        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Reads archives from the local filesystem.
///
/// Accepts plain paths and `file://` references.
#[derive(Debug, Default)]
pub struct FileFetcher;

impl ArchiveFetcher for FileFetcher {
    fn fetch(&self, source: &str) -> Result<ArchiveStream, FetchError> {
        let path = Path::new(source.strip_prefix("file://").unwrap_or(source));
        let file = File::open(path).map_err(|source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

/// Picks [`HttpFetcher`] or [`FileFetcher`] from the reference scheme.
#[derive(Default)]
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    /// Create a dispatching fetcher with the given HTTP timeout.
    #[must_use]
    pub fn new(http_timeout: Duration) -> Self {
        Self {
            http: HttpFetcher::new(http_timeout),
            file: FileFetcher,
        }
    }
}

impl ArchiveFetcher for SourceFetcher {
    fn fetch(&self, source: &str) -> Result<ArchiveStream, FetchError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            self.http.fetch(source)
        } else if source.starts_with("file://") || !source.contains("://") {
            self.file.fetch(source)
        } else {
            Err(FetchError::UnsupportedSource(source.to_owned()))
        }
    }
}
