//! Immutable site snapshots and request dispatch.
//!
//! A [`Snapshot`] owns one extracted source directory together with its
//! navigation tree, its renderer and its render cache. Requests are resolved
//! against a snapshot by shape:
//!
//! - `""`, `/` and the configured home page render the index (cached under `/`)
//! - paths ending in `.html` render a page (cached under the request path)
//! - anything else resolves to a file in the source directory (never cached)
//!
//! Snapshots are shared behind [`Arc`]. The source directory is deleted when the
//! last reference goes away, so a [`StaticResource`] keeps its file readable
//! until the response has been produced.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::render_cache::{CachedPage, RenderCache, RenderCacheConfig};
use crate::renderer::PageRenderer;
use crate::template::PageTemplate;
use crate::toc::Entry;

/// Extension of rendered page paths.
pub const PAGE_EXTENSION: &str = ".html";

/// Cache key of the site index.
pub const INDEX_KEY: &str = "/";

/// Outcome of a render request.
#[derive(Debug)]
pub enum RenderResult {
    /// Rendered HTML document.
    Content(Arc<str>),
    /// File from the source directory.
    RawResource(StaticResource),
    /// Nothing at this path.
    NotFound(String),
    /// No snapshot has been loaded yet.
    NotReady,
}

/// Error produced while rendering a page.
///
/// Cloneable so that every caller waiting on the same computation receives it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RenderError {
    /// Renderer failed reading or converting the page.
    #[error("failed to render page {page}")]
    Io {
        /// Page name.
        page: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Renderer did not finish in time.
    #[error("rendering page {page} timed out after {after:?}")]
    Timeout {
        /// Page name.
        page: String,
        /// Configured limit.
        after: Duration,
    },

    /// Render task panicked or was cancelled.
    #[error("render task failed: {0}")]
    Task(String),

    /// Engine has shut down.
    #[error("engine stopped")]
    Stopped,
}

/// File inside a snapshot's source directory.
///
/// Holds the snapshot alive, so the file stays on disk while this exists.
pub struct StaticResource {
    path: PathBuf,
    snapshot: Arc<Snapshot>,
}

impl StaticResource {
    /// Absolute path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generation of the snapshot serving this file.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.snapshot.generation
    }

    /// Read the whole file.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl std::fmt::Debug for StaticResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticResource")
            .field("path", &self.path)
            .field("generation", &self.snapshot.generation)
            .finish()
    }
}

/// Per-snapshot rendering settings.
#[derive(Clone, Debug)]
pub(crate) struct SnapshotSettings {
    pub home_page: String,
    pub render_timeout: Duration,
    pub cache: RenderCacheConfig,
}

/// One loaded version of the site.
pub struct Snapshot {
    generation: u64,
    dir: TempDir,
    toc: Arc<Entry>,
    renderer: Arc<dyn PageRenderer>,
    template: Arc<dyn PageTemplate>,
    cache: RenderCache,
    home_page: String,
    render_timeout: Duration,
}

impl Snapshot {
    pub(crate) fn new(
        generation: u64,
        dir: TempDir,
        toc: Entry,
        renderer: Arc<dyn PageRenderer>,
        template: Arc<dyn PageTemplate>,
        settings: &SnapshotSettings,
    ) -> Self {
        Self {
            generation,
            dir,
            toc: Arc::new(toc),
            renderer,
            template,
            cache: RenderCache::new(&settings.cache),
            home_page: normalize_path(&settings.home_page),
            render_timeout: settings.render_timeout,
        }
    }

    /// Refresh generation that produced this snapshot.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Directory holding the extracted sources.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Navigation tree.
    #[must_use]
    pub fn toc(&self) -> &Arc<Entry> {
        &self.toc
    }

    /// Render cache of this snapshot.
    #[must_use]
    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Resolve a request path against this snapshot.
    pub async fn render(self: &Arc<Self>, path: &str) -> Result<RenderResult, RenderError> {
        let key = normalize_path(path);

        if key == INDEX_KEY || key == self.home_page {
            return self.render_index().await;
        }
        if key.ends_with(PAGE_EXTENSION) {
            return self.render_page(key).await;
        }
        Ok(self.resolve_static(key).await)
    }

    async fn render_index(&self) -> Result<RenderResult, RenderError> {
        let page = self
            .cache
            .get_or_compute(INDEX_KEY, async {
                let html = self.template.render_index(&self.toc);
                Ok::<_, RenderError>(CachedPage::Content(Arc::from(html)))
            })
            .await
            .map_err(|e| RenderError::clone(&e))?;

        Ok(match page {
            CachedPage::Content(html) => RenderResult::Content(html),
            CachedPage::Missing => RenderResult::NotFound(INDEX_KEY.to_owned()),
        })
    }

    async fn render_page(&self, key: String) -> Result<RenderResult, RenderError> {
        let name = page_name(&key).to_owned();
        let page = self
            .cache
            .get_or_compute(&key, self.compute_page(name))
            .await
            .map_err(|e| RenderError::clone(&e))?;

        Ok(match page {
            CachedPage::Content(html) => RenderResult::Content(html),
            CachedPage::Missing => RenderResult::NotFound(key),
        })
    }

    async fn compute_page(&self, name: String) -> Result<CachedPage, RenderError> {
        let started = Instant::now();
        let renderer = Arc::clone(&self.renderer);
        let task = {
            let name = name.clone();
            tokio::task::spawn_blocking(move || renderer.render(&name))
        };

        let body = match tokio::time::timeout(self.render_timeout, task).await {
            Ok(Ok(Ok(body))) => body,
            Ok(Ok(Err(source))) => {
                return Err(RenderError::Io {
                    page: name,
                    source: Arc::new(source),
                });
            }
            Ok(Err(join_error)) => return Err(RenderError::Task(join_error.to_string())),
            Err(_) => {
                return Err(RenderError::Timeout {
                    page: name,
                    after: self.render_timeout,
                });
            }
        };

        let Some(body) = body else {
            tracing::debug!(generation = self.generation, page = %name, "Page not found");
            return Ok(CachedPage::Missing);
        };

        let html = self.template.wrap_page(&body, &self.toc);
        tracing::debug!(
            generation = self.generation,
            page = %name,
            elapsed_ms = started.elapsed().as_millis(),
            "Rendered page"
        );
        Ok(CachedPage::Content(Arc::from(html)))
    }

    async fn resolve_static(self: &Arc<Self>, key: String) -> RenderResult {
        let relative = Path::new(key.trim_start_matches('/'));
        let safe = relative.components().next().is_some()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return RenderResult::NotFound(key);
        }

        let path = self.dir.path().join(relative);
        let is_file = tokio::fs::metadata(&path)
            .await
            .is_ok_and(|meta| meta.is_file());
        if is_file {
            RenderResult::RawResource(StaticResource {
                path,
                snapshot: Arc::clone(self),
            })
        } else {
            RenderResult::NotFound(key)
        }
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field("dir", &self.dir.path())
            .field("home_page", &self.home_page)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        tracing::debug!(
            generation = self.generation,
            dir = %self.dir.path().display(),
            "Releasing snapshot"
        );
    }
}

/// Ensure a request path starts with `/`.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// Page name for a `.html` request path: extension removed, trailing
/// separators trimmed, final segment kept.
fn page_name(path: &str) -> &str {
    let stem = path.strip_suffix(PAGE_EXTENSION).unwrap_or(path);
    let stem = stem.trim_end_matches('/');
    stem.rsplit('/').next().unwrap_or(stem)
}
