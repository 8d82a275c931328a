//! Render cache with per-key computation coalescing.
//!
//! Backed by a [`moka::future::Cache`]. Concurrent callers asking for the same
//! key while it is being computed wait for the single in-flight computation
//! and share its result. Failed computations are handed to every waiter but
//! never stored, so the next request computes again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

/// Cached outcome of rendering one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CachedPage {
    /// Rendered HTML.
    Content(Arc<str>),
    /// Renderer has no such page.
    Missing,
}

/// Render cache bounds.
#[derive(Clone, Debug, Default)]
pub struct RenderCacheConfig {
    /// Maximum number of cached pages. Unbounded when `None`.
    pub max_pages: Option<u64>,
    /// Time after which a cached page is dropped. Never when `None`.
    pub ttl: Option<Duration>,
}

/// Keyed page cache owned by a single site snapshot.
#[derive(Clone)]
pub struct RenderCache {
    pages: Cache<String, CachedPage>,
}

impl RenderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: &RenderCacheConfig) -> Self {
        let mut builder = Cache::builder();
        if let Some(max_pages) = config.max_pages {
            builder = builder.max_capacity(max_pages);
        }
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            pages: builder.build(),
        }
    }

    /// Return the cached page for `key`, computing it with `compute` on a miss.
    ///
    /// At most one `compute` future runs per key at a time.
    pub async fn get_or_compute<F, E>(&self, key: &str, compute: F) -> Result<CachedPage, Arc<E>>
    where
        F: Future<Output = Result<CachedPage, E>>,
        E: Send + Sync + 'static,
    {
        self.pages.try_get_with_by_ref(key, compute).await
    }

    /// Whether `key` currently has a cached value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.pages.contains_key(key)
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("entries", &self.pages.entry_count())
            .finish()
    }
}
