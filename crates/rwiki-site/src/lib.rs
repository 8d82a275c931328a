//! Site snapshots, navigation and cached page rendering for rwiki.
//!
//! The [`Engine`] turns an archive reference into a servable site:
//!
//! - refresh: fetch the archive, extract it, build the navigation tree from
//!   per-directory [`MANIFEST_FILENAME`] files and install a new [`Snapshot`]
//! - render: resolve request paths against the current snapshot, caching
//!   rendered pages with at most one computation per path in flight
//!
//! Until the first refresh succeeds every render answers
//! [`RenderResult::NotReady`].
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use rwiki_site::{Engine, EngineConfig, RenderResult};
//!
//! let engine = Engine::spawn(EngineConfig::new("https://example.com/wiki.zip"));
//! let generation = engine.refresh().await?;
//!
//! if let RenderResult::Content(html) = engine.render("/Home.html").await? {
//!     println!("generation {generation}: {} bytes", html.len());
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod render_cache;
mod renderer;
mod snapshot;
mod template;
mod toc;

pub use engine::{Engine, EngineBuilder, EngineConfig, EngineStatus, RefreshError, Stage};
pub use render_cache::{CachedPage, RenderCache, RenderCacheConfig};
pub use renderer::{
    MarkdownRenderer, MarkdownRendererFactory, PageRenderer, RendererFactory, markdown_to_html,
};
pub use snapshot::{INDEX_KEY, PAGE_EXTENSION, RenderError, RenderResult, Snapshot, StaticResource};
pub use template::{HtmlTemplate, PageTemplate};
pub use toc::{Entry, MANIFEST_FILENAME, ManifestLine, TocError, build_toc, classify_line};
