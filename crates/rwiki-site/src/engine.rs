//! Site engine: owns the serving snapshot and runs refreshes.
//!
//! The engine is a single tokio task (the actor) that owns the current
//! [`Snapshot`] and the refresh bookkeeping. [`Engine`] handles talk to it over
//! a channel, so snapshot replacement and snapshot lookup never race.
//!
//! A refresh runs the pipeline in the background:
//!
//! 1. fetch the archive and spool it to disk (bounded by `fetch_timeout`)
//! 2. unpack it, build the navigation tree and bind a renderer (bounded by
//!    `extract_timeout`)
//!
//! Pipeline completion is delivered back to the actor, which installs the new
//! snapshot in one step. Renders run in the caller's task against the snapshot
//! that was current when they were dispatched.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rwiki_archive::{ArchiveFetcher, ExtractError, Extractor, FetchError, SourceFetcher};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::render_cache::RenderCacheConfig;
use crate::renderer::{MarkdownRendererFactory, RendererFactory};
use crate::snapshot::{RenderError, RenderResult, Snapshot, SnapshotSettings};
use crate::template::{HtmlTemplate, PageTemplate};
use crate::toc::{Entry, TocError, build_toc};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 64;

/// Engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Archive reference (`https://...`, `file://...` or a local path).
    pub source: String,
    /// Drop the first path segment of every archive entry.
    pub strip_root: bool,
    /// Page path served as the site index in addition to `/`.
    pub home_page: String,
    /// Title of the navigation root and the HTML documents.
    pub title: String,
    /// Render cache bounds, applied to every snapshot.
    pub cache: RenderCacheConfig,
    /// Limit for fetching and spooling the archive.
    pub fetch_timeout: Duration,
    /// Limit for unpacking and building the navigation tree.
    pub extract_timeout: Duration,
    /// Limit for rendering a single page.
    pub render_timeout: Duration,
    /// Parent directory for temporary files. System default when `None`.
    pub work_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            strip_root: true,
            home_page: "Home.html".to_owned(),
            title: "Documentation".to_owned(),
            cache: RenderCacheConfig::default(),
            fetch_timeout: Duration::from_secs(120),
            extract_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(30),
            work_dir: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for `source` with default settings.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

/// Refresh pipeline stage, reported on timeouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Fetching and spooling the archive.
    Fetch,
    /// Unpacking and building the navigation tree.
    Extract,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => f.write_str("fetch"),
            Self::Extract => f.write_str("extract"),
        }
    }
}

/// Error returned when a refresh does not produce a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// Another refresh is still running.
    #[error("refresh {generation} already in progress")]
    InProgress {
        /// Generation of the running refresh.
        generation: u64,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Toc(#[from] TocError),

    /// Renderer could not be bound to the extracted sources.
    #[error("failed to open renderer")]
    Renderer(#[source] std::io::Error),

    /// Stage exceeded its time limit.
    #[error("{stage} stage timed out after {after:?}")]
    Timeout {
        /// Stage that timed out.
        stage: Stage,
        /// Configured limit.
        after: Duration,
    },

    /// Pipeline task panicked or was cancelled.
    #[error("refresh task failed: {0}")]
    Task(String),

    /// Engine has shut down.
    #[error("engine stopped")]
    Stopped,
}

/// Point-in-time view of the engine state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    /// A snapshot is being served.
    pub ready: bool,
    /// Generation of the served snapshot.
    pub generation: Option<u64>,
    /// A refresh is running.
    pub refreshing: bool,
}

enum Command {
    Refresh {
        reply: oneshot::Sender<Result<u64, RefreshError>>,
    },
    Current {
        reply: oneshot::Sender<Option<Arc<Snapshot>>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

struct Finished {
    generation: u64,
    outcome: Result<Snapshot, RefreshError>,
    reply: oneshot::Sender<Result<u64, RefreshError>>,
}

enum State {
    Unready,
    Ready(Arc<Snapshot>),
}

/// Handle to a running engine.
///
/// Cheap to clone. The engine stops once every handle is dropped.
#[derive(Clone, Debug)]
pub struct Engine {
    commands: mpsc::Sender<Command>,
}

impl Engine {
    /// Start building an engine.
    #[must_use]
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Spawn an engine with default collaborators.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(config: EngineConfig) -> Self {
        EngineBuilder::new(config).spawn()
    }

    /// Run the refresh pipeline and wait for it.
    ///
    /// Returns the generation of the installed snapshot. Fails with
    /// [`RefreshError::InProgress`] when another refresh is running; any other
    /// failure leaves the served snapshot untouched.
    pub async fn refresh(&self) -> Result<u64, RefreshError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Refresh { reply })
            .await
            .map_err(|_| RefreshError::Stopped)?;
        response.await.map_err(|_| RefreshError::Stopped)?
    }

    /// Resolve a request path against the current snapshot.
    pub async fn render(&self, path: &str) -> Result<RenderResult, RenderError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Current { reply })
            .await
            .map_err(|_| RenderError::Stopped)?;

        match response.await.map_err(|_| RenderError::Stopped)? {
            Some(snapshot) => snapshot.render(path).await,
            None => Ok(RenderResult::NotReady),
        }
    }

    /// Current snapshot, if any.
    pub async fn current(&self) -> Option<Arc<Snapshot>> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Current { reply }).await.ok()?;
        response.await.ok().flatten()
    }

    /// Navigation tree of the current snapshot.
    pub async fn toc(&self) -> Option<Arc<Entry>> {
        self.current().await.map(|snapshot| Arc::clone(snapshot.toc()))
    }

    /// Current engine state. Reports not ready once the engine has stopped.
    pub async fn status(&self) -> EngineStatus {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Status { reply }).await.is_err() {
            return EngineStatus::default();
        }
        response.await.unwrap_or_default()
    }

    /// Refresh every `every` in a background task.
    ///
    /// The first refresh happens one interval from now. Ticks landing on a
    /// running refresh are skipped. The task ends when the engine stops.
    pub fn schedule_refresh(&self, every: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match engine.refresh().await {
                    Ok(generation) => tracing::debug!(generation, "Scheduled refresh complete"),
                    Err(RefreshError::InProgress { generation }) => {
                        tracing::debug!(generation, "Scheduled refresh skipped, one is running");
                    }
                    Err(RefreshError::Stopped) => break,
                    Err(e) => tracing::debug!(error = %e, "Scheduled refresh failed"),
                }
            }
        })
    }
}

/// Builder for [`Engine`] with replaceable collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    fetcher: Option<Arc<dyn ArchiveFetcher>>,
    renderers: Arc<dyn RendererFactory>,
    template: Option<Arc<dyn PageTemplate>>,
}

impl EngineBuilder {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            fetcher: None,
            renderers: Arc::new(MarkdownRendererFactory),
            template: None,
        }
    }

    /// Use `fetcher` instead of [`SourceFetcher`].
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use `renderers` instead of [`MarkdownRendererFactory`].
    #[must_use]
    pub fn with_renderers(mut self, renderers: Arc<dyn RendererFactory>) -> Self {
        self.renderers = renderers;
        self
    }

    /// Use `template` instead of [`HtmlTemplate`].
    #[must_use]
    pub fn with_template(mut self, template: Arc<dyn PageTemplate>) -> Self {
        self.template = Some(template);
        self
    }

    /// Spawn the engine task and return its handle.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> Engine {
        let Self {
            config,
            fetcher,
            renderers,
            template,
        } = self;

        let fetcher =
            fetcher.unwrap_or_else(|| Arc::new(SourceFetcher::new(config.fetch_timeout)));
        let template =
            template.unwrap_or_else(|| Arc::new(HtmlTemplate::new(config.title.clone())));
        let extractor = match &config.work_dir {
            Some(dir) => Extractor::in_dir(dir.clone()),
            None => Extractor::new(),
        };
        let settings = SnapshotSettings {
            home_page: config.home_page.clone(),
            render_timeout: config.render_timeout,
            cache: config.cache.clone(),
        };

        let pipeline = Arc::new(Pipeline {
            config,
            fetcher,
            renderers,
            template,
            extractor,
            settings,
        });

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let actor = Actor {
            pipeline,
            state: State::Unready,
            refreshing: None,
            last_generation: 0,
        };
        tokio::spawn(actor.run(receiver));

        Engine { commands }
    }
}

struct Actor {
    pipeline: Arc<Pipeline>,
    state: State,
    refreshing: Option<u64>,
    last_generation: u64,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
        tracing::debug!(source = %self.pipeline.config.source, "Engine started");

        loop {
            tokio::select! {
                biased;
                Some(finished) = finished_rx.recv() => self.finish(finished),
                command = commands.recv() => match command {
                    Some(command) => self.handle(command, &finished_tx),
                    None => break,
                },
            }
        }

        tracing::debug!("Engine stopped");
    }

    fn handle(&mut self, command: Command, finished: &mpsc::UnboundedSender<Finished>) {
        match command {
            Command::Refresh { reply } => self.start_refresh(reply, finished),
            Command::Current { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn start_refresh(
        &mut self,
        reply: oneshot::Sender<Result<u64, RefreshError>>,
        finished: &mpsc::UnboundedSender<Finished>,
    ) {
        if let Some(generation) = self.refreshing {
            tracing::debug!(generation, "Rejecting overlapping refresh");
            let _ = reply.send(Err(RefreshError::InProgress { generation }));
            return;
        }

        self.last_generation += 1;
        let generation = self.last_generation;
        self.refreshing = Some(generation);
        tracing::info!(generation, "Refresh started");

        let pipeline = Arc::clone(&self.pipeline);
        let finished = finished.clone();
        tokio::spawn(async move {
            let outcome = pipeline.run(generation).await;
            let _ = finished.send(Finished {
                generation,
                outcome,
                reply,
            });
        });
    }

    fn finish(&mut self, finished: Finished) {
        let Finished {
            generation,
            outcome,
            reply,
        } = finished;
        if self.refreshing == Some(generation) {
            self.refreshing = None;
        }

        let result = match outcome {
            Ok(snapshot) => {
                let previous = std::mem::replace(&mut self.state, State::Ready(Arc::new(snapshot)));
                if let State::Ready(previous) = previous {
                    tracing::debug!(
                        generation,
                        previous = previous.generation(),
                        "Superseded snapshot"
                    );
                }
                tracing::info!(generation, "Serving new snapshot");
                Ok(generation)
            }
            Err(e) => {
                tracing::warn!(
                    generation,
                    error = %e,
                    serving = ?self.snapshot().map(|s| s.generation()),
                    "Refresh failed, keeping current state"
                );
                Err(e)
            }
        };
        let _ = reply.send(result);
    }

    fn snapshot(&self) -> Option<Arc<Snapshot>> {
        match &self.state {
            State::Unready => None,
            State::Ready(snapshot) => Some(Arc::clone(snapshot)),
        }
    }

    fn status(&self) -> EngineStatus {
        let generation = match &self.state {
            State::Unready => None,
            State::Ready(snapshot) => Some(snapshot.generation()),
        };
        EngineStatus {
            ready: generation.is_some(),
            generation,
            refreshing: self.refreshing.is_some(),
        }
    }
}

/// Fetch, extract, and index pipeline shared by every refresh.
struct Pipeline {
    config: EngineConfig,
    fetcher: Arc<dyn ArchiveFetcher>,
    renderers: Arc<dyn RendererFactory>,
    template: Arc<dyn PageTemplate>,
    extractor: Extractor,
    settings: SnapshotSettings,
}

impl Pipeline {
    async fn run(self: Arc<Self>, generation: u64) -> Result<Snapshot, RefreshError> {
        let started = Instant::now();

        let this = Arc::clone(&self);
        let spooled = run_stage(Stage::Fetch, self.config.fetch_timeout, move || {
            let stream = this.fetcher.fetch(&this.config.source)?;
            let spooled = this.extractor.spool(stream).map_err(FetchError::Stream)?;
            Ok(spooled)
        })
        .await?;

        let this = Arc::clone(&self);
        let (dir, toc, renderer) = run_stage(Stage::Extract, self.config.extract_timeout, move || {
            let dir = this.extractor.unpack(spooled, this.config.strip_root)?;
            let toc = build_toc(dir.path(), &this.config.title)?;
            let renderer = this.renderers.open(dir.path()).map_err(RefreshError::Renderer)?;
            Ok((dir, toc, renderer))
        })
        .await?;

        tracing::info!(
            generation,
            pages = toc.document_count(),
            elapsed_ms = started.elapsed().as_millis(),
            "Refresh pipeline finished"
        );

        Ok(Snapshot::new(
            generation,
            dir,
            toc,
            renderer,
            Arc::clone(&self.template),
            &self.settings,
        ))
    }
}

/// Run a blocking pipeline stage under a time limit.
///
/// A timed-out stage keeps running on its blocking thread; its output is
/// dropped when it finishes, which removes any temporary files it created.
async fn run_stage<T, F>(stage: Stage, after: Duration, work: F) -> Result<T, RefreshError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RefreshError> + Send + 'static,
{
    match tokio::time::timeout(after, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(RefreshError::Task(join_error.to_string())),
        Err(_) => Err(RefreshError::Timeout { stage, after }),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rwiki_archive::{MemoryFetcher, zip_bytes};

    use super::*;
    use crate::renderer::{MarkdownRenderer, PageRenderer};

    const SOURCE: &str = "mem://site";

    fn site_v1() -> Vec<u8> {
        zip_bytes(&[
            ("wiki-main/", ""),
            ("wiki-main/toc.txt", "Home:Home\nguides:Guides"),
            ("wiki-main/Home.md", "# Welcome"),
            ("wiki-main/guides/toc.txt", "Setup:Setup"),
            ("wiki-main/guides/Setup.md", "Version one."),
            ("wiki-main/style.css", "body {}"),
        ])
    }

    fn site_v2() -> Vec<u8> {
        zip_bytes(&[
            ("wiki-main/toc.txt", "Home:Home\nguides:Guides\nNews:News"),
            ("wiki-main/Home.md", "# Welcome back"),
            ("wiki-main/guides/toc.txt", "Setup:Setup"),
            ("wiki-main/guides/Setup.md", "Version two."),
            ("wiki-main/News.md", "Fresh."),
        ])
    }

    struct CountingFactory {
        calls: Arc<AtomicUsize>,
    }

    struct CountingRenderer {
        inner: MarkdownRenderer,
        calls: Arc<AtomicUsize>,
    }

    impl PageRenderer for CountingRenderer {
        fn render(&self, page_name: &str) -> io::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.inner.render(page_name)
        }
    }

    impl RendererFactory for CountingFactory {
        fn open(&self, source_dir: &std::path::Path) -> io::Result<Arc<dyn PageRenderer>> {
            Ok(Arc::new(CountingRenderer {
                inner: MarkdownRenderer::open(source_dir)?,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct FlakyFactory {
        failures_left: Arc<AtomicUsize>,
    }

    struct FlakyRenderer {
        failures_left: Arc<AtomicUsize>,
    }

    impl PageRenderer for FlakyRenderer {
        fn render(&self, page_name: &str) -> io::Result<Option<String>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(io::Error::other("transient"));
            }
            Ok(Some(format!("<p>{page_name}</p>")))
        }
    }

    impl RendererFactory for FlakyFactory {
        fn open(&self, _source_dir: &std::path::Path) -> io::Result<Arc<dyn PageRenderer>> {
            Ok(Arc::new(FlakyRenderer {
                failures_left: Arc::clone(&self.failures_left),
            }))
        }
    }

    struct SlowOpenFactory;

    impl RendererFactory for SlowOpenFactory {
        fn open(&self, source_dir: &std::path::Path) -> io::Result<Arc<dyn PageRenderer>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Arc::new(MarkdownRenderer::open(source_dir)?))
        }
    }

    fn engine_with(fetcher: Arc<MemoryFetcher>) -> Engine {
        Engine::builder(EngineConfig::new(SOURCE))
            .with_fetcher(fetcher)
            .spawn()
    }

    fn content(result: RenderResult) -> Arc<str> {
        match result {
            RenderResult::Content(html) => html,
            other => panic!("expected content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unready_engine_answers_not_ready() {
        let engine = engine_with(Arc::new(MemoryFetcher::new()));

        for path in ["", "/", "/Home.html", "/guides/Setup.html", "/style.css", "/../x"] {
            let result = engine.render(path).await.unwrap();
            assert!(matches!(result, RenderResult::NotReady), "path {path:?} gave {result:?}");
        }
        assert_eq!(engine.status().await, EngineStatus::default());
        assert!(engine.toc().await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_makes_engine_ready() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(Arc::clone(&fetcher));

        let generation = engine.refresh().await.unwrap();

        assert_eq!(generation, 1);
        assert_eq!(
            engine.status().await,
            EngineStatus {
                ready: true,
                generation: Some(1),
                refreshing: false,
            }
        );
        let toc = engine.toc().await.unwrap();
        assert_eq!(toc.name(), "Documentation");
        assert_eq!(toc.children().len(), 2);

        let html = content(engine.render("/guides/Setup.html").await.unwrap());
        assert!(html.contains("Version one."));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_index_aliases_are_equal() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(fetcher);
        engine.refresh().await.unwrap();

        let empty = content(engine.render("").await.unwrap());
        let root = content(engine.render("/").await.unwrap());
        let home = content(engine.render("/Home.html").await.unwrap());

        assert_eq!(empty, root);
        assert_eq!(root, home);
        let snapshot = engine.current().await.unwrap();
        assert!(snapshot.cache().contains("/"));
        assert!(!snapshot.cache().contains("/Home.html"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_renders_compute_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = Engine::builder(EngineConfig::new(SOURCE))
            .with_fetcher(fetcher)
            .with_renderers(Arc::new(CountingFactory {
                calls: Arc::clone(&calls),
            }))
            .spawn();
        engine.refresh().await.unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.render("/guides/Setup.html").await })
            })
            .collect();
        let mut pages = Vec::new();
        for task in tasks {
            pages.push(content(task.await.unwrap().unwrap()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pages.len(), 10);
        assert!(pages.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_missing_static_resource_is_rechecked() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(fetcher);
        engine.refresh().await.unwrap();

        let first = engine.render("/img/logo.png").await.unwrap();
        assert!(matches!(first, RenderResult::NotFound(ref p) if p == "/img/logo.png"));

        let snapshot = engine.current().await.unwrap();
        assert!(!snapshot.cache().contains("/img/logo.png"));
        std::fs::create_dir_all(snapshot.source_dir().join("img")).unwrap();
        std::fs::write(snapshot.source_dir().join("img/logo.png"), b"png").unwrap();

        let second = engine.render("/img/logo.png").await.unwrap();
        let RenderResult::RawResource(resource) = second else {
            panic!("expected raw resource, got {second:?}");
        };
        assert_eq!(resource.read().await.unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_strip_root_disabled_keeps_top_directory() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(
            SOURCE,
            zip_bytes(&[
                ("toc.txt", "Home:Home"),
                ("Home.md", "top level"),
                ("wiki-main/style.css", "body {}"),
            ]),
        ));
        let engine = Engine::builder(EngineConfig {
            strip_root: false,
            ..EngineConfig::new(SOURCE)
        })
        .with_fetcher(fetcher)
        .spawn();
        engine.refresh().await.unwrap();

        let result = engine.render("/wiki-main/style.css").await.unwrap();

        assert!(matches!(result, RenderResult::RawResource(_)));
    }

    #[tokio::test]
    async fn test_refresh_invalidates_cached_pages() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(Arc::clone(&fetcher));
        engine.refresh().await.unwrap();
        let before = content(engine.render("/guides/Setup.html").await.unwrap());
        let missing = engine.render("/News.html").await.unwrap();
        assert!(matches!(missing, RenderResult::NotFound(_)));

        fetcher.set_archive(SOURCE, site_v2());
        assert_eq!(engine.refresh().await.unwrap(), 2);

        let after = content(engine.render("/guides/Setup.html").await.unwrap());
        assert!(before.contains("Version one."));
        assert!(after.contains("Version two."));
        let news = content(engine.render("/News.html").await.unwrap());
        assert!(news.contains("Fresh."));
        assert_eq!(engine.toc().await.unwrap().children().len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_refresh_is_rejected() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_archive(SOURCE, site_v1())
                .with_delay(Duration::from_millis(300)),
        );
        let engine = engine_with(Arc::clone(&fetcher));

        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh().await }
        });
        while !engine.status().await.refreshing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = engine.refresh().await;

        assert!(matches!(second, Err(RefreshError::InProgress { generation: 1 })));
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(fetcher.calls(), 1);
        assert!(!engine.status().await.refreshing);
    }

    #[tokio::test]
    async fn test_renders_served_while_refreshing() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_archive(SOURCE, site_v1())
                .with_delay(Duration::from_millis(200)),
        );
        let engine = engine_with(Arc::clone(&fetcher));
        engine.refresh().await.unwrap();

        fetcher.set_archive(SOURCE, site_v2());
        let refresh = tokio::spawn({
            let engine = engine.clone();
            async move { engine.refresh().await }
        });
        while !engine.status().await.refreshing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let during = content(engine.render("/guides/Setup.html").await.unwrap());
        assert!(during.contains("Version one."));

        assert_eq!(refresh.await.unwrap().unwrap(), 2);
        let after = content(engine.render("/guides/Setup.html").await.unwrap());
        assert!(after.contains("Version two."));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(Arc::clone(&fetcher));
        engine.refresh().await.unwrap();

        fetcher.remove_archive(SOURCE);
        let err = engine.refresh().await.unwrap_err();

        assert!(matches!(err, RefreshError::Fetch(FetchError::Status { status: 404, .. })));
        let status = engine.status().await;
        assert_eq!(status.generation, Some(1));
        assert!(!status.refreshing);
        let html = content(engine.render("/guides/Setup.html").await.unwrap());
        assert!(html.contains("Version one."));
    }

    #[tokio::test]
    async fn test_missing_manifest_keeps_engine_unready() {
        let fetcher = Arc::new(
            MemoryFetcher::new().with_archive(SOURCE, zip_bytes(&[("root/Home.md", "# Home")])),
        );
        let engine = engine_with(fetcher);

        let err = engine.refresh().await.unwrap_err();

        assert!(matches!(err, RefreshError::Toc(TocError::ManifestRead { .. })));
        assert!(matches!(engine.render("/").await.unwrap(), RenderResult::NotReady));
    }

    #[tokio::test]
    async fn test_malformed_archive_fails_refresh() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, b"not a zip".to_vec()));
        let engine = engine_with(fetcher);

        let err = engine.refresh().await.unwrap_err();

        assert!(matches!(err, RefreshError::Extract(ExtractError::Zip(_))));
    }

    #[tokio::test]
    async fn test_traversal_entry_fails_refresh() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(
            SOURCE,
            zip_bytes(&[("root/toc.txt", "Home:Home"), ("root/../../evil.md", "x")]),
        ));
        let engine = engine_with(fetcher);

        let err = engine.refresh().await.unwrap_err();

        assert!(matches!(err, RefreshError::Extract(ExtractError::UnsafeEntry(_))));
        assert!(!engine.status().await.ready);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_archive(SOURCE, site_v1())
                .with_delay(Duration::from_millis(500)),
        );
        let engine = Engine::builder(EngineConfig {
            fetch_timeout: Duration::from_millis(20),
            ..EngineConfig::new(SOURCE)
        })
        .with_fetcher(fetcher)
        .spawn();

        let err = engine.refresh().await.unwrap_err();

        assert!(matches!(
            err,
            RefreshError::Timeout {
                stage: Stage::Fetch,
                ..
            }
        ));
        assert!(!engine.status().await.refreshing);
    }

    #[tokio::test]
    async fn test_extract_timeout() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = Engine::builder(EngineConfig {
            extract_timeout: Duration::from_millis(20),
            ..EngineConfig::new(SOURCE)
        })
        .with_fetcher(fetcher)
        .with_renderers(Arc::new(SlowOpenFactory))
        .spawn();

        let err = engine.refresh().await.unwrap_err();

        assert!(matches!(
            err,
            RefreshError::Timeout {
                stage: Stage::Extract,
                ..
            }
        ));
        let status = engine.status().await;
        assert!(!status.ready);
        assert!(!status.refreshing);
        assert!(matches!(engine.render("/Home.html").await.unwrap(), RenderResult::NotReady));
    }

    #[tokio::test]
    async fn test_render_errors_are_not_cached() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = Engine::builder(EngineConfig::new(SOURCE))
            .with_fetcher(fetcher)
            .with_renderers(Arc::new(FlakyFactory {
                failures_left: Arc::new(AtomicUsize::new(1)),
            }))
            .spawn();
        engine.refresh().await.unwrap();

        let err = engine.render("/Page.html").await.unwrap_err();
        assert!(matches!(err, RenderError::Io { ref page, .. } if page == "Page"));

        let html = content(engine.render("/Page.html").await.unwrap());
        assert!(html.contains("<p>Page</p>"));
    }

    #[tokio::test]
    async fn test_superseded_snapshot_released_after_last_reference() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(Arc::clone(&fetcher));
        engine.refresh().await.unwrap();

        let held = engine.current().await.unwrap();
        let old_dir = held.source_dir().to_path_buf();

        fetcher.set_archive(SOURCE, site_v2());
        engine.refresh().await.unwrap();

        assert!(old_dir.exists());
        let stale = content(held.render("/guides/Setup.html").await.unwrap());
        assert!(stale.contains("Version one."));

        drop(held);
        assert!(!old_dir.exists());

        let fresh = content(engine.render("/guides/Setup.html").await.unwrap());
        assert!(fresh.contains("Version two."));
    }

    #[tokio::test]
    async fn test_schedule_refresh_runs_periodically() {
        let fetcher = Arc::new(MemoryFetcher::new().with_archive(SOURCE, site_v1()));
        let engine = engine_with(Arc::clone(&fetcher));

        let task = engine.schedule_refresh(Duration::from_millis(30));
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.status().await.generation.unwrap_or(0) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        task.abort();

        assert!(fetcher.calls() >= 2);
    }
}
