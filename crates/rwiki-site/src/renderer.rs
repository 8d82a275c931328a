//! Page renderers bound to an extracted source directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pulldown_cmark::{Options, Parser, html};

/// Renders named pages to HTML bodies.
///
/// Implementations are invoked from blocking threads and may do file I/O.
pub trait PageRenderer: Send + Sync {
    /// Render the page called `page_name`.
    ///
    /// Returns `Ok(None)` when no such page exists.
    fn render(&self, page_name: &str) -> io::Result<Option<String>>;
}

/// Creates a [`PageRenderer`] for a freshly extracted source directory.
pub trait RendererFactory: Send + Sync {
    /// Bind a renderer to `source_dir`.
    fn open(&self, source_dir: &Path) -> io::Result<Arc<dyn PageRenderer>>;
}

/// Markdown renderer resolving pages by file stem.
///
/// Every `*.md` file below the source directory is indexed once at
/// construction. When two files share a stem, the first in sorted path order
/// wins.
#[derive(Debug)]
pub struct MarkdownRenderer {
    pages: HashMap<String, PathBuf>,
}

impl MarkdownRenderer {
    /// Index the markdown files below `source_dir`.
    pub fn open(source_dir: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        collect_markdown(source_dir, &mut files)?;
        files.sort();

        let mut pages: HashMap<String, PathBuf> = HashMap::with_capacity(files.len());
        for path in files {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(existing) = pages.get(stem) {
                tracing::warn!(
                    page = stem,
                    kept = %existing.display(),
                    ignored = %path.display(),
                    "Duplicate page name"
                );
                continue;
            }
            pages.insert(stem.to_owned(), path);
        }

        tracing::debug!(pages = pages.len(), dir = %source_dir.display(), "Indexed markdown pages");
        Ok(Self { pages })
    }

    /// Number of indexed pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether no pages were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageRenderer for MarkdownRenderer {
    fn render(&self, page_name: &str) -> io::Result<Option<String>> {
        let Some(path) = self.pages.get(page_name) else {
            return Ok(None);
        };
        let markdown = match fs::read_to_string(path) {
            Ok(markdown) => markdown,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(markdown_to_html(&markdown)))
    }
}

/// Default [`RendererFactory`] producing [`MarkdownRenderer`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkdownRendererFactory;

impl RendererFactory for MarkdownRendererFactory {
    fn open(&self, source_dir: &Path) -> io::Result<Arc<dyn PageRenderer>> {
        Ok(Arc::new(MarkdownRenderer::open(source_dir)?))
    }
}

/// Convert markdown text into an HTML fragment.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;
    let parser = Parser::new_ext(markdown, options);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn collect_markdown(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_markdown(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    Ok(())
}
