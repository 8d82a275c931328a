//! HTML layout wrapped around rendered page bodies.

use std::fmt::Write;

use crate::toc::Entry;

/// Wraps rendered bodies into complete HTML documents.
pub trait PageTemplate: Send + Sync {
    /// Wrap a rendered page body with the site layout.
    fn wrap_page(&self, body: &str, toc: &Entry) -> String;

    /// Render the site index from the navigation tree.
    fn render_index(&self, toc: &Entry) -> String;
}

/// Plain HTML layout with a navigation sidebar.
#[derive(Clone, Debug)]
pub struct HtmlTemplate {
    title: String,
}

impl HtmlTemplate {
    /// Create a template using `title` for the document title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    fn document(&self, toc: &Entry, content: &str) -> String {
        let mut html = String::with_capacity(4096 + content.len());

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("<meta charset=\"utf-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        let _ = writeln!(html, "<title>{}</title>", escape_html(&self.title));
        html.push_str("</head>\n<body>\n");

        html.push_str("<aside class=\"sidebar\">\n");
        let _ = writeln!(
            html,
            "<a href=\"/\" class=\"site-title\">{}</a>",
            escape_html(toc.name())
        );
        html.push_str("<nav>\n");
        render_nav(&mut html, toc.children());
        html.push_str("</nav>\n</aside>\n");

        html.push_str("<main>\n<article>\n");
        html.push_str(content);
        html.push_str("\n</article>\n</main>\n");
        html.push_str("</body>\n</html>");
        html
    }
}

impl Default for HtmlTemplate {
    fn default() -> Self {
        Self::new("Documentation")
    }
}

impl PageTemplate for HtmlTemplate {
    fn wrap_page(&self, body: &str, toc: &Entry) -> String {
        self.document(toc, body)
    }

    fn render_index(&self, toc: &Entry) -> String {
        let mut content = String::new();
        let _ = writeln!(content, "<h1>{}</h1>", escape_html(toc.name()));
        if toc.children().is_empty() {
            content.push_str("<p>No pages.</p>");
        } else {
            render_nav(&mut content, toc.children());
        }
        self.document(toc, &content)
    }
}

/// Render entries as nested lists.
fn render_nav(html: &mut String, entries: &[Entry]) {
    if entries.is_empty() {
        return;
    }
    html.push_str("<ul>\n");
    for entry in entries {
        match entry {
            Entry::Document { name, target } => {
                let _ = writeln!(
                    html,
                    "<li><a href=\"{}\">{}</a></li>",
                    escape_html(target),
                    escape_html(name)
                );
            }
            Entry::Folder { name, children } => {
                let _ = writeln!(html, "<li><span class=\"folder\">{}</span>", escape_html(name));
                render_nav(html, children);
                html.push_str("</li>\n");
            }
        }
    }
    html.push_str("</ul>\n");
}

/// Escape text for HTML element content and attribute values.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
