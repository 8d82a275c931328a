//! Colored terminal output utilities.

use console::{Style, Term};

/// Terminal output formatter.
///
/// Status messages go to stderr, command results to stdout.
pub(crate) struct Output {
    err: Term,
    out: Term,
    red: Style,
    cyan_bold: Style,
    dim: Style,
}

impl Output {
    /// Create a new output formatter.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            err: Term::stderr(),
            out: Term::stdout(),
            red: Style::new().red(),
            cyan_bold: Style::new().cyan().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Print an info message.
    pub(crate) fn info(&self, msg: &str) {
        let _ = self.err.write_line(msg);
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.err.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Print a result line with a highlighted label and dimmed detail.
    pub(crate) fn entry(&self, indent: usize, label: &str, detail: Option<&str>) {
        let pad = "  ".repeat(indent);
        let line = match detail {
            Some(detail) => format!(
                "{pad}{} {}",
                self.cyan_bold.apply_to(label),
                self.dim.apply_to(detail)
            ),
            None => format!("{pad}{}", self.cyan_bold.apply_to(label)),
        };
        let _ = self.out.write_line(&line);
    }
}
