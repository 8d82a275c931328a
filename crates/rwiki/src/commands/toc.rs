//! `rwiki toc` command implementation.

use std::path::PathBuf;

use clap::Args;
use rwiki_config::{CliSettings, Config};
use rwiki_server::engine_config;
use rwiki_site::{Engine, Entry};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the toc command.
#[derive(Args)]
pub(crate) struct TocArgs {
    /// Path to configuration file (default: auto-discover rwiki.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive URL or file path (overrides config).
    #[arg(short, long, env = "RWIKI_SOURCE")]
    source: Option<String>,

    /// Keep the archive's top-level directory.
    #[arg(long)]
    no_strip_root: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl TocArgs {
    /// Fetch the archive once and print its navigation tree.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            source: self.source,
            strip_root: self.no_strip_root.then_some(false),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let source = config.require_source()?;

        let engine = Engine::spawn(engine_config(&config, source));
        let generation = engine.refresh().await?;
        let Some(toc) = engine.toc().await else {
            return Err(CliError::Server("engine stopped after refresh".to_owned()));
        };

        output.info(&format!(
            "Loaded {source} (generation {generation}, {} documents)",
            toc.document_count()
        ));
        for line in tree_lines(&toc) {
            output.entry(line.depth, &line.label, line.target.as_deref());
        }
        Ok(())
    }
}

/// One printed row of the navigation tree.
#[derive(Debug, PartialEq)]
struct TreeLine {
    depth: usize,
    label: String,
    target: Option<String>,
}

/// Flatten the tree depth-first, root first.
fn tree_lines(root: &Entry) -> Vec<TreeLine> {
    let mut lines = Vec::new();
    push_lines(root, 0, &mut lines);
    lines
}

fn push_lines(entry: &Entry, depth: usize, lines: &mut Vec<TreeLine>) {
    match entry {
        Entry::Folder { name, children } => {
            lines.push(TreeLine {
                depth,
                label: format!("{name}/"),
                target: None,
            });
            for child in children {
                push_lines(child, depth + 1, lines);
            }
        }
        Entry::Document { name, target } => lines.push(TreeLine {
            depth,
            label: name.clone(),
            target: Some(target.clone()),
        }),
    }
}
