//! Navigation tree built from per-directory manifests.
//!
//! Every directory of a site carries a [`MANIFEST_FILENAME`] file listing its
//! entries in display order, one `<token>:<title>` per line:
//!
//! ```text
//! Home:Welcome
//! guides:User Guides
//! Faq:Questions
//! ```
//!
//! A token starting with a lowercase character names a subdirectory with its
//! own manifest; any other token names a page rendered at `<token>.html`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// Name of the manifest file read from every directory.
pub const MANIFEST_FILENAME: &str = "toc.txt";

/// Node of the navigation tree.
///
/// Children keep manifest line order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    /// Subdirectory with its own entries.
    Folder {
        /// Display title.
        name: String,
        /// Entries in manifest order.
        children: Vec<Entry>,
    },
    /// Leaf page.
    Document {
        /// Display title.
        name: String,
        /// Link target (e.g., "/guides/Setup.html").
        target: String,
    },
}

impl Entry {
    /// Display title of the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name, .. } | Self::Document { name, .. } => name,
        }
    }

    /// Children of a folder; empty for documents.
    #[must_use]
    pub fn children(&self) -> &[Entry] {
        match self {
            Self::Folder { children, .. } => children,
            Self::Document { .. } => &[],
        }
    }

    /// Number of documents in this subtree.
    #[must_use]
    pub fn document_count(&self) -> usize {
        match self {
            Self::Folder { children, .. } => children.iter().map(Entry::document_count).sum(),
            Self::Document { .. } => 1,
        }
    }
}

/// Classified manifest line.
#[derive(Debug, PartialEq, Eq)]
pub enum ManifestLine<'a> {
    /// Token names a subdirectory.
    Subfolder {
        /// Directory name.
        token: &'a str,
        /// Display title.
        title: &'a str,
    },
    /// Token names a page.
    Leaf {
        /// Page name without extension.
        token: &'a str,
        /// Display title.
        title: &'a str,
    },
}

/// Error returned when the navigation tree cannot be built.
#[derive(Debug, thiserror::Error)]
pub enum TocError {
    /// Manifest file missing or unreadable.
    #[error("cannot read manifest {}", .path.display())]
    ManifestRead {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Subfolder token is not a single directory name.
    #[error("invalid folder token {token:?} in {}", .manifest.display())]
    InvalidFolder {
        /// Manifest path.
        manifest: PathBuf,
        /// Offending token.
        token: String,
    },
}

/// Classify one manifest line.
///
/// Both parts are trimmed. A line that does not split into exactly two
/// `:`-separated parts yields an empty token and an empty title, which
/// classifies as a leaf.
pub fn classify_line(line: &str) -> ManifestLine<'_> {
    let mut parts = line.split(':');
    let (token, title) = match (parts.next(), parts.next(), parts.next()) {
        (Some(token), Some(title), None) => (token.trim(), title.trim()),
        _ => ("", ""),
    };

    if token.chars().next().is_some_and(char::is_lowercase) {
        ManifestLine::Subfolder { token, title }
    } else {
        ManifestLine::Leaf { token, title }
    }
}

/// Build the navigation tree rooted at `root`.
///
/// Returns a folder named `title` whose children come from the root manifest.
/// Document targets are rooted at `/`.
pub fn build_toc(root: &Path, title: &str) -> Result<Entry, TocError> {
    let children = read_folder(root, "")?;
    Ok(Entry::Folder {
        name: title.to_owned(),
        children,
    })
}

/// Read the manifest of `dir`, recursing into subfolders.
fn read_folder(dir: &Path, base: &str) -> Result<Vec<Entry>, TocError> {
    let manifest = dir.join(MANIFEST_FILENAME);
    let content = fs::read_to_string(&manifest).map_err(|source| TocError::ManifestRead {
        path: manifest.clone(),
        source,
    })?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match classify_line(line) {
            ManifestLine::Subfolder { token, title } => {
                if !is_single_component(token) {
                    return Err(TocError::InvalidFolder {
                        manifest: manifest.clone(),
                        token: token.to_owned(),
                    });
                }
                Ok(Entry::Folder {
                    name: title.to_owned(),
                    children: read_folder(&dir.join(token), &format!("{base}/{token}"))?,
                })
            }
            ManifestLine::Leaf { token, title } => Ok(Entry::Document {
                name: title.to_owned(),
                target: format!("{base}/{token}.html"),
            }),
        })
        .collect()
}

fn is_single_component(token: &str) -> bool {
    let mut components = Path::new(token).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_manifest(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(MANIFEST_FILENAME), content).unwrap();
    }

    #[test]
    fn test_classify_line_leaf() {
        assert_eq!(
            classify_line("Intro:Introduction"),
            ManifestLine::Leaf {
                token: "Intro",
                title: "Introduction"
            }
        );
    }

    #[test]
    fn test_classify_line_subfolder() {
        assert_eq!(
            classify_line("guides:User Guides"),
            ManifestLine::Subfolder {
                token: "guides",
                title: "User Guides"
            }
        );
    }

    #[test]
    fn test_classify_line_trims_parts() {
        assert_eq!(
            classify_line("  Setup : Getting Started \r"),
            ManifestLine::Leaf {
                token: "Setup",
                title: "Getting Started"
            }
        );
    }

    #[test]
    fn test_classify_line_degenerate_lines() {
        for line in ["no separator", "a:b:c", ":"] {
            assert_eq!(
                classify_line(line),
                ManifestLine::Leaf {
                    token: "",
                    title: ""
                },
                "line {line:?}"
            );
        }
    }

    #[test]
    fn test_classify_line_digits_and_non_ascii() {
        assert!(matches!(classify_line("2024:Archive"), ManifestLine::Leaf { .. }));
        assert!(matches!(
            classify_line("été:Summer"),
            ManifestLine::Subfolder { .. }
        ));
        assert!(matches!(classify_line("Été:Summer"), ManifestLine::Leaf { .. }));
    }

    #[test]
    fn test_build_toc_document_then_folder() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "Intro:Intro\nsub:Sub");
        write_manifest(&temp_dir.path().join("sub"), "Page:Page");

        let toc = build_toc(temp_dir.path(), "Docs").unwrap();

        assert_eq!(
            toc,
            Entry::Folder {
                name: "Docs".to_owned(),
                children: vec![
                    Entry::Document {
                        name: "Intro".to_owned(),
                        target: "/Intro.html".to_owned(),
                    },
                    Entry::Folder {
                        name: "Sub".to_owned(),
                        children: vec![Entry::Document {
                            name: "Page".to_owned(),
                            target: "/sub/Page.html".to_owned(),
                        }],
                    },
                ],
            }
        );
    }

    #[test]
    fn test_build_toc_keeps_manifest_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "Zeta:Zeta\nAlpha:Alpha\nMiddle:Middle\n");

        let toc = build_toc(temp_dir.path(), "").unwrap();

        let names: Vec<_> = toc.children().iter().map(Entry::name).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Middle"]);
    }

    #[test]
    fn test_build_toc_skips_blank_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "\nHome:Home\n   \n\r\nFaq:FAQ\n");

        let toc = build_toc(temp_dir.path(), "").unwrap();

        assert_eq!(toc.children().len(), 2);
    }

    #[test]
    fn test_build_toc_degenerate_line_gives_empty_entry() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "garbage line\nHome:Home");

        let toc = build_toc(temp_dir.path(), "").unwrap();

        assert_eq!(
            toc.children()[0],
            Entry::Document {
                name: String::new(),
                target: "/.html".to_owned(),
            }
        );
        assert_eq!(toc.children()[1].name(), "Home");
    }

    #[test]
    fn test_build_toc_nested_targets() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "a:A");
        write_manifest(&temp_dir.path().join("a"), "b:B");
        write_manifest(&temp_dir.path().join("a/b"), "Deep:Deep");

        let toc = build_toc(temp_dir.path(), "").unwrap();

        let deep = &toc.children()[0].children()[0].children()[0];
        assert_eq!(
            deep,
            &Entry::Document {
                name: "Deep".to_owned(),
                target: "/a/b/Deep.html".to_owned(),
            }
        );
        assert_eq!(toc.document_count(), 1);
    }

    #[test]
    fn test_build_toc_missing_root_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();

        let err = build_toc(temp_dir.path(), "").unwrap_err();

        let expected = temp_dir.path().join(MANIFEST_FILENAME);
        assert!(matches!(err, TocError::ManifestRead { ref path, .. } if path == &expected));
    }

    #[test]
    fn test_build_toc_missing_nested_manifest() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "Home:Home\nmissing:Missing");

        let err = build_toc(temp_dir.path(), "").unwrap_err();

        assert!(matches!(
            err,
            TocError::ManifestRead { ref path, .. } if path.ends_with("missing/toc.txt")
        ));
    }

    #[test]
    fn test_build_toc_rejects_traversing_folder_token() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_manifest(temp_dir.path(), "a/../..:Escape");

        let err = build_toc(temp_dir.path(), "").unwrap_err();

        assert!(matches!(err, TocError::InvalidFolder { token, .. } if token == "a/../.."));
    }

    #[test]
    fn test_entry_serialization() {
        let entry = Entry::Folder {
            name: "Docs".to_owned(),
            children: vec![Entry::Document {
                name: "Home".to_owned(),
                target: "/Home.html".to_owned(),
            }],
        };

        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["type"], "folder");
        assert_eq!(json["name"], "Docs");
        assert_eq!(json["children"][0]["type"], "document");
        assert_eq!(json["children"][0]["target"], "/Home.html");
    }
}
