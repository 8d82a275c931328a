//! In-memory fetcher and archive builder for testing.
//!
//! Provides [`MemoryFetcher`] for driving fetch pipelines without network or
//! filesystem access, and [`zip_bytes`] for building small archives inline.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::fetch::{ArchiveFetcher, ArchiveStream, FetchError};

/// Fetcher serving archives from memory.
///
/// Unknown references fail with a 404 [`FetchError::Status`].
///
/// # Example
///
/// ```ignore
/// use rwiki_archive::{ArchiveFetcher, MemoryFetcher, zip_bytes};
///
/// let fetcher = MemoryFetcher::new()
///     .with_archive("mem://site", zip_bytes(&[("root/toc.txt", "Home:Home")]));
/// let stream = fetcher.fetch("mem://site").unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    archives: RwLock<HashMap<String, Vec<u8>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    /// Create an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register archive bytes for a reference.
    #[must_use]
    pub fn with_archive(self, source: &str, bytes: Vec<u8>) -> Self {
        self.set_archive(source, bytes);
        self
    }

    /// Block every fetch for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the archive served for a reference.
    pub fn set_archive(&self, source: &str, bytes: Vec<u8>) {
        self.archives
            .write()
            .unwrap()
            .insert(source.to_owned(), bytes);
    }

    /// Remove the archive for a reference so later fetches fail.
    pub fn remove_archive(&self, source: &str) {
        self.archives.write().unwrap().remove(source);
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArchiveFetcher for MemoryFetcher {
    fn fetch(&self, source: &str) -> Result<ArchiveStream, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let archives = self.archives.read().unwrap();
        let bytes = archives.get(source).ok_or_else(|| FetchError::Status {
            status: 404,
            url: source.to_owned(),
        })?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }
}

/// Build a zip archive from `(name, content)` pairs.
///
/// Names ending with `/` become directory entries.
///
/// # Panics
///
/// Panics if the in-memory writer fails.
#[must_use]
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();

    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_memory_fetcher_serves_registered_archive() {
        let fetcher = MemoryFetcher::new().with_archive("mem://a", vec![1, 2, 3]);

        let mut buf = Vec::new();
        fetcher.fetch("mem://a").unwrap().read_to_end(&mut buf).unwrap();

        assert_eq!(buf, vec![1, 2, 3]);
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn test_memory_fetcher_unknown_reference() {
        let fetcher = MemoryFetcher::new();

        let err = fetcher.fetch("mem://missing").err().unwrap();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[test]
    fn test_zip_bytes_directory_entries() {
        let bytes = zip_bytes(&[("root/", ""), ("root/page.md", "hi")]);
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert_eq!(archive.len(), 2);
    }
}
