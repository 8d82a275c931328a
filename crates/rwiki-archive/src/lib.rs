//! Archive fetching and extraction for rwiki.
//!
//! This crate turns a source reference into a directory of documentation
//! sources in two steps:
//!
//! - [`ArchiveFetcher`]: opens a byte stream for a reference ([`HttpFetcher`]
//!   for `http(s)://`, [`FileFetcher`] for local paths, [`SourceFetcher`] to
//!   pick between them)
//! - [`Extractor`]: spools the stream to a temporary file and unpacks the zip
//!   entries into a fresh ephemeral directory
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use rwiki_archive::{ArchiveFetcher, Extractor, SourceFetcher};
//!
//! let fetcher = SourceFetcher::default();
//! let stream = fetcher.fetch("https://example.com/wiki/archive/main.zip")?;
//! let dir = Extractor::new().extract(stream, true)?;
//! println!("sources in {}", dir.path().display());
//! # Ok(())
//! # }
//! ```

mod extract;
mod fetch;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use extract::{CHUNK_SIZE, ExtractError, Extractor, entry_destination, unpack_into};
pub use fetch::{ArchiveFetcher, ArchiveStream, FetchError, FileFetcher, HttpFetcher, SourceFetcher};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MemoryFetcher, zip_bytes};
