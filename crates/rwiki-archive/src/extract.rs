//! Zip extraction into ephemeral directories.
//!
//! [`Extractor`] spools an archive stream into a temporary file, then decodes
//! each entry into a freshly created [`TempDir`]. Entry bytes are copied in
//! [`CHUNK_SIZE`] chunks so no entry is ever held in memory as a whole.
//!
//! Destination paths are derived from the entry name only. Every segment must
//! be a plain path component, so an entry can never land outside the output
//! directory.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir};

/// Buffer size for spooling and entry copies.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Error returned when an archive cannot be extracted.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Archive is not a readable zip file.
    #[error("malformed archive")]
    Zip(#[from] zip::result::ZipError),

    /// I/O failure while spooling or writing entries.
    #[error("I/O error during extraction")]
    Io(#[from] io::Error),

    /// Entry name would resolve outside the output directory.
    #[error("archive entry escapes the output directory: {0}")]
    UnsafeEntry(String),
}

/// Unpacks archive streams into ephemeral directories.
#[derive(Clone, Debug, Default)]
pub struct Extractor {
    work_dir: Option<PathBuf>,
}

impl Extractor {
    /// Create an extractor using the system temporary directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor placing temporary files and directories in `work_dir`.
    #[must_use]
    pub fn in_dir(work_dir: PathBuf) -> Self {
        Self {
            work_dir: Some(work_dir),
        }
    }

    /// Spool `reader` into a temporary file and unpack it.
    ///
    /// The temporary archive file is deleted before this returns.
    pub fn extract(&self, reader: impl Read, strip_root: bool) -> Result<TempDir, ExtractError> {
        let spooled = self.spool(reader)?;
        self.unpack(spooled, strip_root)
    }

    /// Copy an archive stream into a named temporary file.
    ///
    /// Errors come from reading the stream or writing the file, so callers
    /// reading from a network stream see transport failures here.
    pub fn spool(&self, mut reader: impl Read) -> io::Result<NamedTempFile> {
        let builder = {
            let mut builder = Builder::new();
            builder.prefix("rwiki-archive-").suffix(".zip");
            builder
        };
        let mut spooled = match &self.work_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let bytes = copy_chunked(&mut reader, spooled.as_file_mut())?;
        spooled.as_file_mut().flush()?;
        tracing::debug!(bytes, path = %spooled.path().display(), "Archive spooled");

        Ok(spooled)
    }

    /// Unpack a spooled archive into a new ephemeral directory.
    ///
    /// Consumes the spooled file so it is removed whether decoding succeeds or
    /// fails. On failure the partially written directory is removed as well.
    pub fn unpack(
        &self,
        spooled: NamedTempFile,
        strip_root: bool,
    ) -> Result<TempDir, ExtractError> {
        let builder = {
            let mut builder = Builder::new();
            builder.prefix("rwiki-site-");
            builder
        };
        let out_dir = match &self.work_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };

        let archive = spooled.reopen()?;
        let written = unpack_into(archive, out_dir.path(), strip_root)?;
        tracing::info!(
            files = written,
            strip_root,
            dir = %out_dir.path().display(),
            "Archive extracted"
        );

        Ok(out_dir)
    }
}

/// Decode every file entry of `archive` into `out_dir`.
///
/// Directory entries are skipped; directories are created on demand for the
/// files they contain. Entries mapping to the same destination overwrite each
/// other in archive order. Returns the number of files written.
pub fn unpack_into(archive: File, out_dir: &Path, strip_root: bool) -> Result<usize, ExtractError> {
    let mut archive = zip::ZipArchive::new(archive)?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_owned();
        let Some(relative) = entry_destination(&name, strip_root)? else {
            tracing::debug!(entry = %name, "Skipping entry without a destination");
            continue;
        };

        let dest = out_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        copy_chunked(&mut entry, &mut out)?;
        written += 1;
    }

    Ok(written)
}

/// Compute the destination of an entry relative to the output directory.
///
/// Drops the first segment when `strip_root` is set. Returns `Ok(None)` when
/// nothing remains (a root-level entry with `strip_root`), and
/// [`ExtractError::UnsafeEntry`] when a segment is not a plain component
/// (`..`, `.`, an absolute path or a drive prefix).
pub fn entry_destination(name: &str, strip_root: bool) -> Result<Option<PathBuf>, ExtractError> {
    if name.starts_with('/') {
        return Err(ExtractError::UnsafeEntry(name.to_owned()));
    }

    let mut segments = name.split('/').filter(|s| !s.is_empty());
    if strip_root {
        segments.next();
    }

    let mut relative = PathBuf::new();
    for segment in segments {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return Err(ExtractError::UnsafeEntry(name.to_owned())),
        }
    }

    Ok((!relative.as_os_str().is_empty()).then_some(relative))
}

/// Copy `reader` into `writer` through a fixed [`CHUNK_SIZE`] buffer.
fn copy_chunked(reader: &mut impl Read, writer: &mut impl Write) -> io::Result<u64> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}
