//! RAR/CBR containers backed by the unrar library.
//!
//! unrar only reads from a filesystem path, so sources without one are spooled into a temporary
//! file that lives as long as the parser stays open. Pages are extracted by walking the headers
//! up to the wanted entry.

use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace};
use unrar::Archive;

use crate::fs::cover::CoverSelector;
use crate::fs::source::ArchiveSource;
use crate::types::{ArchiveFormat, ComicDocument};

use super::{ArchiveError, ArchiveParser, PageStream, RawEntry, build_document, dos_timestamp};

enum Backing {
    Local(PathBuf),
    Spooled(NamedTempFile),
}

impl Backing {
    fn path(&self) -> &Path {
        match self {
            Backing::Local(path) => path,
            Backing::Spooled(file) => file.path(),
        }
    }
}

pub struct CbrParser {
    document: ComicDocument,
    backing: Option<Backing>,
    /// Header position of each page, in page order.
    positions: Vec<usize>,
}

impl CbrParser {
    pub fn open(
        source: &dyn ArchiveSource,
        selector: &CoverSelector,
    ) -> Result<Self, ArchiveError> {
        let backing = match source.local_path() {
            Some(path) => Backing::Local(path.to_path_buf()),
            None => {
                let mut spool = NamedTempFile::new()?;
                io::copy(&mut source.open()?, spool.as_file_mut())?;
                Backing::Spooled(spool)
            }
        };

        let listing = Archive::new(backing.path()).open_for_listing().map_err(rar_error)?;
        let mut raw = Vec::new();
        for (position, header) in listing.enumerate() {
            let header = header.map_err(rar_error)?;
            if !header.is_file() {
                continue;
            }
            let stamp = header.file_time;
            raw.push(RawEntry {
                name: header.filename.to_string_lossy().into_owned(),
                size_bytes: header.unpacked_size,
                compressed_size: None,
                modified_at: dos_timestamp((stamp >> 16) as u16, stamp as u16),
                key: position,
            });
        }

        let (document, positions) = build_document(source, ArchiveFormat::Rar, selector, raw)?;
        debug!(
            target: "fs::archive",
            locator = source.locator(),
            pages = document.page_count(),
            "parsed rar archive"
        );
        Ok(Self { document, backing: Some(backing), positions })
    }

    fn extract(path: &Path, position: usize) -> Result<Vec<u8>, ArchiveError> {
        let mut cursor = Archive::new(path).open_for_processing().map_err(rar_error)?;
        let mut current = 0;
        while let Some(header) = cursor.read_header().map_err(rar_error)? {
            if current == position {
                let (bytes, _rest) = header.read().map_err(rar_error)?;
                return Ok(bytes);
            }
            cursor = header.skip().map_err(rar_error)?;
            current += 1;
        }
        Err(ArchiveError::Corrupt(format!("rar entry {position} disappeared")))
    }
}

impl fmt::Debug for CbrParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbrParser")
            .field("locator", &self.document.locator())
            .field("pages", &self.positions.len())
            .field("open", &self.backing.is_some())
            .finish()
    }
}

impl ArchiveParser for CbrParser {
    fn document(&self) -> &ComicDocument {
        &self.document
    }

    fn page_stream(&mut self, index: usize) -> Result<PageStream<'_>, ArchiveError> {
        let backing = self.backing.as_ref().ok_or(ArchiveError::Closed)?;
        let position = *self
            .positions
            .get(index)
            .ok_or(ArchiveError::PageOutOfRange { index, count: self.positions.len() })?;
        trace!(target: "fs::archive", index, position, "extracting rar entry");
        let bytes = Self::extract(backing.path(), position)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn close(&mut self) {
        if self.backing.take().is_some() {
            debug!(target: "fs::archive", locator = self.document.locator(), "closed rar archive");
        }
    }

    fn is_closed(&self) -> bool {
        self.backing.is_none()
    }
}

fn rar_error(err: impl fmt::Display) -> ArchiveError {
    ArchiveError::Corrupt(err.to_string())
}
