//! ZIP/CBZ containers.

use std::fmt;

use tracing::{debug, trace};
use zip::read::ZipArchive;
use zip::result::ZipError;

use crate::fs::cover::CoverSelector;
use crate::fs::encoding::decode_entry_name;
use crate::fs::source::{ArchiveSource, ReadSeek};
use crate::types::{ArchiveFormat, ComicDocument};

use super::{ArchiveError, ArchiveParser, PageStream, RawEntry, build_document, dos_timestamp};

/// Parser for zip-family comics. Holds the central directory open until [`ArchiveParser::close`].
pub struct CbzParser {
    document: ComicDocument,
    archive: Option<ZipArchive<Box<dyn ReadSeek>>>,
    /// Zip index for each page, in page order.
    indices: Vec<usize>,
}

impl CbzParser {
    pub fn open(
        source: &dyn ArchiveSource,
        selector: &CoverSelector,
    ) -> Result<Self, ArchiveError> {
        let reader = source.open()?;
        let mut archive = ZipArchive::new(reader).map_err(zip_error)?;

        let mut raw = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let file = archive.by_index_raw(idx).map_err(zip_error)?;
            if file.is_dir() {
                continue;
            }
            let modified = file.last_modified();
            raw.push(RawEntry {
                name: decode_entry_name(file.name_raw()).into_owned(),
                size_bytes: file.size(),
                compressed_size: Some(file.compressed_size()),
                modified_at: dos_timestamp(modified.datepart(), modified.timepart()),
                key: idx,
            });
        }

        let (document, indices) = build_document(source, ArchiveFormat::Zip, selector, raw)?;
        debug!(
            target: "fs::archive",
            locator = source.locator(),
            pages = document.page_count(),
            "parsed zip archive"
        );
        Ok(Self { document, archive: Some(archive), indices })
    }
}

impl fmt::Debug for CbzParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbzParser")
            .field("locator", &self.document.locator())
            .field("pages", &self.indices.len())
            .field("open", &self.archive.is_some())
            .finish()
    }
}

impl ArchiveParser for CbzParser {
    fn document(&self) -> &ComicDocument {
        &self.document
    }

    fn page_stream(&mut self, index: usize) -> Result<PageStream<'_>, ArchiveError> {
        let archive = self.archive.as_mut().ok_or(ArchiveError::Closed)?;
        let zip_index = *self
            .indices
            .get(index)
            .ok_or(ArchiveError::PageOutOfRange { index, count: self.indices.len() })?;
        trace!(target: "fs::archive", index, zip_index, "streaming zip entry");
        let file = archive.by_index(zip_index).map_err(zip_error)?;
        Ok(Box::new(file))
    }

    fn close(&mut self) {
        if self.archive.take().is_some() {
            debug!(target: "fs::archive", locator = self.document.locator(), "closed zip archive");
        }
    }

    fn is_closed(&self) -> bool {
        self.archive.is_none()
    }
}

fn zip_error(err: ZipError) -> ArchiveError {
    match err {
        ZipError::Io(io) => ArchiveError::Io(io),
        other => ArchiveError::Corrupt(other.to_string()),
    }
}
