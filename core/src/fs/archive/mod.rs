//! Container parsing: one [`ArchiveParser`] per archive family, chosen by extension.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Component, Path};

use thiserror::Error;
use tracing::debug;

use crate::types::{ArchiveEntry, ArchiveFormat, ComicDocument};

use super::cover::CoverSelector;
use super::natural::natural_cmp;
use super::source::ArchiveSource;

mod cbz;
#[cfg(feature = "rar")]
mod cbr;

#[cfg(feature = "rar")]
pub use cbr::CbrParser;
pub use cbz::CbzParser;

/// Single-use byte stream for one page. Dropping it releases the underlying entry.
pub type PageStream<'a> = Box<dyn Read + 'a>;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    #[error("archive contains no image pages")]
    Empty,
    #[error("corrupt archive: {0}")]
    Corrupt(String),
    #[error("page {index} out of range (page count {count})")]
    PageOutOfRange { index: usize, count: usize },
    #[error("archive handle already closed")]
    Closed,
    #[error("reading archive: {0}")]
    Io(#[from] io::Error),
}

/// Open container exposing its image pages in natural order.
pub trait ArchiveParser: fmt::Debug + Send {
    fn document(&self) -> &ComicDocument;

    fn page_count(&self) -> usize {
        self.document().page_count()
    }

    /// Stream the raw bytes of the page at `index`. The caller must consume and drop the stream
    /// before requesting another page.
    fn page_stream(&mut self, index: usize) -> Result<PageStream<'_>, ArchiveError>;

    /// Release the container handle. Calling it more than once is a no-op.
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// Read a whole page into memory.
    fn read_page(&mut self, index: usize) -> Result<Vec<u8>, ArchiveError> {
        let size_hint = self.document().entry(index).map(|e| e.size_bytes).unwrap_or(0);
        let mut stream = self.page_stream(index)?;
        let mut bytes = Vec::with_capacity(size_hint.min(64 * 1024 * 1024) as usize);
        stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Opens a parser for a source.
pub trait ParserFactory: fmt::Debug + Send + Sync {
    fn open(&self, source: &dyn ArchiveSource) -> Result<Box<dyn ArchiveParser>, ArchiveError>;
}

/// Default factory dispatching on the source's file extension.
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    selector: CoverSelector,
}

impl FormatRegistry {
    pub fn new(selector: CoverSelector) -> Self {
        Self { selector }
    }

    pub fn detect(source: &dyn ArchiveSource) -> Result<ArchiveFormat, ArchiveError> {
        let ext = source.extension().unwrap_or_default();
        ArchiveFormat::from_extension(&ext).ok_or(ArchiveError::UnsupportedFormat(ext))
    }
}

impl ParserFactory for FormatRegistry {
    fn open(&self, source: &dyn ArchiveSource) -> Result<Box<dyn ArchiveParser>, ArchiveError> {
        let format = Self::detect(source)?;
        debug!(target: "fs::archive", locator = source.locator(), %format, "opening archive");
        match format {
            ArchiveFormat::Zip => Ok(Box::new(CbzParser::open(source, &self.selector)?)),
            #[cfg(feature = "rar")]
            ArchiveFormat::Rar => Ok(Box::new(CbrParser::open(source, &self.selector)?)),
            #[cfg(not(feature = "rar"))]
            ArchiveFormat::Rar => Err(ArchiveError::UnsupportedFormat(format.to_string())),
        }
    }
}

/// Raw entry reported by a container, before filtering.
#[derive(Debug, Clone)]
pub(crate) struct RawEntry<K> {
    pub name: String,
    pub size_bytes: u64,
    pub compressed_size: Option<u64>,
    pub modified_at: Option<i64>,
    /// Container-specific handle used to stream the entry later.
    pub key: K,
}

/// Shared parsing protocol: drop unsafe, hidden and non-image names, keep the last entry for a
/// duplicated name, order naturally, and pick the cover.
pub(crate) fn build_document<K>(
    source: &dyn ArchiveSource,
    format: ArchiveFormat,
    selector: &CoverSelector,
    raw: Vec<RawEntry<K>>,
) -> Result<(ComicDocument, Vec<K>), ArchiveError> {
    let mut by_name: HashMap<String, RawEntry<K>> = HashMap::new();
    for entry in raw {
        let Some(name) = sanitize_entry_name(&entry.name) else {
            continue;
        };
        if is_hidden(&name) || !selector.is_image_file(&name) {
            continue;
        }
        by_name.insert(name.clone(), RawEntry { name, ..entry });
    }

    if by_name.is_empty() {
        return Err(ArchiveError::Empty);
    }

    let mut kept: Vec<RawEntry<K>> = by_name.into_values().collect();
    kept.sort_by(|a, b| natural_cmp(&a.name, &b.name).then_with(|| a.name.cmp(&b.name)));

    let names: Vec<&str> = kept.iter().map(|entry| entry.name.as_str()).collect();
    let cover = selector.select_cover(&names);

    let mut keys = Vec::with_capacity(kept.len());
    let entries = kept
        .into_iter()
        .enumerate()
        .map(|(ordinal, raw)| {
            keys.push(raw.key);
            ArchiveEntry {
                name: raw.name,
                size_bytes: raw.size_bytes,
                compressed_size: raw.compressed_size,
                modified_at: raw.modified_at,
                ordinal,
            }
        })
        .collect();

    let document = ComicDocument::new(source.title(), source.locator(), format, entries, cover);
    Ok((document, keys))
}

/// Normalise separators and reject absolute or parent-escaping names.
pub(crate) fn sanitize_entry_name(raw: &str) -> Option<String> {
    let unified = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    if parts.is_empty() { None } else { Some(parts.join("/")) }
}

fn is_hidden(name: &str) -> bool {
    name.split('/').any(|part| part.starts_with('.') || part == "__MACOSX")
}

/// Convert an MS-DOS packed date/time into Unix seconds.
pub(crate) fn dos_timestamp(dos_date: u16, dos_time: u16) -> Option<i64> {
    let year = 1980 + i32::from(dos_date >> 9);
    let month = time::Month::try_from(((dos_date >> 5) & 0x0f) as u8).ok()?;
    let day = (dos_date & 0x1f) as u8;
    let hour = (dos_time >> 11) as u8;
    let minute = ((dos_time >> 5) & 0x3f) as u8;
    let second = ((dos_time & 0x1f) * 2) as u8;

    let calendar = time::Date::from_calendar_date(year, month, day).ok()?;
    let clock = time::Time::from_hms(hour, minute, second.min(59)).ok()?;
    Some(time::PrimitiveDateTime::new(calendar, clock).assume_utc().unix_timestamp())
}
