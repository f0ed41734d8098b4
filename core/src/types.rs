//! Shared data structures exchanged between the parser, importer, and reader layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Container family of a comic archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

impl ArchiveFormat {
    /// Map a lowercase or mixed-case file extension onto its container family.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "zip" | "cbz" => Some(Self::Zip),
            "rar" | "cbr" => Some(Self::Rar),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Rar => "rar",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image entry inside an archive, after filtering and natural ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub size_bytes: u64,
    /// `None` when the container does not report packed sizes.
    pub compressed_size: Option<u64>,
    /// Seconds since the Unix epoch, when the container records a timestamp.
    pub modified_at: Option<i64>,
    pub ordinal: usize,
}

/// Parsed view of a comic archive. Produced once per parse and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComicDocument {
    title: String,
    entries: Vec<ArchiveEntry>,
    cover: Option<usize>,
    locator: String,
    format: ArchiveFormat,
}

impl ComicDocument {
    /// Build a document from entries that are already naturally ordered.
    ///
    /// Ordinals are reassigned from the entry positions and an out-of-range cover index is
    /// dropped, so the designated cover is always one of the document's entries.
    pub fn new(
        title: impl Into<String>,
        locator: impl Into<String>,
        format: ArchiveFormat,
        mut entries: Vec<ArchiveEntry>,
        cover: Option<usize>,
    ) -> Self {
        for (ordinal, entry) in entries.iter_mut().enumerate() {
            entry.ordinal = ordinal;
        }
        let cover = cover.filter(|index| *index < entries.len());
        Self { title: title.into(), entries, cover, locator: locator.into(), format }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ArchiveEntry> {
        self.entries.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cover_index(&self) -> Option<usize> {
        self.cover
    }

    pub fn cover_entry(&self) -> Option<&ArchiveEntry> {
        self.cover.and_then(|index| self.entries.get(index))
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }
}

/// Identifier handed out by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to a stored cover image (a path for the disk store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverRef(String);

impl CoverRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Ceilings enforced by the page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self { max_entries: 8, max_bytes: 50 * 1024 * 1024 }
    }
}

/// How many neighbouring pages the reader warms around the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchPolicy {
    pub ahead: u32,
    pub behind: u32,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self { ahead: 2, behind: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            size_bytes: 4,
            compressed_size: None,
            modified_at: None,
            ordinal: 99,
        }
    }

    #[test]
    fn document_reassigns_ordinals() {
        let doc = ComicDocument::new(
            "demo",
            "/tmp/demo.cbz",
            ArchiveFormat::Zip,
            vec![entry("1.jpg"), entry("2.jpg")],
            Some(1),
        );
        let ordinals: Vec<usize> = doc.entries().iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
        assert_eq!(doc.cover_entry().map(|e| e.name.as_str()), Some("2.jpg"));
    }

    #[test]
    fn document_drops_foreign_cover() {
        let entries = vec![entry("1.jpg")];
        let doc = ComicDocument::new("demo", "demo.cbz", ArchiveFormat::Zip, entries, Some(4));
        assert!(doc.cover_entry().is_none());
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(ArchiveFormat::from_extension("CBZ"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_extension("cbr"), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_extension("7z"), None);
    }
}
