//! Persistence seams used by the importer: library metadata and cover images.

pub mod covers;
mod library;
pub mod memory;
pub mod json;

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ArchiveFormat, CoverRef, RecordId};

pub use covers::DiskCoverStore;
pub use json::JsonStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no record for {0}")]
    NotFound(String),
    #[error("storage backend failed: {0}")]
    Backend(String),
    #[error("storage io: {0}")]
    Io(#[from] io::Error),
    #[error("malformed library file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Metadata written for one imported comic. `path` is the canonical locator and is the upsert
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    pub path: String,
    pub title: String,
    pub cover_ref: Option<CoverRef>,
    pub page_count: usize,
    pub size_bytes: u64,
    pub format: ArchiveFormat,
    /// Unix seconds of the import.
    pub timestamp: i64,
}

/// Stored library row. Import-derived fields are replaced on every upsert; `favorite`, `rating`
/// and `last_page` belong to the reader and survive re-imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicRecord {
    pub id: RecordId,
    pub path: String,
    pub title: String,
    pub cover_ref: Option<CoverRef>,
    pub page_count: usize,
    pub size_bytes: u64,
    pub format: ArchiveFormat,
    pub imported_at: i64,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub last_page: Option<usize>,
}

pub trait MetadataStore: fmt::Debug + Send + Sync {
    /// Insert or update the record keyed by `request.path`, returning its id.
    fn upsert(&self, request: UpsertRequest) -> Result<RecordId, StoreError>;

    fn lookup(&self, path: &str) -> Result<Option<ComicRecord>, StoreError>;

    /// Remember the last page read for an imported comic.
    fn record_progress(&self, path: &str, page: usize) -> Result<(), StoreError>;
}

pub trait CoverStore: fmt::Debug + Send + Sync {
    /// Persist the cover bytes of `entry_name` inside the archive at `locator`.
    fn store(&self, locator: &str, entry_name: &str, bytes: &[u8]) -> Result<CoverRef, StoreError>;
}
