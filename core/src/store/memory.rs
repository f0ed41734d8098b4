//! Volatile metadata store, used by tests and embedders without persistence.

use parking_lot::Mutex;

use crate::types::RecordId;

use super::library::Library;
use super::{ComicRecord, MetadataStore, StoreError, UpsertRequest};

#[derive(Debug, Default)]
pub struct MemoryStore {
    library: Mutex<Library>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.library.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records ordered by path.
    pub fn records(&self) -> Vec<ComicRecord> {
        self.library.lock().records().cloned().collect()
    }

    /// Apply a reader-side edit (favorite, rating) to an existing record.
    pub fn update<F>(&self, path: &str, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ComicRecord),
    {
        let mut library = self.library.lock();
        let record = library.record_mut(path).ok_or_else(|| StoreError::NotFound(path.into()))?;
        edit(record);
        Ok(())
    }
}

impl MetadataStore for MemoryStore {
    fn upsert(&self, request: UpsertRequest) -> Result<RecordId, StoreError> {
        Ok(self.library.lock().upsert(request))
    }

    fn lookup(&self, path: &str) -> Result<Option<ComicRecord>, StoreError> {
        Ok(self.library.lock().lookup(path))
    }

    fn record_progress(&self, path: &str, page: usize) -> Result<(), StoreError> {
        self.library.lock().record_progress(path, page)
    }
}
