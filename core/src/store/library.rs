//! In-memory record table behind the metadata stores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::RecordId;

use super::{ComicRecord, StoreError, UpsertRequest};

/// Record table shared by the memory and JSON stores.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Library {
    next_id: u64,
    records: BTreeMap<String, ComicRecord>,
}

impl Library {
    pub fn upsert(&mut self, request: UpsertRequest) -> RecordId {
        if let Some(record) = self.records.get_mut(&request.path) {
            record.title = request.title;
            record.cover_ref = request.cover_ref;
            record.page_count = request.page_count;
            record.size_bytes = request.size_bytes;
            record.format = request.format;
            record.imported_at = request.timestamp;
            if record.last_page.is_some_and(|page| page >= record.page_count) {
                record.last_page = record.page_count.checked_sub(1);
            }
            return record.id;
        }

        self.next_id += 1;
        let id = RecordId(self.next_id);
        let record = ComicRecord {
            id,
            path: request.path.clone(),
            title: request.title,
            cover_ref: request.cover_ref,
            page_count: request.page_count,
            size_bytes: request.size_bytes,
            format: request.format,
            imported_at: request.timestamp,
            favorite: false,
            rating: None,
            last_page: None,
        };
        self.records.insert(request.path, record);
        id
    }

    pub fn lookup(&self, path: &str) -> Option<ComicRecord> {
        self.records.get(path).cloned()
    }

    pub fn record_progress(&mut self, path: &str, page: usize) -> Result<(), StoreError> {
        let record =
            self.records.get_mut(path).ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        record.last_page = Some(page.min(record.page_count.saturating_sub(1)));
        Ok(())
    }

    pub fn records(&self) -> impl Iterator<Item = &ComicRecord> {
        self.records.values()
    }

    pub fn record_mut(&mut self, path: &str) -> Option<&mut ComicRecord> {
        self.records.get_mut(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
