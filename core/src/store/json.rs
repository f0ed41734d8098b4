//! Library metadata persisted as a single JSON document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use directories::ProjectDirs;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::RecordId;

use super::library::Library;
use super::{ComicRecord, MetadataStore, StoreError, UpsertRequest};

const APP_QUALIFIER: &str = "com";
const APP_ORGANISATION: &str = "ComicCore";
const APP_NAME: &str = "comic-core";
const LIBRARY_FILE: &str = "library.json";

/// File-backed store. The whole library is kept in memory and rewritten atomically after every
/// mutation.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    library: Mutex<Library>,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        let library = read_file(&path)
            .with_context(|| format!("loading library from {}", path.display()))?;
        debug!(
            target: "store::json",
            path = %path.display(),
            records = library.len(),
            "opened library"
        );
        Ok(Self { path, library: Mutex::new(library) })
    }

    /// Open the library in the per-user data directory.
    pub fn open_default() -> crate::Result<Self> {
        let dir = ProjectDirs::from(APP_QUALIFIER, APP_ORGANISATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("state"))
            .ok_or_else(|| anyhow!("unable to resolve application data directory"))?;
        Self::open(dir.join(LIBRARY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Vec<ComicRecord> {
        self.library.lock().records().cloned().collect()
    }

    pub fn update<F>(&self, path: &str, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ComicRecord),
    {
        self.mutate(|library| {
            let record =
                library.record_mut(path).ok_or_else(|| StoreError::NotFound(path.into()))?;
            edit(record);
            Ok(())
        })
    }

    /// Apply `change` to a copy of the library and commit it only once the file write succeeds.
    fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Library) -> Result<T, StoreError>,
    {
        let mut guard = self.library.lock();
        let mut next = guard.clone();
        let value = change(&mut next)?;
        write_file(&self.path, &next)?;
        *guard = next;
        Ok(value)
    }
}

impl MetadataStore for JsonStore {
    fn upsert(&self, request: UpsertRequest) -> Result<RecordId, StoreError> {
        self.mutate(|library| Ok(library.upsert(request)))
    }

    fn lookup(&self, path: &str) -> Result<Option<ComicRecord>, StoreError> {
        Ok(self.library.lock().lookup(path))
    }

    fn record_progress(&self, path: &str, page: usize) -> Result<(), StoreError> {
        self.mutate(|library| library.record_progress(path, page))
    }
}

fn read_file(path: &Path) -> Result<Library, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Library::default()),
        Err(err) => Err(err.into()),
    }
}

fn write_file(path: &Path, library: &Library) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| {
        StoreError::Backend(format!("library path {} has no parent directory", path.display()))
    })?;
    fs::create_dir_all(parent)?;
    let data = serde_json::to_vec_pretty(library)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(&data)?;
    temp.flush()?;
    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}
