//! Disk store for extracted cover images.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::types::CoverRef;

use super::{CoverStore, StoreError};

const SHARD_LEN: usize = 2;

/// Covers live under `root/<aa>/<bb>/<hash>.<ext>`, where the hash is taken over the archive
/// locator and the extension over the cover entry. An archive owns at most one cover file;
/// storing a new one replaces whatever the previous import left.
#[derive(Debug, Clone)]
pub struct DiskCoverStore {
    root: PathBuf,
}

impl DiskCoverStore {
    pub fn new(root: impl Into<PathBuf>) -> crate::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating cover directory at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, locator: &str, entry_name: &str) -> PathBuf {
        let hex = blake3::hash(locator.as_bytes()).to_hex();

        let (shard_one, remainder) = hex.as_str().split_at(SHARD_LEN);
        let (shard_two, remainder) = remainder.split_at(SHARD_LEN);
        let extension = entry_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "bin".to_string());

        self.root.join(shard_one).join(shard_two).join(format!("{remainder}.{extension}"))
    }

    pub fn read(&self, cover: &CoverRef) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(cover.as_str()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn remove(&self, cover: &CoverRef) -> Result<(), StoreError> {
        match fs::remove_file(cover.as_str()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl CoverStore for DiskCoverStore {
    fn store(&self, locator: &str, entry_name: &str, bytes: &[u8]) -> Result<CoverRef, StoreError> {
        let path = self.path_for(locator, entry_name);
        let parent = path.parent().ok_or_else(|| {
            StoreError::Backend(format!("cover path {} has no parent directory", path.display()))
        })?;
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|err| StoreError::Io(err.error))?;
        remove_stale(&path)?;

        debug!(target: "store::covers", locator, entry_name, path = %path.display(), "cover");
        Ok(CoverRef::new(path.to_string_lossy()))
    }
}

/// Delete covers of the same archive stored under another extension.
fn remove_stale(current: &Path) -> Result<(), StoreError> {
    let (Some(dir), Some(stem)) = (current.parent(), current.file_stem()) else {
        return Ok(());
    };
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path != current && path.file_stem() == Some(stem) && path.extension().is_some() {
            match fs::remove_file(&path) {
                Ok(()) => debug!(target: "store::covers", path = %path.display(), "stale cover"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
    Ok(())
}
