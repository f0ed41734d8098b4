//! Runtime configuration consumed by the importer and the reader.

use std::fs;
use std::path::Path;

use anyhow::{Context, ensure};
use serde::{Deserialize, Serialize};

use crate::fs::CoverSelector;
use crate::import::ImportLimits;
use crate::types::{CacheLimits, PrefetchPolicy};

pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 2 * 1024 * 1024 * 1024;
pub const ARCHIVE_EXTENSIONS: &[&str] = &["cbr", "cbz", "rar", "zip"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReaderConfig {
    pub max_archive_size_bytes: u64,
    pub supported_archive_extensions: Vec<String>,
    pub supported_image_extensions: Vec<String>,
    pub cache_max_entries: usize,
    pub cache_max_bytes: usize,
    pub prefetch: PrefetchPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let cache = CacheLimits::default();
        Self {
            max_archive_size_bytes: DEFAULT_MAX_ARCHIVE_SIZE,
            supported_archive_extensions: to_strings(ARCHIVE_EXTENSIONS),
            supported_image_extensions: to_strings(crate::fs::IMAGE_EXTENSIONS),
            cache_max_entries: cache.max_entries,
            cache_max_bytes: cache.max_bytes,
            prefetch: PrefetchPolicy::default(),
        }
    }
}

impl ReaderConfig {
    /// Load the configuration from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let config = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice::<Self>(&bytes)
                .with_context(|| format!("parsing config {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()));
            }
        };
        config.normalized()
    }

    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let config: Self = serde_json::from_str(raw).context("parsing config json")?;
        config.normalized()
    }

    /// Lowercase the extension sets and reject ceilings that would make every import or page
    /// request fail.
    pub fn normalized(mut self) -> crate::Result<Self> {
        ensure!(self.max_archive_size_bytes > 0, "maxArchiveSizeBytes must be positive");
        ensure!(self.cache_max_entries > 0, "cacheMaxEntries must be positive");
        ensure!(self.cache_max_bytes > 0, "cacheMaxBytes must be positive");

        for list in [&mut self.supported_archive_extensions, &mut self.supported_image_extensions]
        {
            for ext in list.iter_mut() {
                *ext = ext.trim_start_matches('.').to_ascii_lowercase();
            }
            list.sort();
            list.dedup();
        }
        ensure!(!self.supported_archive_extensions.is_empty(), "no archive extensions configured");
        ensure!(!self.supported_image_extensions.is_empty(), "no image extensions configured");
        Ok(self)
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits { max_entries: self.cache_max_entries, max_bytes: self.cache_max_bytes }
    }

    pub fn import_limits(&self) -> ImportLimits {
        ImportLimits {
            max_size_bytes: self.max_archive_size_bytes,
            supported_extensions: self.supported_archive_extensions.clone(),
        }
    }

    pub fn cover_selector(&self) -> CoverSelector {
        CoverSelector::new(self.supported_image_extensions.iter().cloned())
    }

    pub fn supports_archive(&self, ext: &str) -> bool {
        let lower = ext.to_ascii_lowercase();
        self.supported_archive_extensions.iter().any(|known| *known == lower)
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
