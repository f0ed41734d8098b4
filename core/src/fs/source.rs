//! Byte sources an archive can be opened from.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Readable and seekable stream handed to container parsers.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A located comic file. Implementations must be cheap to share across threads.
pub trait ArchiveSource: fmt::Debug + Send + Sync {
    /// Locator as supplied by the caller (a path or URI).
    fn locator(&self) -> &str;

    /// Stable key used when persisting metadata; defaults to the locator.
    fn canonical_locator(&self) -> String {
        self.locator().to_string()
    }

    /// Display file name including its extension.
    fn file_name(&self) -> &str;

    fn size_bytes(&self) -> io::Result<u64>;

    /// Open a fresh stream positioned at the start of the file.
    fn open(&self) -> io::Result<Box<dyn ReadSeek>>;

    /// Filesystem path when the bytes live in a local file.
    fn local_path(&self) -> Option<&Path> {
        None
    }

    /// Lowercase extension of [`ArchiveSource::file_name`].
    fn extension(&self) -> Option<String> {
        Path::new(self.file_name())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    /// File name without its extension, used as the document title.
    fn title(&self) -> String {
        Path::new(self.file_name())
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name().to_string())
    }
}

/// Comic stored on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    locator: String,
    file_name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let locator = path.to_string_lossy().into_owned();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| locator.clone());
        Self { path, locator, file_name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArchiveSource for FileSource {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn canonical_locator(&self) -> String {
        fs::canonicalize(&self.path)
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| self.locator.clone())
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size_bytes(&self) -> io::Result<u64> {
        fs::metadata(&self.path).map(|meta| meta.len())
    }

    fn open(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(&self.path)?))
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Comic held in memory, e.g. received from a content provider.
#[derive(Clone)]
pub struct MemorySource {
    locator: String,
    file_name: String,
    bytes: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let file_name = file_name.into();
        Self { locator: format!("memory://{file_name}"), file_name, bytes: bytes.into() }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("locator", &self.locator)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ArchiveSource for MemorySource {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size_bytes(&self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn open(&self) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(ArcBytes(Arc::clone(&self.bytes)))))
    }
}

struct ArcBytes(Arc<[u8]>);

impl AsRef<[u8]> for ArcBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
