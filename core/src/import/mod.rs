//! Importing comic archives into the library.
//!
//! [`ImportPipeline::run`] yields a lazily driven [`ImportRun`] per file, [`BatchRun`] chains runs
//! sequentially, and [`ImportLane`] executes either on a dedicated worker thread.

pub mod batch;
pub mod lane;
pub mod pipeline;
pub mod state;

use crate::config::{ARCHIVE_EXTENSIONS, DEFAULT_MAX_ARCHIVE_SIZE};

pub use batch::BatchRun;
pub use lane::{BatchStream, ImportLane, ProgressStream};
pub use pipeline::{ImportPipeline, ImportRun};
pub use state::{
    BatchEvent, BatchOutcome, BatchStatus, FailureReason, ImportFailure, ImportNotice,
    ImportOutcome, ImportState, ImportSummary, ProgressEvent,
};

/// Validation ceilings applied before an archive is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLimits {
    pub max_size_bytes: u64,
    /// Lowercase extensions without the leading dot.
    pub supported_extensions: Vec<String>,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_ARCHIVE_SIZE,
            supported_extensions: ARCHIVE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

impl ImportLimits {
    pub fn supports(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.supported_extensions.iter().any(|known| known.eq_ignore_ascii_case(extension))
    }
}
