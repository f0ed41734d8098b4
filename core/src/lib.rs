//! Core of a comic archive reader: archive parsing with natural page order and cover selection,
//! a cancellable import pipeline, and a memory-bounded page cache for reading.

#![deny(missing_debug_implementations)]

pub mod cache;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod fs;
pub mod import;
pub mod log;
pub mod reader;
pub mod stats;
pub mod store;
pub mod types;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

pub use cancel::CancelToken;
pub use config::ReaderConfig;
pub use import::{
    BatchOutcome, BatchRun, FailureReason, ImportLane, ImportOutcome, ImportPipeline, ImportRun,
    ImportState, ProgressEvent,
};
pub use reader::{ReaderSession, SessionError};
pub use types::{
    ArchiveEntry, ArchiveFormat, CacheLimits, ComicDocument, CoverRef, ImageDimensions,
    PrefetchPolicy, RecordId,
};

/// Version of the core crate, for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_semver_version() {
        assert!(version().contains('.'));
    }
}
