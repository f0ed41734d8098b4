//! An open comic with a bounded cache of decoded pages.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::cache::{CacheState, PageCache};
use crate::cancel::CancelToken;
use crate::codec::{DecodedImage, PageDecoder, RasterDecoder};
use crate::config::ReaderConfig;
use crate::fs::{ArchiveError, ArchiveParser, ArchiveSource, FormatRegistry, ParserFactory};
use crate::stats::ReaderStats;
use crate::types::{ComicDocument, PrefetchPolicy};

use super::prefetch;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("page {index} out of range (page count {count})")]
    OutOfRange { index: usize, count: usize },
    #[error("decoding page {index} ({name}): {message}")]
    Decode { index: usize, name: String, message: String },
    #[error("page request cancelled")]
    Cancelled,
    #[error("reader session closed")]
    Closed,
}

/// Serves decoded pages of one archive. Archive reads are serialised on the parser handle while
/// decoding runs outside every lock, so concurrent requests for different pages overlap.
#[derive(Debug)]
pub struct ReaderSession {
    document: ComicDocument,
    parser: Mutex<Box<dyn ArchiveParser>>,
    decoder: Arc<dyn PageDecoder>,
    cache: PageCache,
    prefetch: PrefetchPolicy,
    stats: Option<Arc<ReaderStats>>,
    closed: AtomicBool,
}

impl ReaderSession {
    /// Open `source` with the default parsers and decoder.
    pub fn open(source: &dyn ArchiveSource, config: &ReaderConfig) -> Result<Self, SessionError> {
        let registry = FormatRegistry::new(config.cover_selector());
        let parser = registry.open(source)?;
        Ok(Self::from_parser(parser, Arc::new(RasterDecoder), config))
    }

    pub fn from_parser(
        parser: Box<dyn ArchiveParser>,
        decoder: Arc<dyn PageDecoder>,
        config: &ReaderConfig,
    ) -> Self {
        let document = parser.document().clone();
        debug!(
            target: "reader::session",
            locator = document.locator(),
            pages = document.page_count(),
            "session opened"
        );
        Self {
            document,
            parser: Mutex::new(parser),
            decoder,
            cache: PageCache::new(config.cache_limits()),
            prefetch: config.prefetch,
            stats: None,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_stats(mut self, stats: Arc<ReaderStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn document(&self) -> &ComicDocument {
        &self.document
    }

    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn cache_state(&self) -> CacheState {
        self.cache.state()
    }

    /// Pages currently held in the cache, ascending.
    pub fn resident_pages(&self) -> Vec<usize> {
        let mut pages = self.cache.resident_indices();
        pages.sort_unstable();
        pages
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn request_page(&self, index: usize) -> Result<Arc<DecodedImage>, SessionError> {
        self.request_page_with(index, &CancelToken::new())
    }

    /// Return page `index`, decoding it on a cache miss. The page becomes the focus that
    /// eviction and prefetching are measured from.
    pub fn request_page_with(
        &self,
        index: usize,
        cancel: &CancelToken,
    ) -> Result<Arc<DecodedImage>, SessionError> {
        self.check(index, cancel)?;
        let cached = self.cache.get(index);
        self.record(|stats| stats.record_cache_lookup(cached.is_some()));
        if let Some(image) = cached {
            trace!(target: "reader::session", index, "cache hit");
            return Ok(image);
        }
        self.load(index, cancel)
    }

    /// Warm the neighbours of `center` according to the prefetch policy. Returns how many pages
    /// were decoded; stops early when cancelled.
    pub fn prefetch(&self, center: usize, cancel: &CancelToken) -> Result<usize, SessionError> {
        self.check(center, cancel)?;
        self.cache.set_focus(center);

        let room = self.cache.limits().max_entries.saturating_sub(1);
        let mut loaded = 0;
        let plan = prefetch::window(center, self.page_count(), self.prefetch);
        for index in plan.into_iter().take(room) {
            if cancel.is_cancelled() {
                break;
            }
            if self.cache.contains(index) {
                continue;
            }
            match self.load(index, cancel) {
                Ok(_) => loaded += 1,
                Err(SessionError::Cancelled) => break,
                Err(err) => return Err(err),
            }
        }
        trace!(target: "reader::session", center, loaded, "prefetch finished");
        Ok(loaded)
    }

    /// Drop every cached page, e.g. under memory pressure.
    pub fn release_all(&self) -> usize {
        let dropped = self.cache.clear();
        self.record(|stats| stats.update_cache_usage(self.cache.state()));
        debug!(target: "reader::session", dropped, "released cached pages");
        dropped
    }

    /// Release the archive handle and the cache. Later requests fail with
    /// [`SessionError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.parser.lock().close();
        self.cache.clear();
        debug!(target: "reader::session", locator = self.document.locator(), "session closed");
    }

    fn check(&self, index: usize, cancel: &CancelToken) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        if index >= self.page_count() {
            return Err(SessionError::OutOfRange { index, count: self.page_count() });
        }
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    fn load(&self, index: usize, cancel: &CancelToken) -> Result<Arc<DecodedImage>, SessionError> {
        let bytes = {
            let mut parser = self.parser.lock();
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            parser.read_page(index)?
        };
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let name = self.document.entry(index).map(|entry| entry.name.clone()).unwrap_or_default();
        let started = Instant::now();
        let image = self.decoder.decode(&name, &bytes).map_err(|err| SessionError::Decode {
            index,
            name: name.clone(),
            message: format!("{err:#}"),
        })?;
        self.record(|stats| stats.record_decode(started.elapsed()));
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let admission = self.cache.insert(index, Arc::new(image));
        // `close` may have cleared the cache between the check above and the insert.
        if self.is_closed() {
            self.cache.clear();
            return Err(SessionError::Closed);
        }
        self.record(|stats| {
            stats.record_evictions(admission.evicted.len());
            stats.update_cache_usage(self.cache.state());
        });
        trace!(
            target: "reader::session",
            index,
            resident = admission.resident,
            evicted = admission.evicted.len(),
            "page decoded"
        );
        Ok(admission.image)
    }

    fn record(&self, update: impl FnOnce(&ReaderStats)) {
        if let Some(stats) = &self.stats {
            update(stats);
        }
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        self.parser.get_mut().close();
    }
}
