//! Single-file import: validate, parse, extract the cover, persist.

use std::any::Any;
use std::io::Read;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::ReaderConfig;
use crate::fs::{ArchiveError, ArchiveParser, ArchiveSource, FormatRegistry, ParserFactory};
use crate::stats::ReaderStats;
use crate::store::{CoverStore, MetadataStore, UpsertRequest};
use crate::types::{ComicDocument, CoverRef};

use super::ImportLimits;
use super::state::{
    FailureReason, ImportFailure, ImportNotice, ImportOutcome, ImportState, ImportSummary,
    ProgressEvent,
};

/// Bytes read from the source to prove it is readable.
const PROBE_LEN: usize = 1024;

/// Shared import configuration and collaborators. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    factory: Arc<dyn ParserFactory>,
    store: Arc<dyn MetadataStore>,
    covers: Option<Arc<dyn CoverStore>>,
    stats: Option<Arc<ReaderStats>>,
    limits: ImportLimits,
}

impl ImportPipeline {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            factory: Arc::new(FormatRegistry::default()),
            store,
            covers: None,
            stats: None,
            limits: ImportLimits::default(),
        }
    }

    /// Default parsers and the limits and image extensions from `config`.
    pub fn from_config(config: &ReaderConfig, store: Arc<dyn MetadataStore>) -> Self {
        Self::new(store)
            .with_factory(Arc::new(FormatRegistry::new(config.cover_selector())))
            .with_limits(config.import_limits())
    }

    pub fn with_factory(mut self, factory: Arc<dyn ParserFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_cover_store(mut self, covers: Arc<dyn CoverStore>) -> Self {
        self.covers = Some(covers);
        self
    }

    pub fn with_limits(mut self, limits: ImportLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ReaderStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn limits(&self) -> &ImportLimits {
        &self.limits
    }

    /// Prepare an import of `source`. Nothing happens until the run is iterated.
    pub fn run(&self, source: Arc<dyn ArchiveSource>, cancel: CancelToken) -> ImportRun {
        ImportRun {
            pipeline: self.clone(),
            locator: source.locator().to_string(),
            source,
            cancel,
            stage: Stage::Start,
            state: ImportState::Pending,
            outcome: None,
        }
    }

    /// Run an import to the end on the calling thread. `None` means it was cancelled.
    pub fn import(
        &self,
        source: Arc<dyn ArchiveSource>,
        cancel: CancelToken,
    ) -> Option<ImportOutcome> {
        self.run(source, cancel).finish()
    }
}

/// Work left to do, with the data the next step needs.
enum Stage {
    Start,
    Pending,
    Validating,
    Parsing { canonical: String, size: u64 },
    ExtractingCover { canonical: String, size: u64, parser: Box<dyn ArchiveParser> },
    Persisting {
        canonical: String,
        size: u64,
        document: ComicDocument,
        cover: Option<CoverRef>,
    },
    Finished,
}

/// One import, driven by iteration. Each `next` performs the pending step and yields its
/// progress event; the sequence ends after the terminal event, or without one when cancelled.
/// A run cannot be restarted; start a new one from the pipeline to retry.
pub struct ImportRun {
    pipeline: ImportPipeline,
    source: Arc<dyn ArchiveSource>,
    locator: String,
    cancel: CancelToken,
    stage: Stage,
    state: ImportState,
    outcome: Option<ImportOutcome>,
}

impl std::fmt::Debug for ImportRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportRun")
            .field("locator", &self.locator)
            .field("state", &self.state)
            .field("finished", &matches!(self.stage, Stage::Finished))
            .finish()
    }
}

impl ImportRun {
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Last state reported.
    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn outcome(&self) -> Option<&ImportOutcome> {
        self.outcome.as_ref()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Drive the run to its end and return the outcome, or `None` if it was cancelled.
    pub fn finish(mut self) -> Option<ImportOutcome> {
        for _ in self.by_ref() {}
        self.outcome.take()
    }

    pub(crate) fn take_outcome(&mut self) -> Option<ImportOutcome> {
        self.outcome.take()
    }

    fn emit(&mut self, state: ImportState) -> ProgressEvent {
        self.state = state;
        debug!(target: "import::pipeline", locator = %self.locator, ?state, "import progress");
        ProgressEvent::new(&self.locator, state)
    }

    fn fail(&mut self, reason: FailureReason, message: String) -> ProgressEvent {
        warn!(target: "import::pipeline", locator = %self.locator, %reason, %message, "failed");
        let outcome = ImportOutcome::Failure(ImportFailure {
            locator: self.locator.clone(),
            reason,
            message: message.clone(),
        });
        self.finish_with(outcome, ImportState::Failed(reason)).with_message(message)
    }

    fn finish_with(&mut self, outcome: ImportOutcome, state: ImportState) -> ProgressEvent {
        if let Some(stats) = &self.pipeline.stats {
            stats.record_import(outcome.is_success());
        }
        self.stage = Stage::Finished;
        self.outcome = Some(outcome.clone());
        self.emit(state).with_outcome(outcome)
    }

    fn abandon(&mut self) -> Option<ProgressEvent> {
        if let Stage::ExtractingCover { parser, .. } = &mut self.stage {
            parser.close();
        }
        self.stage = Stage::Finished;
        info!(target: "import::pipeline", locator = %self.locator, "import cancelled");
        None
    }

    fn validate(&mut self) -> ProgressEvent {
        let max_size = self.pipeline.limits.max_size_bytes;
        let extension = self.source.extension().unwrap_or_default();
        if !self.pipeline.limits.supports(&extension) {
            let message = format!("unsupported file type '{extension}'");
            return self.fail(FailureReason::UnsupportedFormat, message);
        }

        let size = match self.source.size_bytes() {
            Ok(size) => size,
            Err(err) => return self.fail(FailureReason::Unreadable, format!("stat failed: {err}")),
        };
        if size > max_size {
            let message = format!("{size} bytes exceeds the {max_size} byte limit");
            return self.fail(FailureReason::FileTooLarge, message);
        }

        if let Err(message) = probe(&*self.source) {
            return self.fail(FailureReason::Unreadable, message);
        }

        self.stage = Stage::Parsing { canonical: self.source.canonical_locator(), size };
        self.emit(ImportState::Parsing)
    }

    fn parse(&mut self, canonical: String, size: u64) -> Option<ProgressEvent> {
        let factory = Arc::clone(&self.pipeline.factory);
        let source = Arc::clone(&self.source);
        let opened = panic::catch_unwind(AssertUnwindSafe(|| factory.open(&*source)));

        let mut parser = match opened {
            Ok(Ok(parser)) => parser,
            Ok(Err(ArchiveError::Empty)) => {
                return Some(self.fail(FailureReason::EmptyArchive, "no image pages".into()));
            }
            Ok(Err(ArchiveError::UnsupportedFormat(ext))) => {
                let message = format!("no parser for '{ext}'");
                return Some(self.fail(FailureReason::UnsupportedFormat, message));
            }
            Ok(Err(err)) => return Some(self.fail(FailureReason::ParseFailed, err.to_string())),
            Err(panic) => return Some(self.fail(FailureReason::ParseFailed, panic_message(panic))),
        };

        if self.cancel.is_cancelled() {
            parser.close();
            return self.abandon();
        }
        if parser.page_count() == 0 {
            parser.close();
            return Some(self.fail(FailureReason::EmptyArchive, "no image pages".into()));
        }

        self.stage = Stage::ExtractingCover { canonical, size, parser };
        Some(self.emit(ImportState::ExtractingCover))
    }

    fn extract_cover(
        &mut self,
        canonical: String,
        size: u64,
        mut parser: Box<dyn ArchiveParser>,
    ) -> Option<ProgressEvent> {
        let covers = self.pipeline.covers.clone();
        let cancel = self.cancel.clone();
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            store_cover(parser.as_mut(), covers.as_deref(), &canonical, &cancel)
        }));
        let document = parser.document().clone();
        parser.close();

        if self.cancel.is_cancelled() {
            return self.abandon();
        }

        let entry = document.cover_entry().map(|entry| entry.name.clone());
        let (cover, notice) = match attempt {
            Ok(Ok(cover)) => (cover, None),
            Ok(Err(message)) => (None, Some(message)),
            Err(panic) => (None, Some(panic_message(panic))),
        };
        let notice = notice.map(|message| {
            warn!(target: "import::pipeline", locator = %self.locator, %message, "no cover");
            ImportNotice::CoverExtractionFailed { entry, message }
        });

        self.stage = Stage::Persisting { canonical, size, document, cover };
        Some(self.emit(ImportState::Persisting).with_notice(notice))
    }

    fn persist(
        &mut self,
        canonical: String,
        size: u64,
        document: ComicDocument,
        cover: Option<CoverRef>,
    ) -> ProgressEvent {
        let request = UpsertRequest {
            path: canonical.clone(),
            title: document.title().to_string(),
            cover_ref: cover.clone(),
            page_count: document.page_count(),
            size_bytes: size,
            format: document.format(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        };

        let store = Arc::clone(&self.pipeline.store);
        let id = match panic::catch_unwind(AssertUnwindSafe(|| store.upsert(request))) {
            Ok(Ok(id)) => id,
            Ok(Err(err)) => return self.fail(FailureReason::PersistFailed, err.to_string()),
            Err(panic) => return self.fail(FailureReason::PersistFailed, panic_message(panic)),
        };

        info!(
            target: "import::pipeline",
            locator = %self.locator,
            %id,
            pages = document.page_count(),
            "import completed"
        );
        let summary = ImportSummary {
            title: document.title().to_string(),
            page_count: document.page_count(),
            cover_ref: cover,
            locator: canonical,
        };
        self.finish_with(ImportOutcome::Success { id, summary }, ImportState::Completed)
    }
}

impl Iterator for ImportRun {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        if matches!(self.stage, Stage::Finished) {
            return None;
        }
        if self.cancel.is_cancelled() {
            return self.abandon();
        }

        match mem::replace(&mut self.stage, Stage::Finished) {
            Stage::Start => {
                self.stage = Stage::Pending;
                Some(self.emit(ImportState::Pending))
            }
            Stage::Pending => {
                self.stage = Stage::Validating;
                Some(self.emit(ImportState::Validating))
            }
            Stage::Validating => Some(self.validate()),
            Stage::Parsing { canonical, size } => self.parse(canonical, size),
            Stage::ExtractingCover { canonical, size, parser } => {
                self.extract_cover(canonical, size, parser)
            }
            Stage::Persisting { canonical, size, document, cover } => {
                Some(self.persist(canonical, size, document, cover))
            }
            Stage::Finished => None,
        }
    }
}

impl Drop for ImportRun {
    fn drop(&mut self) {
        if let Stage::ExtractingCover { parser, .. } = &mut self.stage {
            debug!(target: "import::pipeline", locator = %self.locator, "closing in-flight run");
            parser.close();
        }
    }
}

/// Read the cover page and hand it to the cover store. Errors become notices.
fn store_cover(
    parser: &mut dyn ArchiveParser,
    covers: Option<&dyn CoverStore>,
    canonical: &str,
    cancel: &CancelToken,
) -> Result<Option<CoverRef>, String> {
    let Some(covers) = covers else {
        return Ok(None);
    };
    let Some(index) = parser.document().cover_index() else {
        return Ok(None);
    };
    let name = parser.document().entries()[index].name.clone();

    if cancel.is_cancelled() {
        return Ok(None);
    }
    let bytes = parser.read_page(index).map_err(|err| format!("reading {name}: {err}"))?;
    if cancel.is_cancelled() {
        return Ok(None);
    }
    if bytes.is_empty() {
        return Err(format!("cover entry {name} is empty"));
    }

    covers.store(canonical, &name, &bytes).map(Some).map_err(|err| err.to_string())
}

fn probe(source: &dyn ArchiveSource) -> Result<(), String> {
    let mut reader = source.open().map_err(|err| format!("cannot open: {err}"))?;
    let mut buf = [0u8; PROBE_LEN];
    match reader.read(&mut buf) {
        Ok(0) => Err("file is empty".to_string()),
        Ok(_) => Ok(()),
        Err(err) => Err(format!("read probe failed: {err}")),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
