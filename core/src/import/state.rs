//! States, events and outcomes reported by an import run.

use std::fmt;

use serde::Serialize;

use crate::types::{CoverRef, RecordId};

/// Why a single import ended in [`ImportState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    UnsupportedFormat,
    FileTooLarge,
    Unreadable,
    EmptyArchive,
    ParseFailed,
    PersistFailed,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::Unreadable => "UNREADABLE",
            Self::EmptyArchive => "EMPTY_ARCHIVE",
            Self::ParseFailed => "PARSE_FAILED",
            Self::PersistFailed => "PERSIST_FAILED",
        }
    }

    /// Validation failures never reach the parser.
    pub fn is_validation(self) -> bool {
        matches!(self, Self::UnsupportedFormat | Self::FileTooLarge | Self::Unreadable)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportState {
    Pending,
    Validating,
    Parsing,
    ExtractingCover,
    Persisting,
    Completed,
    Failed(FailureReason),
}

impl ImportState {
    /// Fixed milestone reported with the state.
    pub fn percent(self) -> u8 {
        match self {
            Self::Pending | Self::Validating => 0,
            Self::Parsing => 10,
            Self::ExtractingCover => 50,
            Self::Persisting => 80,
            Self::Completed | Self::Failed(_) => 100,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Informational conditions that do not stop a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportNotice {
    CoverExtractionFailed { entry: Option<String>, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub title: String,
    pub page_count: usize,
    pub cover_ref: Option<CoverRef>,
    pub locator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub locator: String,
    pub reason: FailureReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportOutcome {
    Success { id: RecordId, summary: ImportSummary },
    Failure(ImportFailure),
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.reason),
        }
    }

    pub fn locator(&self) -> &str {
        match self {
            Self::Success { summary, .. } => &summary.locator,
            Self::Failure(failure) => &failure.locator,
        }
    }
}

/// One step of an import. Terminal events carry the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub locator: String,
    pub state: ImportState,
    pub percent: u8,
    pub message: Option<String>,
    pub notice: Option<ImportNotice>,
    pub outcome: Option<ImportOutcome>,
}

impl ProgressEvent {
    pub(crate) fn new(locator: &str, state: ImportState) -> Self {
        Self {
            locator: locator.to_string(),
            state,
            percent: state.percent(),
            message: None,
            notice: None,
            outcome: None,
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub(crate) fn with_notice(mut self, notice: Option<ImportNotice>) -> Self {
        self.notice = notice;
        self
    }

    pub(crate) fn with_outcome(mut self, outcome: ImportOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Completed,
    Cancelled,
}

/// Aggregate of a batch. `total` counts every requested file, including those a cancellation
/// left unattempted; `items` holds one outcome per file that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ImportOutcome>,
    pub status: BatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchEvent {
    ItemStarted { index: usize, locator: String },
    Item { index: usize, progress: ProgressEvent },
    ItemFinished { index: usize, outcome: ImportOutcome },
    Finished(BatchOutcome),
}
