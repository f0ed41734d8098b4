//! Sequential multi-file import.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::info;

use crate::cancel::CancelToken;
use crate::fs::ArchiveSource;

use super::pipeline::{ImportPipeline, ImportRun};
use super::state::{BatchEvent, BatchOutcome, BatchStatus, ImportOutcome};

/// Imports files one after another, recording each outcome without aborting on failures.
///
/// Yields `ItemStarted`, the item's progress events, `ItemFinished` for every file, and a single
/// `Finished` event at the end. Cancelling the token stops the current file and skips the rest.
#[derive(Debug)]
pub struct BatchRun {
    pipeline: ImportPipeline,
    pending: VecDeque<Arc<dyn ArchiveSource>>,
    cancel: CancelToken,
    current: Option<(usize, ImportRun)>,
    next_index: usize,
    total: usize,
    items: Vec<ImportOutcome>,
    done: bool,
}

impl BatchRun {
    pub fn new(
        pipeline: ImportPipeline,
        sources: Vec<Arc<dyn ArchiveSource>>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            pipeline,
            total: sources.len(),
            pending: sources.into(),
            cancel,
            current: None,
            next_index: 0,
            items: Vec::new(),
            done: false,
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Drive the batch to its end and return the aggregate.
    pub fn finish(mut self) -> BatchOutcome {
        let mut outcome = None;
        for event in self.by_ref() {
            if let BatchEvent::Finished(aggregate) = event {
                outcome = Some(aggregate);
            }
        }
        outcome.unwrap_or_else(|| self.aggregate(BatchStatus::Completed))
    }

    fn aggregate(&self, status: BatchStatus) -> BatchOutcome {
        let succeeded = self.items.iter().filter(|item| item.is_success()).count();
        BatchOutcome {
            total: self.total,
            succeeded,
            failed: self.items.len() - succeeded,
            items: self.items.clone(),
            status,
        }
    }

    fn conclude(&mut self, status: BatchStatus) -> BatchEvent {
        self.done = true;
        self.current = None;
        let outcome = self.aggregate(status);
        info!(
            target: "import::batch",
            total = outcome.total,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            ?status,
            "batch finished"
        );
        BatchEvent::Finished(outcome)
    }
}

impl Iterator for BatchRun {
    type Item = BatchEvent;

    fn next(&mut self) -> Option<BatchEvent> {
        if self.done {
            return None;
        }

        if let Some((index, run)) = self.current.as_mut() {
            let index = *index;
            if let Some(progress) = run.next() {
                return Some(BatchEvent::Item { index, progress });
            }
            let outcome = run.take_outcome();
            self.current = None;
            return Some(match outcome {
                Some(outcome) => {
                    self.items.push(outcome.clone());
                    BatchEvent::ItemFinished { index, outcome }
                }
                None => self.conclude(BatchStatus::Cancelled),
            });
        }

        if self.cancel.is_cancelled() {
            return Some(self.conclude(BatchStatus::Cancelled));
        }

        let Some(source) = self.pending.pop_front() else {
            return Some(self.conclude(BatchStatus::Completed));
        };
        let index = self.next_index;
        self.next_index += 1;
        let run = self.pipeline.run(source, self.cancel.clone());
        let locator = run.locator().to_string();
        self.current = Some((index, run));
        Some(BatchEvent::ItemStarted { index, locator })
    }
}
