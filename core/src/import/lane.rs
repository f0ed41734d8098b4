//! Background worker that executes imports off the caller's thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, anyhow};
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, error};

use crate::cancel::CancelToken;
use crate::fs::ArchiveSource;

use super::batch::BatchRun;
use super::pipeline::{ImportPipeline, ImportRun};
use super::state::{BatchEvent, ProgressEvent};

const WORKER_NAME: &str = "comic-import";

enum Job {
    Single { run: ImportRun, events: Sender<ProgressEvent> },
    Batch { run: BatchRun, events: Sender<BatchEvent> },
}

/// Single worker thread fed through a job queue; submissions run one at a time in order.
#[derive(Debug)]
pub struct ImportLane {
    pipeline: ImportPipeline,
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ImportLane {
    pub fn start(pipeline: ImportPipeline) -> crate::Result<Self> {
        let (jobs, queue) = unbounded::<Job>();
        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || work(queue))
            .context("spawning import worker")?;
        Ok(Self { pipeline, jobs: Some(jobs), worker: Some(worker) })
    }

    /// Queue one import. Progress arrives on the returned stream.
    pub fn submit(&self, source: Arc<dyn ArchiveSource>) -> crate::Result<ProgressStream> {
        let cancel = CancelToken::new();
        let (events, receiver) = unbounded();
        let run = self.pipeline.run(source, cancel.clone());
        self.enqueue(Job::Single { run, events })?;
        Ok(ProgressStream { receiver, cancel })
    }

    /// Queue a batch of imports, executed sequentially on the worker.
    pub fn submit_batch(
        &self,
        sources: Vec<Arc<dyn ArchiveSource>>,
    ) -> crate::Result<BatchStream> {
        let cancel = CancelToken::new();
        let (events, receiver) = unbounded();
        let run = BatchRun::new(self.pipeline.clone(), sources, cancel.clone());
        self.enqueue(Job::Batch { run, events })?;
        Ok(BatchStream { receiver, cancel })
    }

    /// Stop accepting jobs and wait for queued ones to drain.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn enqueue(&self, job: Job) -> crate::Result<()> {
        let jobs = self.jobs.as_ref().ok_or_else(|| anyhow!("import lane is shut down"))?;
        jobs.send(job).map_err(|_| anyhow!("import worker has exited"))
    }

    fn stop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(target: "import::lane", "import worker panicked");
            }
        }
    }
}

impl Drop for ImportLane {
    fn drop(&mut self) {
        self.stop();
    }
}

fn work(queue: Receiver<Job>) {
    debug!(target: "import::lane", "import worker started");
    for job in queue {
        match job {
            Job::Single { run, events } => forward(run, &events),
            Job::Batch { run, events } => forward(run, &events),
        }
    }
    debug!(target: "import::lane", "import worker stopped");
}

/// Pump a run into its stream. A disconnected stream cancels the run, and dropping the run
/// closes any archive it still holds.
fn forward<R, E>(run: R, events: &Sender<E>)
where
    R: Iterator<Item = E> + Cancellable,
{
    let cancel = run.token().clone();
    for event in run {
        if events.send(event).is_err() {
            cancel.cancel();
            debug!(target: "import::lane", "stream dropped, run cancelled");
            return;
        }
    }
}

trait Cancellable {
    fn token(&self) -> &CancelToken;
}

impl Cancellable for ImportRun {
    fn token(&self) -> &CancelToken {
        self.cancel_token()
    }
}

impl Cancellable for BatchRun {
    fn token(&self) -> &CancelToken {
        self.cancel_token()
    }
}

/// Receiving end of a single import. Dropping it cancels the import.
#[derive(Debug)]
pub struct ProgressStream {
    receiver: Receiver<ProgressEvent>,
    cancel: CancelToken,
}

impl ProgressStream {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Iterator for ProgressStream {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().ok()
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Receiving end of a batch. Dropping it cancels the remaining work.
#[derive(Debug)]
pub struct BatchStream {
    receiver: Receiver<BatchEvent>,
    cancel: CancelToken,
}

impl BatchStream {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

impl Iterator for BatchStream {
    type Item = BatchEvent;

    fn next(&mut self) -> Option<BatchEvent> {
        self.receiver.recv().ok()
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
