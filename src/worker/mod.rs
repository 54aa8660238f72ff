//! Job-polling workers.
//!
//! Each [`Worker`] runs a sequential loop against the remote queue:
//!
//! ```text
//! Idle -> Fetching -> no job / fetch error -> Backoff -> Idle
//!                  -> job -> Processing -> Submitting -> Idle
//! ```
//!
//! Any per-job failure, including a panic inside a capability, drops the job and
//! returns the worker to `Idle`. Jobs are
//! never retried or buffered locally; the queue owns requeue policy. A stop
//! request is observed at the top of `Idle` and interrupts a backoff sleep, but
//! never a job in flight.

pub mod pool;

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::app_state::AppState;
use crate::error::JobError;
use crate::models::job::{Job, WorkerStatus};
use crate::services::annotate::EncodingError;
use crate::services::assembler::assemble;
use crate::services::inference::InferenceError;
use crate::services::job_source::Fetched;

/// Default delay after an empty or failed poll.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Outcome of a single pass through the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// A job was processed and its result accepted by the queue.
    Submitted,
    /// A job was fetched but dropped after a failure.
    Dropped,
    /// The queue had nothing for us, or sent something unusable.
    NoJob,
    /// The queue could not be reached.
    FetchFailed,
}

impl Iteration {
    pub fn needs_backoff(self) -> bool {
        matches!(self, Iteration::NoJob | Iteration::FetchFailed)
    }
}

pub struct Worker {
    id: usize,
    status: WorkerStatus,
    state: AppState,
    settings: WorkerSettings,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(
        id: usize,
        state: AppState,
        settings: WorkerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            state,
            settings,
            shutdown,
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Check capabilities, then poll until a stop is requested.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        if let Err(e) = self.state.pipeline.ready().await {
            error!(worker = self.id, error = %e, "Capability initialization failed, worker not started");
            self.transition(WorkerStatus::Stopped);
            return Err(WorkerError::Init(e));
        }

        info!(worker = self.id, "Worker started");

        loop {
            self.transition(WorkerStatus::Idle);
            if self.stop_requested() {
                break;
            }

            if self.run_once().await.needs_backoff() {
                self.backoff().await;
            }
        }

        self.transition(WorkerStatus::Stopped);
        info!(worker = self.id, "Worker stopped");
        Ok(())
    }

    /// Fetch one job and, if there is one, process and submit it.
    pub async fn run_once(&mut self) -> Iteration {
        self.transition(WorkerStatus::Fetching);

        let job = match self.state.source.fetch().await {
            Ok(Fetched::Job(job)) => job,
            Ok(Fetched::Empty) => {
                info!(worker = self.id, "No job available");
                metrics::counter!("queue_fetch_empty_total").increment(1);
                return Iteration::NoJob;
            }
            Ok(Fetched::Malformed(e)) => {
                warn!(worker = self.id, error = %e, "Incomplete job data received, dropping");
                metrics::counter!("queue_fetch_malformed_total").increment(1);
                return Iteration::NoJob;
            }
            Err(e) => {
                warn!(worker = self.id, error = %e, timeout = e.is_timeout(), "Failed to fetch next job");
                metrics::counter!("queue_fetch_errors_total").increment(1);
                return Iteration::FetchFailed;
            }
        };

        metrics::counter!("worker_jobs_fetched_total").increment(1);
        let job_id = job.job_id.clone();
        info!(
            worker = self.id,
            job_id = %job_id,
            width = job.image.width(),
            height = job.image.height(),
            "Processing job"
        );

        let outcome = AssertUnwindSafe(self.process(job))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(JobError::Panic(panic_message(payload))));

        match outcome {
            Ok(()) => {
                info!(worker = self.id, job_id = %job_id, "Result submitted");
                metrics::counter!("worker_jobs_completed_total").increment(1);
                Iteration::Submitted
            }
            Err(e) => {
                error!(worker = self.id, job_id = %job_id, kind = e.kind(), error = %e, "Job dropped");
                metrics::counter!("worker_jobs_dropped_total", "kind" => e.kind()).increment(1);
                Iteration::Dropped
            }
        }
    }

    async fn process(&mut self, job: Job) -> Result<(), JobError> {
        self.transition(WorkerStatus::Processing);
        let started = Instant::now();

        let (classification, detections) = self.state.pipeline.infer(&job.image).await?;
        debug!(
            worker = self.id,
            job_id = %job.job_id,
            label = %classification.label,
            confidence = classification.confidence,
            detections = detections.len(),
            "Inference complete"
        );

        let Job { job_id, image } = job;
        let annotator = Arc::clone(&self.state.annotator);
        let to_draw = detections.clone();
        let annotated = tokio::task::spawn_blocking(move || annotator.annotate(&image, &to_draw))
            .await
            .map_err(|e| EncodingError::Task(e.to_string()))??;
        debug!(worker = self.id, job_id = %job_id, bytes = annotated.len(), "Annotated image encoded");

        let result = assemble(&job_id, classification, detections, annotated);
        metrics::histogram!("worker_job_processing_seconds")
            .record(started.elapsed().as_secs_f64());

        self.transition(WorkerStatus::Submitting);
        self.state.sink.submit(result).await?;
        Ok(())
    }

    async fn backoff(&mut self) {
        self.transition(WorkerStatus::Backoff);
        let delay = self.settings.backoff;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    /// A dropped sender counts as a stop request.
    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    fn transition(&mut self, next: WorkerStatus) {
        if self.status != next {
            tracing::trace!(worker = self.id, from = %self.status, to = %next, "Worker state change");
            self.status = next;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Capability initialization failed: {0}")]
    Init(#[source] InferenceError),
}
