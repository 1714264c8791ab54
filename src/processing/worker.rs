//! Background execution of indexing jobs.
//!
//! Every accepted upload becomes one Tokio task. Tasks share a semaphore so at most
//! `MAX_CONCURRENT_JOBS` documents are embedded at once; a task waiting for its permit leaves
//! the job in the `queued` phase set by the upload handler.

use crate::jobs::{JobExtras, JobPhase, JobTable, ProgressScale};
use crate::metrics::IndexingMetrics;
use crate::processing::StudyApi;
use crate::session::SessionStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Everything a worker needs to index one uploaded document.
#[derive(Debug, Clone)]
pub struct IndexingJob {
    /// Job whose progress is reported.
    pub job_id: String,
    /// Extracted document text.
    pub text: String,
    /// Directory receiving the document index.
    pub index_dir: PathBuf,
    /// Display filename attached to the completed job.
    pub filename: String,
    /// Slice of the shared progress scale owned by the worker.
    pub scale: ProgressScale,
    /// Session whose document entry receives the summary.
    pub session_id: String,
}

/// Spawns indexing jobs onto the runtime, bounded by a semaphore.
#[derive(Clone)]
pub struct JobRunner {
    service: Arc<dyn StudyApi>,
    jobs: Arc<JobTable>,
    sessions: Arc<SessionStore>,
    metrics: Arc<IndexingMetrics>,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    /// Create a runner allowing `max_concurrent` jobs at a time (at least one).
    pub fn new(
        service: Arc<dyn StudyApi>,
        jobs: Arc<JobTable>,
        sessions: Arc<SessionStore>,
        metrics: Arc<IndexingMetrics>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            service,
            jobs,
            sessions,
            metrics,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run `job` on a new task and return immediately.
    pub fn spawn(&self, job: IndexingJob) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(job).await })
    }

    /// Run `job` to a terminal phase on the current task.
    pub async fn run(&self, job: IndexingJob) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.fail(&job, "job runner is shutting down".to_string());
                return;
            }
        };
        tracing::info!(job_id = %job.job_id, filename = %job.filename, "Indexing job started");

        match self.service.index_document(&job, &self.jobs).await {
            Ok(outcome) => {
                self.jobs.update(
                    &job.job_id,
                    JobPhase::Completed,
                    job.scale.scale(100.0),
                    JobExtras::completed(outcome.summary.clone(), job.filename.clone()),
                );
                if !self
                    .sessions
                    .record_summary(&job.session_id, &job.filename, &outcome.summary)
                {
                    tracing::debug!(
                        job_id = %job.job_id,
                        filename = %job.filename,
                        "Document entry gone before summary arrived"
                    );
                }
                tracing::info!(
                    job_id = %job.job_id,
                    filename = %job.filename,
                    chunks = outcome.chunk_count,
                    "Indexing job completed"
                );
            }
            Err(error) => self.fail(&job, error.to_string()),
        }
    }

    fn fail(&self, job: &IndexingJob, message: String) {
        tracing::warn!(job_id = %job.job_id, filename = %job.filename, error = %message, "Indexing job failed");
        self.metrics.record_failure();
        self.jobs.update(
            &job.job_id,
            JobPhase::Error,
            job.scale.end(),
            JobExtras::error(message),
        );
    }
}
