//! Concurrent registry of job status.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::{JobExtras, JobPhase, JobStatus};

/// Process-wide mapping from job id to its latest status.
///
/// Writers are the worker owning a job and the upload wrapper during the upload phase; readers
/// are pollers. Each field is last-write-wins. [`JobTable::progress`] additionally remembers the
/// last percentage it handed out per job so that pollers never observe progress going backwards.
/// Every write stamps the job, and [`JobTable::sweep_idle`] drops abandoned entries.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: DashMap<String, JobStatus>,
    reported: DashMap<String, u8>,
    touched: DashMap<String, Instant>,
}

impl JobTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `Uploading`/0 entry, replacing any existing entry for `job_id`.
    pub fn create(&self, job_id: &str) {
        self.reported.remove(job_id);
        self.jobs
            .insert(job_id.to_string(), JobStatus::new(JobPhase::Uploading, 0));
        self.touch(job_id);
        tracing::info!(job_id, phase = %JobPhase::Uploading, pct = 0, "Job created");
    }

    /// Insert a fresh `Uploading`/0 entry only when `job_id` is unknown.
    pub fn ensure(&self, job_id: &str) {
        self.jobs
            .entry(job_id.to_string())
            .or_insert_with(|| JobStatus::new(JobPhase::Uploading, 0));
        self.touch(job_id);
    }

    /// Replace phase and percentage and merge `extras`, inserting the entry when missing.
    pub fn update(&self, job_id: &str, phase: JobPhase, pct: u8, extras: JobExtras) {
        let pct = pct.min(100);
        let mut entry = self
            .jobs
            .entry(job_id.to_string())
            .or_insert_with(|| JobStatus::new(phase, pct));
        entry.phase = phase;
        entry.pct = pct;
        entry.merge(extras);
        drop(entry);
        self.touch(job_id);
        tracing::info!(job_id, %phase, pct, "Job progress updated");
    }

    /// Replace phase and percentage of an existing entry. Returns `false` when `job_id` is unknown.
    pub fn advance(&self, job_id: &str, phase: JobPhase, pct: u8) -> bool {
        match self.jobs.get_mut(job_id) {
            Some(mut entry) => {
                entry.phase = phase;
                entry.pct = pct.min(100);
                drop(entry);
                self.touch(job_id);
                tracing::debug!(job_id, %phase, pct, "Job progress advanced");
                true
            }
            None => false,
        }
    }

    /// Current status, or `queued`/0 for unknown ids.
    pub fn read(&self, job_id: &str) -> JobStatus {
        self.jobs
            .get(job_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Poller-facing read: the percentage is clamped to at least the last value returned here.
    ///
    /// Unknown ids report `queued`/0 and leave no trace in the table.
    pub fn progress(&self, job_id: &str) -> JobStatus {
        let Some(mut status) = self.jobs.get(job_id).map(|entry| entry.value().clone()) else {
            return JobStatus::default();
        };
        let mut floor = self.reported.entry(job_id.to_string()).or_insert(0);
        status.pct = status.pct.max(*floor);
        *floor = status.pct;
        status
    }

    /// Phase of a known job.
    pub fn phase(&self, job_id: &str) -> Option<JobPhase> {
        self.jobs.get(job_id).map(|entry| entry.phase)
    }

    /// Whether `job_id` has an entry.
    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    /// Remove the entry for `job_id`. Removing an unknown id is a no-op.
    pub fn remove(&self, job_id: &str) {
        if self.jobs.remove(job_id).is_some() {
            tracing::debug!(job_id, "Job removed");
        }
        self.reported.remove(job_id);
        self.touched.remove(job_id);
    }

    /// Remove and return the entry only if it reached a terminal phase.
    ///
    /// Concurrent callers race on the removal, so exactly one of them receives the status.
    pub fn take_terminal(&self, job_id: &str) -> Option<JobStatus> {
        let (_, status) = self
            .jobs
            .remove_if(job_id, |_, status| status.phase.is_terminal())?;
        self.reported.remove(job_id);
        self.touched.remove(job_id);
        tracing::debug!(job_id, phase = %status.phase, "Terminal job state consumed");
        Some(status)
    }

    /// Drop jobs nobody wrote to for at least `ttl`. Returns how many were dropped.
    ///
    /// Only finished jobs and uploads that stopped sending bytes are dropped. Jobs queued for or
    /// running on a worker stay until the worker finishes them.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let stale: Vec<String> = self
            .touched
            .iter()
            .filter(|entry| entry.value().elapsed() >= ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut dropped = 0;
        for job_id in stale {
            let removed = self.jobs.remove_if(&job_id, |_, status| {
                status.phase.is_terminal() || status.phase == JobPhase::Uploading
            });
            if let Some((_, status)) = removed {
                self.reported.remove(&job_id);
                self.touched.remove(&job_id);
                tracing::debug!(job_id = %job_id, phase = %status.phase, "Idle job dropped");
                dropped += 1;
            }
        }
        dropped
    }

    fn touch(&self, job_id: &str) {
        self.touched.insert(job_id.to_string(), Instant::now());
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the table tracks no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
