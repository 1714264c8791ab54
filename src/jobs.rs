//! Job lifecycle and progress reporting.
//!
//! A job is one upload-plus-indexing run. Its status lives in the [`JobTable`], which is the
//! only synchronization point between the background worker writing progress and any number
//! of HTTP pollers reading it. Progress is expressed on a single 0–100 scale shared by two
//! writers that never talk to each other: the upload body wrapper reports `0..=40` while bytes
//! arrive, and the indexing worker maps its own local percentages into `40..=100` through a
//! [`ProgressScale`].

mod table;
pub mod upload;

pub use table::JobTable;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse stage label of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPhase {
    /// Request body is still being received.
    Uploading,
    /// Upload finished; waiting for a worker.
    #[serde(rename = "queued")]
    Queued,
    /// Chunking, embedding, and writing the index.
    Processing,
    /// Requesting the document summary.
    Summarizing,
    /// Terminal success; the status carries the summary.
    #[serde(rename = "completed")]
    Completed,
    /// Terminal failure; the status carries the error message.
    #[serde(rename = "error")]
    Error,
}

impl JobPhase {
    /// Whether no further updates are expected for the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Wire name of the phase, as reported to pollers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "Uploading",
            Self::Queued => "queued",
            Self::Processing => "Processing",
            Self::Summarizing => "Summarizing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job as reported by `GET /progress/{job_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Current phase.
    pub phase: JobPhase,
    /// Percentage on the shared 0–100 scale.
    pub pct: u8,
    /// Generated summary, present once the job completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Display filename of the uploaded document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Failure message, present once the job errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    /// A status with no extra fields.
    pub fn new(phase: JobPhase, pct: u8) -> Self {
        Self {
            phase,
            pct: pct.min(100),
            summary: None,
            filename: None,
            error: None,
        }
    }

    fn merge(&mut self, extras: JobExtras) {
        if let Some(summary) = extras.summary {
            self.summary = Some(summary);
        }
        if let Some(filename) = extras.filename {
            self.filename = Some(filename);
        }
        if let Some(error) = extras.error {
            self.error = Some(error);
        }
    }
}

/// Reported for ids the table does not know about.
impl Default for JobStatus {
    fn default() -> Self {
        Self::new(JobPhase::Queued, 0)
    }
}

/// Optional fields merged into a status by [`JobTable::update`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobExtras {
    /// Summary text to attach.
    pub summary: Option<String>,
    /// Display filename to attach.
    pub filename: Option<String>,
    /// Error message to attach.
    pub error: Option<String>,
}

impl JobExtras {
    /// Extras carrying only the display filename.
    pub fn filename(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    /// Extras for a successful job.
    pub fn completed(summary: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            filename: Some(filename.into()),
            error: None,
        }
    }

    /// Extras for a failed job.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Sub-range of the shared 0–100 scale owned by one writer.
///
/// `scale(local)` truncates and clamps `local` into `[0, 100]`, then returns
/// `start + round(local * (end - start) / 100)`. A zero-width range is treated as width one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressScale {
    start: u8,
    end: u8,
}

impl ProgressScale {
    /// Range reserved for receiving the request body.
    pub const UPLOAD: Self = Self { start: 0, end: 40 };
    /// Range reserved for the background indexing worker.
    pub const INDEXING: Self = Self {
        start: 40,
        end: 100,
    };

    /// Build a range, clamping both bounds to 100 and `end` to at least `start`.
    pub fn new(start: u8, end: u8) -> Self {
        let start = start.min(100);
        let end = end.min(100).max(start);
        Self { start, end }
    }

    /// Lower bound of the range.
    pub fn start(self) -> u8 {
        self.start
    }

    /// Upper bound of the range.
    pub fn end(self) -> u8 {
        self.end
    }

    /// Map a local 0–100 percentage into this range.
    pub fn scale(self, local: f64) -> u8 {
        let local = if local.is_nan() {
            0.0
        } else {
            local.trunc().clamp(0.0, 100.0)
        };
        let span = f64::from(self.end.saturating_sub(self.start).max(1));
        let mapped = f64::from(self.start) + (local * span / 100.0).round();
        mapped.min(100.0) as u8
    }
}
