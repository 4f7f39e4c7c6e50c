//! Job records: identity, lifecycle status, progress counters.

use crate::error::JobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque unique job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// queued ──▶ processing ──▶ completed
///    │            │
///    └────────────┴──────▶ error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether a record in `self` may move to `next`. Staying put is allowed
    /// for non-terminal states so progress can be updated in place.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Queued)
                | (Queued, Processing)
                | (Queued, Error)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One submitted document and everything known about its processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// 0–100, never decreasing.
    pub progress: u8,
    /// Human-readable description of the current step.
    pub message: String,
    pub total_pages: Option<usize>,
    pub total_chunks: Option<usize>,
    /// 1-based index of the chunk being processed.
    pub current_chunk: Option<usize>,
    pub pages_processed: Option<usize>,
    /// Present only when `status == Error`.
    pub error: Option<JobError>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

impl Job {
    pub fn new(id: JobId, input_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            message: "Queued".to_string(),
            total_pages: None,
            total_chunks: None,
            current_chunk: None,
            pages_processed: None,
            error: None,
            input_path,
            output_path,
        }
    }

    /// Raise progress to `value` (capped at 100); lower values are ignored.
    pub fn advance(&mut self, value: u8, message: impl Into<String>) {
        self.progress = self.progress.max(value.min(100));
        self.message = message.into();
    }

    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Error;
        self.message = error.message.clone();
        self.error = Some(error);
    }

    pub fn complete(&mut self, pages_processed: usize) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.pages_processed = Some(pages_processed);
        self.message = "Completed".to_string();
    }
}

/// Snapshot returned by status polls.
///
/// `output_path` is only filled in once the job has completed, so a poller
/// can never be pointed at a partial file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_chunk: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            total_pages: job.total_pages,
            total_chunks: job.total_chunks,
            current_chunk: job.current_chunk,
            pages_processed: job.pages_processed,
            error: job.error.clone(),
            output_path: (job.status == JobStatus::Completed).then(|| job.output_path.clone()),
        }
    }
}
