//! Error types for the edgequake-pdfocr library.
//!
//! Every failure the pipeline can hit is a variant of [`PdfOcrError`]. The
//! orchestrator is the only place that turns one of these into a job's
//! terminal `error` state; it records the stable [`ErrorCode`] next to the
//! rendered message so status pollers can branch on the code and show the
//! message to humans.
//!
//! Engine failures carry a bounded diagnostic tail (the last lines of the
//! engine's combined output), never the full log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-pdfocr library.
#[derive(Debug, Error)]
pub enum PdfOcrError {
    // ── Preflight errors ──────────────────────────────────────────────────
    /// One or more external tools required by the pipeline are absent.
    #[error(
        "Missing system dependencies: {}\n\
On Debian/Ubuntu install: tesseract-ocr (+ language packs), ocrmypdf, ghostscript, qpdf.",
        .tools.join(", ")
    )]
    DependencyMissing { tools: Vec<String> },

    /// The file is not a PDF, or its structure could not be parsed.
    #[error("'{path}' is not a valid PDF: {detail}")]
    InvalidDocument { path: PathBuf, detail: String },

    /// The PDF parsed but has no pages.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// The document exceeds the configured page ceiling.
    #[error("PDF has {pages} pages, above the limit of {limit}.\nSplit the document or raise max_pages_total.")]
    TooManyPages { pages: usize, limit: usize },

    /// The file is larger than the configured input limit.
    #[error("PDF is {bytes} bytes, above the limit of {limit} bytes")]
    FileTooLarge { bytes: u64, limit: u64 },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The OCR engine exited with a non-zero status.
    ///
    /// `tail` is exposed through [`PdfOcrError::diagnostic`], not the message.
    #[error("OCR engine failed on chunk {chunk} (exit code {exit_code:?})")]
    EngineFailure {
        chunk: usize,
        exit_code: Option<i32>,
        tail: String,
    },

    /// The OCR engine exceeded its per-chunk time budget and was killed.
    #[error("OCR engine timed out after {secs}s on chunk {chunk}")]
    EngineTimeout { chunk: usize, secs: u64 },

    // ── Merge errors ──────────────────────────────────────────────────────
    /// A processed chunk was missing or unreadable, or the merged page
    /// count did not add up.
    #[error("Failed to merge processed chunks: {detail}")]
    MergeFailure { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Workspace or artifact read/write failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Service errors ────────────────────────────────────────────────────
    /// No job with this id is registered.
    #[error("Job '{id}' not found")]
    NotFound { id: String },

    /// The job exists but has not completed successfully.
    #[error("Job '{id}' is not ready for retrieval (status: {status})")]
    NotReady { id: String, status: String },

    /// The job is still queued or processing and cannot be deleted.
    #[error("Job '{id}' is still {status}")]
    JobActive { id: String, status: String },

    /// The job reached a terminal state and its record is frozen.
    #[error("Job '{id}' is already finished")]
    JobFinalized { id: String },

    /// The service refused a submission because its queue is full.
    #[error("Job queue is full ({capacity} jobs in flight); retry later")]
    QueueFull { capacity: usize },

    /// The job was cancelled before it could finish.
    #[error("Job cancelled before {stage}")]
    Cancelled { stage: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdfOcrError {
    /// Convenience constructor for [`PdfOcrError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PdfOcrError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-usable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PdfOcrError::DependencyMissing { .. } => ErrorCode::DependencyMissing,
            PdfOcrError::InvalidDocument { .. } => ErrorCode::InvalidDocument,
            PdfOcrError::EmptyDocument { .. } => ErrorCode::EmptyDocument,
            PdfOcrError::TooManyPages { .. } => ErrorCode::TooManyPages,
            PdfOcrError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            PdfOcrError::EngineFailure { .. } => ErrorCode::EngineFailure,
            PdfOcrError::EngineTimeout { .. } => ErrorCode::EngineTimeout,
            PdfOcrError::MergeFailure { .. } => ErrorCode::MergeFailure,
            PdfOcrError::Io { .. } => ErrorCode::IoError,
            PdfOcrError::Cancelled { .. } => ErrorCode::Cancelled,
            PdfOcrError::NotFound { .. } => ErrorCode::NotFound,
            PdfOcrError::NotReady { .. }
            | PdfOcrError::JobActive { .. }
            | PdfOcrError::JobFinalized { .. } => ErrorCode::InvalidState,
            PdfOcrError::QueueFull { .. } => ErrorCode::QueueFull,
            PdfOcrError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            PdfOcrError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Diagnostic excerpt attached to the error, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            PdfOcrError::EngineFailure { tail, .. } if !tail.is_empty() => Some(tail),
            _ => None,
        }
    }
}

/// Machine-readable error classification recorded on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DependencyMissing,
    InvalidDocument,
    EmptyDocument,
    TooManyPages,
    FileTooLarge,
    EngineFailure,
    EngineTimeout,
    MergeFailure,
    IoError,
    Cancelled,
    NotFound,
    InvalidState,
    QueueFull,
    InvalidConfig,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DependencyMissing => "dependency_missing",
            ErrorCode::InvalidDocument => "invalid_document",
            ErrorCode::EmptyDocument => "empty_document",
            ErrorCode::TooManyPages => "too_many_pages",
            ErrorCode::FileTooLarge => "file_too_large",
            ErrorCode::EngineFailure => "engine_failure",
            ErrorCode::EngineTimeout => "engine_timeout",
            ErrorCode::MergeFailure => "merge_failure",
            ErrorCode::IoError => "io_error",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::QueueFull => "queue_full",
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error recorded on a job that ended in the `error` state.
///
/// Cloned out of the registry on every status poll, so it owns plain
/// strings rather than the original [`PdfOcrError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    /// Bounded engine output excerpt, when the failure came from the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl From<&PdfOcrError> for JobError {
    fn from(err: &PdfOcrError) -> Self {
        JobError {
            code: err.code(),
            message: err.to_string(),
            diagnostic: err.diagnostic().map(str::to_string),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
