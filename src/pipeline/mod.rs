//! Pipeline stages for chunked OCR.
//!
//! Each submodule implements one step; the state machine that sequences them
//! lives in [`crate::orchestrator`].
//!
//! ## Data Flow
//!
//! ```text
//! source.pdf ──▶ analyze ──▶ plan ──▶ ┌ extract_range ─▶ engine ┐ ──▶ merge ──▶ <stem>_OCR.pdf
//!               (pdfium)             └───── per chunk, in order ┘   (atomic)
//! ```
//!
//! 1. [`analyze`]   — check the `%PDF-` signature, count pages, probe for text
//! 2. [`plan`]      — partition pages into chunks, smaller for large inputs
//! 3. [`document`]  — the pdfium-backed split/concatenate collaborator; every
//!    call runs in `spawn_blocking`
//! 4. [`engine`]    — run the recognition engine as a child process with a
//!    timeout and a bounded diagnostic tail
//! 5. [`merge`]     — concatenate chunk artifacts and rename into place
//! 6. [`workspace`] — per-job temp directory holding intermediate files

pub mod analyze;
pub mod document;
pub mod engine;
pub mod merge;
pub mod plan;
pub mod workspace;
