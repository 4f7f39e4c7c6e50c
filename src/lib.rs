//! # edgequake-pdfocr
//!
//! Make scanned PDFs searchable by adding a text layer, one chunk of pages
//! at a time.
//!
//! ## Why chunks?
//!
//! OCR engines hold the whole document in memory and give no feedback until
//! they finish. A 300-page scan can take tens of minutes and gigabytes of
//! RAM in one invocation. This crate splits the document into page ranges,
//! runs the engine on each range as a separate bounded process, and merges
//! the results, so memory stays flat, progress is observable, and a failure
//! names the chunk it happened in.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Preflight  engine tools present? pdfium loadable?
//!  ├─ 2. Analyze    %PDF- signature, page count, size
//!  ├─ 3. Ceiling    reject documents above max_pages_total
//!  ├─ 4. Plan       25-page chunks (15 for large inputs)
//!  ├─ 5. Chunks     split → ocrmypdf, strictly in order, per-chunk timeout
//!  └─ 6. Merge      concatenate, verify page count, atomic rename
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfocr::{OcrConfig, OcrService, JobStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder().language("eng").build()?;
//!     let service = OcrService::new(config);
//!
//!     let id = service.submit("scan.pdf", "scan_OCR.pdf").await?;
//!     let job = service.wait(&id).await?;
//!     if job.status == JobStatus::Completed {
//!         println!("{}", service.retrieve(&id).await?.display());
//!     } else if let Some(err) = job.error {
//!         eprintln!("{err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! The default engine shells out to `ocrmypdf`, which in turn needs
//! `tesseract` (with the configured language packs), `qpdf` and `gs`.
//! Splitting and merging use pdfium, loaded at runtime from
//! `OcrConfig::pdfium_library`, `$PDFIUM_LIB_PATH`, or the system library path.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineOptions, ExistingTextPolicy, OcrConfig, OcrConfigBuilder, TextLayerMode};
pub use error::{ErrorCode, JobError, PdfOcrError};
pub use job::{Job, JobId, JobStatus, JobStatusView};
pub use pipeline::analyze::{analyze, analyze_structure, DocumentInfo};
pub use pipeline::document::{DocumentBackend, PdfiumBackend, SharedBackend};
pub use pipeline::engine::{ChunkJob, OcrEngine, OcrmypdfEngine, SharedEngine};
pub use pipeline::merge::MergeReport;
pub use pipeline::plan::{ChunkPlan, ChunkPolicy, ChunkRange};
pub use registry::JobRegistry;
pub use service::{default_output_path, OcrService};
