//! Document manipulation: page counting, splitting, and concatenation.
//!
//! ## Why a trait?
//!
//! The orchestrator needs four operations from a PDF library (open, count,
//! extract a page range, concatenate). Putting them behind
//! [`DocumentBackend`] keeps pdfium out of the state machine and lets tests
//! drive the full pipeline with an in-memory fake.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; every call is blocking
//! and CPU-bound. [`run_blocking`] moves backend calls onto Tokio's blocking
//! pool so worker tasks never stall the async executor.

use crate::error::PdfOcrError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Environment variable naming an existing pdfium library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Split/merge collaborator used by the analyzer, the chunk loop and the
/// merge step. All methods block.
pub trait DocumentBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fail with [`PdfOcrError::DependencyMissing`] if the backend cannot run.
    fn check_available(&self) -> Result<(), PdfOcrError>;

    /// Number of pages, or [`PdfOcrError::InvalidDocument`] if unparsable.
    fn page_count(&self, path: &Path) -> Result<usize, PdfOcrError>;

    /// True when every page already has extractable text.
    fn has_text_layer(&self, path: &Path) -> Result<bool, PdfOcrError>;

    /// Write pages `[start, end)` of `source` to a new document at `dest`.
    fn extract_range(
        &self,
        source: &Path,
        start: usize,
        end: usize,
        dest: &Path,
    ) -> Result<(), PdfOcrError>;

    /// Write all pages of `sources`, in order, to a new document at `dest`.
    fn concatenate(&self, sources: &[PathBuf], dest: &Path) -> Result<(), PdfOcrError>;
}

/// Shared handle used across worker tasks.
pub type SharedBackend = Arc<dyn DocumentBackend>;

/// Run a blocking backend call on Tokio's blocking pool.
pub async fn run_blocking<T, F>(backend: &SharedBackend, f: F) -> Result<T, PdfOcrError>
where
    T: Send + 'static,
    F: FnOnce(&dyn DocumentBackend) -> Result<T, PdfOcrError> + Send + 'static,
{
    let backend = Arc::clone(backend);
    tokio::task::spawn_blocking(move || f(backend.as_ref()))
        .await
        .map_err(|e| PdfOcrError::Internal(format!("Document task panicked: {}", e)))?
}

// ── pdfium ───────────────────────────────────────────────────────────────

#[cfg(target_os = "macos")]
const PDFIUM_LIB_NAME: &str = "libpdfium.dylib";
#[cfg(target_os = "windows")]
const PDFIUM_LIB_NAME: &str = "pdfium.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PDFIUM_LIB_NAME: &str = "libpdfium.so";

/// [`DocumentBackend`] backed by pdfium-render.
///
/// The library is located, in order, at the configured path,
/// `$PDFIUM_LIB_PATH`, or the system library search path. A directory is
/// accepted in place of a file and the platform library name appended.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }

    fn library_path(&self) -> Option<PathBuf> {
        let path = self
            .library
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from))?;
        if path.is_dir() {
            Some(path.join(PDFIUM_LIB_NAME))
        } else {
            Some(path)
        }
    }

    fn bind(&self) -> Result<Pdfium, PdfOcrError> {
        let bindings = match self.library_path() {
            Some(path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(&path)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| {
            debug!("pdfium bind failed: {:?}", e);
            PdfOcrError::DependencyMissing {
                tools: vec!["pdfium".to_string()],
            }
        })?;
        Ok(Pdfium::new(bindings))
    }
}

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, PdfOcrError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| PdfOcrError::InvalidDocument {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

impl DocumentBackend for PdfiumBackend {
    fn name(&self) -> &str {
        "pdfium"
    }

    fn check_available(&self) -> Result<(), PdfOcrError> {
        self.bind().map(|_| ())
    }

    fn page_count(&self, path: &Path) -> Result<usize, PdfOcrError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, path)?;
        Ok(document.pages().len() as usize)
    }

    fn has_text_layer(&self, path: &Path) -> Result<bool, PdfOcrError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, path)?;
        let pages = document.pages();
        if pages.len() == 0 {
            return Ok(false);
        }
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| PdfOcrError::InvalidDocument {
                path: path.to_path_buf(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;
            if text.all().trim().is_empty() {
                debug!("Page {} has no text layer", idx + 1);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn extract_range(
        &self,
        source: &Path,
        start: usize,
        end: usize,
        dest: &Path,
    ) -> Result<(), PdfOcrError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, source)?;
        let total = document.pages().len() as usize;
        if start >= end || end > total {
            return Err(PdfOcrError::Internal(format!(
                "page range [{start}, {end}) outside document of {total} pages"
            )));
        }

        let mut chunk = pdfium
            .create_new_pdf()
            .map_err(|e| PdfOcrError::Internal(format!("create_new_pdf: {:?}", e)))?;
        chunk
            .pages_mut()
            .copy_page_range_from_document(
                &document,
                (start as PdfPageIndex)..=((end - 1) as PdfPageIndex),
                0,
            )
            .map_err(|e| PdfOcrError::Internal(format!("copy pages {start}..{end}: {:?}", e)))?;
        chunk
            .save_to_file(dest)
            .map_err(|e| PdfOcrError::Internal(format!("save {}: {:?}", dest.display(), e)))?;

        debug!("Extracted pages {}..{} → {}", start + 1, end, dest.display());
        Ok(())
    }

    fn concatenate(&self, sources: &[PathBuf], dest: &Path) -> Result<(), PdfOcrError> {
        let pdfium = self.bind()?;
        let mut merged = pdfium
            .create_new_pdf()
            .map_err(|e| PdfOcrError::Internal(format!("create_new_pdf: {:?}", e)))?;

        for source in sources {
            let part = pdfium
                .load_pdf_from_file(source, None)
                .map_err(|e| PdfOcrError::MergeFailure {
                    detail: format!("cannot read '{}': {:?}", source.display(), e),
                })?;
            merged
                .pages_mut()
                .append(&part)
                .map_err(|e| PdfOcrError::MergeFailure {
                    detail: format!("cannot append '{}': {:?}", source.display(), e),
                })?;
        }

        merged
            .save_to_file(dest)
            .map_err(|e| PdfOcrError::MergeFailure {
                detail: format!("cannot write '{}': {:?}", dest.display(), e),
            })
    }
}
