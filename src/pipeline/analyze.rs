//! Document analysis: validate the input and report what the planner needs.
//!
//! The signature check runs before pdfium ever sees the file, so a renamed
//! JPEG or an HTML error page fails with a clear `InvalidDocument` instead of
//! a parser error.

use crate::error::PdfOcrError;
use crate::pipeline::document::{run_blocking, SharedBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Every PDF starts with this header (`%PDF-1.7`, `%PDF-2.0`, ...).
pub const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// Facts about a source document gathered before planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub file_size: u64,
    /// `Some(true)` when every page already has extractable text; `None`
    /// when the text layer was not checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_layer: Option<bool>,
}

/// Validate `path` and report its page count, size and text-layer status.
///
/// Read-only. Fails with `InvalidDocument` for a wrong signature or an
/// unparsable structure and with `EmptyDocument` for a zero-page PDF.
pub async fn analyze(backend: &SharedBackend, path: &Path) -> Result<DocumentInfo, PdfOcrError> {
    analyze_with(backend, path, true).await
}

/// Like [`analyze`] but without text extraction, so a page whose text
/// cannot be read does not fail a job that is going to recognise it anyway.
pub async fn analyze_structure(
    backend: &SharedBackend,
    path: &Path,
) -> Result<DocumentInfo, PdfOcrError> {
    analyze_with(backend, path, false).await
}

async fn analyze_with(
    backend: &SharedBackend,
    path: &Path,
    probe_text: bool,
) -> Result<DocumentInfo, PdfOcrError> {
    let file_size = check_signature(path).await?;

    let owned = path.to_path_buf();
    let page_count = run_blocking(backend, move |b| b.page_count(&owned)).await?;
    if page_count == 0 {
        return Err(PdfOcrError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    let text_layer = if probe_text {
        let owned = path.to_path_buf();
        Some(run_blocking(backend, move |b| b.has_text_layer(&owned)).await?)
    } else {
        None
    };

    debug!(
        "Analyzed {}: {} pages, {} bytes, text layer: {:?}",
        path.display(),
        page_count,
        file_size,
        text_layer
    );

    Ok(DocumentInfo {
        page_count,
        file_size,
        text_layer,
    })
}

/// Check the PDF signature and return the file size in bytes.
async fn check_signature(path: &Path) -> Result<u64, PdfOcrError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| PdfOcrError::io(path, e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| PdfOcrError::io(path, e))?
        .len();

    let mut magic = [0u8; 5];
    match file.read_exact(&mut magic).await {
        Ok(_) if &magic == PDF_MAGIC => Ok(size),
        Ok(_) => Err(invalid(
            path,
            format!("unexpected leading bytes {:?}", String::from_utf8_lossy(&magic)),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(invalid(path, format!("file is only {size} bytes long")))
        }
        Err(e) => Err(PdfOcrError::io(path, e)),
    }
}

fn invalid(path: &Path, detail: String) -> PdfOcrError {
    PdfOcrError::InvalidDocument {
        path: PathBuf::from(path),
        detail,
    }
}
