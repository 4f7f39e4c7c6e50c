//! Merge processed chunks into the final document.
//!
//! The merged file is written next to the destination under a temporary
//! name, its page count is checked against the inputs, and only then is it
//! renamed into place. A reader of `destination` sees either nothing or the
//! complete document.

use crate::error::PdfOcrError;
use crate::pipeline::document::{run_blocking, SharedBackend};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of a successful merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Pages in the merged document.
    pub pages: usize,
}

/// Concatenate `inputs` in order into `destination`.
pub async fn merge(
    backend: &SharedBackend,
    inputs: &[PathBuf],
    destination: &Path,
) -> Result<MergeReport, PdfOcrError> {
    if inputs.is_empty() {
        return Err(PdfOcrError::MergeFailure {
            detail: "no processed chunks to merge".into(),
        });
    }
    for input in inputs {
        if tokio::fs::metadata(input).await.is_err() {
            return Err(PdfOcrError::MergeFailure {
                detail: format!("processed chunk '{}' is missing", input.display()),
            });
        }
    }

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| PdfOcrError::io(&parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".merge-")
        .suffix(".pdf")
        .tempfile_in(&parent)
        .map_err(|e| PdfOcrError::io(&parent, e))?;
    let staging_path = staging.path().to_path_buf();

    let sources = inputs.to_vec();
    let target = staging_path.clone();
    let (expected, actual) = run_blocking(backend, move |b| {
        let mut expected = 0;
        for source in &sources {
            expected += b
                .page_count(source)
                .map_err(|e| PdfOcrError::MergeFailure {
                    detail: format!("cannot read '{}': {}", source.display(), e),
                })?;
        }
        b.concatenate(&sources, &target)?;
        let actual = b.page_count(&target).map_err(|e| PdfOcrError::MergeFailure {
            detail: format!("merged output is unreadable: {}", e),
        })?;
        Ok((expected, actual))
    })
    .await?;

    if expected != actual {
        return Err(PdfOcrError::MergeFailure {
            detail: format!("merged document has {actual} pages, chunks have {expected}"),
        });
    }

    staging
        .persist(destination)
        .map_err(|e| PdfOcrError::io(destination, e.error))?;

    debug!("Merged {} chunks from {}", inputs.len(), staging_path.display());
    info!("Wrote {} ({} pages)", destination.display(), actual);
    Ok(MergeReport { pages: actual })
}

/// Publish a copy of `source` at `destination`, atomically.
///
/// Used when the document needs no recognition at all.
pub async fn publish_copy(source: &Path, destination: &Path) -> Result<(), PdfOcrError> {
    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| PdfOcrError::io(&parent, e))?;

    let staging = tempfile::Builder::new()
        .prefix(".copy-")
        .suffix(".pdf")
        .tempfile_in(&parent)
        .map_err(|e| PdfOcrError::io(&parent, e))?;
    tokio::fs::copy(source, staging.path())
        .await
        .map_err(|e| PdfOcrError::io(source, e))?;
    staging
        .persist(destination)
        .map_err(|e| PdfOcrError::io(destination, e.error))?;
    Ok(())
}
