//! Per-job scratch directory for split chunks and engine artifacts.
//!
//! Backed by a [`TempDir`], so the directory and everything in it is removed
//! when the workspace is dropped, on success, on error, and during unwinding.

use crate::error::PdfOcrError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub struct JobWorkspace {
    dir: TempDir,
}

impl JobWorkspace {
    /// Create `ocrjob_*` under `parent`, or the system temp dir when `None`.
    pub fn create(parent: Option<&Path>) -> Result<Self, PdfOcrError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ocrjob_");
        let dir = match parent {
            Some(p) => {
                std::fs::create_dir_all(p).map_err(|e| PdfOcrError::io(p, e))?;
                builder.tempdir_in(p).map_err(|e| PdfOcrError::io(p, e))?
            }
            None => builder
                .tempdir()
                .map_err(|e| PdfOcrError::io(std::env::temp_dir(), e))?,
        };
        debug!("Created job workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Split-out source pages for chunk `index`.
    pub fn chunk_input(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("chunk_{index:04}.pdf"))
    }

    /// Engine output for chunk `index`.
    pub fn chunk_output(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("chunk_{index:04}_ocr.pdf"))
    }
}

impl std::fmt::Debug for JobWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobWorkspace")
            .field("path", &self.dir.path())
            .finish()
    }
}
