//! Configuration types for the chunked OCR pipeline.
//!
//! All pipeline behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. One struct holds every knob so a config can be shared
//! across worker tasks, serialised for logging, and compared between runs.
//!
//! The library never reads environment variables for these values; the
//! `pdfocr` binary maps its flags (and their env fallbacks) onto the builder.

use crate::error::PdfOcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tesseract language spec: one or more codes joined with `+` (`eng`,
/// `spa+eng`, `chi_sim`).
static LANGUAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+(\+[A-Za-z0-9_]+)*$").unwrap());

/// Configuration for the OCR service and its pipeline runs.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfocr::OcrConfig;
///
/// let config = OcrConfig::builder()
///     .language("eng")
///     .pages_per_chunk(20)
///     .chunk_timeout_secs(600)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Base number of pages per chunk. Default: 25.
    ///
    /// Each chunk is one engine invocation. Smaller chunks bound the engine's
    /// peak memory and make progress reporting finer, at the cost of more
    /// process start-ups and a larger merge.
    pub pages_per_chunk: usize,

    /// Wall-clock budget for one engine invocation, in seconds. Default: 1200.
    ///
    /// Applies per chunk, not per job: a job's total runtime is bounded by
    /// `chunks × chunk_timeout_secs`.
    pub chunk_timeout_secs: u64,

    /// Hard ceiling on document page count. Default: 300.
    pub max_pages_total: usize,

    /// Largest accepted input file, in bytes. Default: 50 MiB.
    pub max_input_bytes: u64,

    /// File size above which the reduced chunk size applies. Default: 25 MiB.
    pub large_file_bytes: u64,

    /// Page count above which the reduced chunk size applies. Default: 150.
    pub large_page_count: usize,

    /// Upper bound on chunk size for large documents. Default: 15.
    pub reduced_chunk_size: usize,

    /// Jobs allowed to run at the same time. Default: 2.
    ///
    /// Recognition engines are CPU and memory heavy; each running job has
    /// exactly one engine process in flight.
    pub max_concurrent_jobs: usize,

    /// Jobs allowed to wait for a worker slot. Default: 16.
    ///
    /// Submissions beyond `max_concurrent_jobs + max_pending_jobs` are
    /// rejected with [`PdfOcrError::QueueFull`].
    pub max_pending_jobs: usize,

    /// Parent directory for per-job temporary workspaces.
    /// If None, uses the system temp directory.
    pub work_dir: Option<PathBuf>,

    /// Explicit path to the pdfium shared library.
    /// If None, `PDFIUM_LIB_PATH` and then the system library are tried.
    pub pdfium_library: Option<PathBuf>,

    /// What to do with documents that already carry a text layer.
    pub existing_text: ExistingTextPolicy,

    /// Options passed to the recognition engine for every chunk.
    pub engine: EngineOptions,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            pages_per_chunk: 25,
            chunk_timeout_secs: 1200,
            max_pages_total: 300,
            max_input_bytes: 50 * 1024 * 1024,
            large_file_bytes: 25 * 1024 * 1024,
            large_page_count: 150,
            reduced_chunk_size: 15,
            max_concurrent_jobs: 2,
            max_pending_jobs: 16,
            work_dir: None,
            pdfium_library: None,
            existing_text: ExistingTextPolicy::default(),
            engine: EngineOptions::default(),
        }
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-chunk engine timeout as a [`Duration`].
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    /// Total number of jobs (running + waiting) the service accepts.
    pub fn capacity(&self) -> usize {
        self.max_concurrent_jobs + self.max_pending_jobs
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.engine.language = language.into();
        self
    }

    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n;
        self
    }

    pub fn chunk_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chunk_timeout_secs = secs;
        self
    }

    pub fn max_pages_total(mut self, n: usize) -> Self {
        self.config.max_pages_total = n;
        self
    }

    pub fn max_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn large_file_bytes(mut self, bytes: u64) -> Self {
        self.config.large_file_bytes = bytes;
        self
    }

    pub fn large_page_count(mut self, n: usize) -> Self {
        self.config.large_page_count = n;
        self
    }

    pub fn reduced_chunk_size(mut self, n: usize) -> Self {
        self.config.reduced_chunk_size = n;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn max_pending_jobs(mut self, n: usize) -> Self {
        self.config.max_pending_jobs = n;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn existing_text(mut self, policy: ExistingTextPolicy) -> Self {
        self.config.existing_text = policy;
        self
    }

    pub fn text_layer(mut self, mode: TextLayerMode) -> Self {
        self.config.engine.text_layer = mode;
        self
    }

    pub fn optimize(mut self, level: u8) -> Self {
        self.config.engine.optimize = level;
        self
    }

    pub fn deskew(mut self, v: bool) -> Self {
        self.config.engine.deskew = v;
        self
    }

    pub fn rotate_pages(mut self, v: bool) -> Self {
        self.config.engine.rotate_pages = v;
        self
    }

    pub fn clean_final(mut self, v: bool) -> Self {
        self.config.engine.clean_final = v;
        self
    }

    pub fn engine(mut self, engine: EngineOptions) -> Self {
        self.config.engine = engine;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, PdfOcrError> {
        let c = &self.config;
        if c.pages_per_chunk == 0 {
            return Err(PdfOcrError::InvalidConfig(
                "pages_per_chunk must be ≥ 1".into(),
            ));
        }
        if c.reduced_chunk_size == 0 {
            return Err(PdfOcrError::InvalidConfig(
                "reduced_chunk_size must be ≥ 1".into(),
            ));
        }
        if c.max_pages_total == 0 {
            return Err(PdfOcrError::InvalidConfig(
                "max_pages_total must be ≥ 1".into(),
            ));
        }
        if c.max_input_bytes == 0 {
            return Err(PdfOcrError::InvalidConfig(
                "max_input_bytes must be ≥ 1".into(),
            ));
        }
        if c.chunk_timeout_secs == 0 {
            return Err(PdfOcrError::InvalidConfig(
                "chunk_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.engine.optimize > 3 {
            return Err(PdfOcrError::InvalidConfig(format!(
                "optimize level must be 0–3, got {}",
                c.engine.optimize
            )));
        }
        validate_language(&c.engine.language)?;
        Ok(self.config)
    }
}

/// Reject language specs that are not plain tesseract codes.
///
/// The value ends up as a separate argv entry, so this is not about shell
/// quoting; it keeps option-looking strings like `--foo` away from the engine.
pub fn validate_language(lang: &str) -> Result<(), PdfOcrError> {
    if lang.len() > 64 || !LANGUAGE_RE.is_match(lang) {
        return Err(PdfOcrError::InvalidConfig(format!(
            "invalid OCR language '{lang}': expected codes like 'eng' or 'spa+eng'"
        )));
    }
    Ok(())
}

// ── Engine options ───────────────────────────────────────────────────────

/// Options forwarded to the recognition engine for every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Tesseract language spec. Default: `spa+eng`.
    pub language: String,
    /// How pages that already have text are treated. Default: skip them.
    pub text_layer: TextLayerMode,
    /// Straighten skewed scans. Default: true.
    pub deskew: bool,
    /// Fix page orientation. Default: true.
    pub rotate_pages: bool,
    /// Keep the cleaned page image in the output. Default: false.
    ///
    /// Off by default: the output must keep the original visual content.
    pub clean_final: bool,
    /// Output optimisation level, 0–3. Default: 1 (lossless).
    pub optimize: u8,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            language: "spa+eng".to_string(),
            text_layer: TextLayerMode::default(),
            deskew: true,
            rotate_pages: true,
            clean_final: false,
            optimize: 1,
        }
    }
}

/// Engine policy for pages that already contain a text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextLayerMode {
    /// Leave pages with text untouched; OCR the rest. (default)
    #[default]
    SkipText,
    /// Strip previous OCR text and recognise again; keeps born-digital text.
    RedoOcr,
    /// Rasterise and recognise every page, whatever it contains.
    ForceOcr,
}

/// Pipeline policy for documents whose pages all carry extractable text.
///
/// | Policy | Output | Cost |
/// |--------|--------|------|
/// | `Recognize` | engine output for every chunk | full OCR run |
/// | `ReuseWhenPresent` | byte copy of the input | one page scan |
///
/// `ReuseWhenPresent` trusts whatever text the document already has, even if
/// it came from a poor earlier OCR pass. `Recognize` with
/// [`TextLayerMode::SkipText`] reaches a similar result for born-digital
/// pages but still pays for splitting, engine start-up, and merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingTextPolicy {
    /// Always run the engine. (default)
    #[default]
    Recognize,
    /// Skip the engine when every page already has text.
    ReuseWhenPresent,
}
