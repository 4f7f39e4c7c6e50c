//! The OCR service: job submission, polling, retrieval, cancellation.
//!
//! Each submission becomes one tokio task. A service-wide semaphore bounds
//! how many of those tasks run the pipeline at once; the rest wait in the
//! `queued` state. Submissions beyond the running + waiting capacity are
//! refused with [`PdfOcrError::QueueFull`] instead of piling up.

use crate::config::OcrConfig;
use crate::error::PdfOcrError;
use crate::job::{Job, JobId, JobStatus, JobStatusView};
use crate::orchestrator::{record_failure, run_job, PipelineContext};
use crate::pipeline::document::{PdfiumBackend, SharedBackend};
use crate::pipeline::engine::{OcrmypdfEngine, SharedEngine};
use crate::registry::JobRegistry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Suffix appended to the input stem to name the searchable output.
pub const OUTPUT_SUFFIX: &str = "_OCR";

/// Chunked OCR job service.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfocr::{OcrConfig, OcrService};
///
/// # async fn run() -> Result<(), edgequake_pdfocr::PdfOcrError> {
/// let service = OcrService::new(OcrConfig::default());
/// let id = service.submit("scan.pdf", "scan_OCR.pdf").await?;
/// let job = service.wait(&id).await?;
/// println!("{}: {}", job.status, job.message);
/// # Ok(())
/// # }
/// ```
pub struct OcrService {
    ctx: PipelineContext,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    tokens: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
}

impl OcrService {
    /// Service using `ocrmypdf` and pdfium.
    pub fn new(config: OcrConfig) -> Self {
        let backend = Arc::new(PdfiumBackend::new(config.pdfium_library.clone()));
        Self::with_components(config, Arc::new(OcrmypdfEngine::default()), backend)
    }

    /// Service using the given engine and document backend.
    pub fn with_components(config: OcrConfig, engine: SharedEngine, backend: SharedBackend) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            ctx: PipelineContext {
                config: Arc::new(config),
                engine,
                backend,
                registry: Arc::new(JobRegistry::new()),
            },
            permits,
            in_flight: Arc::new(AtomicUsize::new(0)),
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.ctx.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.ctx.registry
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.ctx.engine
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.ctx.backend
    }

    /// Jobs accepted and not yet finished (running or waiting).
    pub fn jobs_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register a job for `input` and start it in the background.
    ///
    /// Returns as soon as the job is recorded as `queued`.
    pub async fn submit(
        &self,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Result<JobId, PdfOcrError> {
        let capacity = self.ctx.config.capacity();
        if self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_err()
        {
            return Err(PdfOcrError::QueueFull { capacity });
        }
        let slot = InFlightSlot(Arc::clone(&self.in_flight));

        let id = JobId::new();
        self.ctx
            .registry
            .create(Job::new(id, input.into(), output.into()))
            .await?;
        let token = CancellationToken::new();
        self.tokens.write().await.insert(id, token.clone());

        let ctx = self.ctx.clone();
        let permits = Arc::clone(&self.permits);
        let tokens = Arc::clone(&self.tokens);
        tokio::spawn(async move {
            let _slot = slot;
            let worker = {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _permit = tokio::select! {
                        permit = permits.acquire_owned() => match permit {
                            Ok(p) => p,
                            Err(_) => {
                                let err = PdfOcrError::Internal("worker pool closed".into());
                                record_failure(&ctx.registry, id, &err).await;
                                return;
                            }
                        },
                        _ = token.cancelled() => {
                            let err = PdfOcrError::Cancelled { stage: "start".into() };
                            record_failure(&ctx.registry, id, &err).await;
                            return;
                        }
                    };
                    run_job(&ctx, id, token).await;
                })
            };

            // A panic anywhere in the pipeline surfaces here.
            if let Err(e) = worker.await {
                error!("Worker for job {} died: {}", id, e);
                let err = PdfOcrError::Internal(format!("worker task failed: {e}"));
                record_failure(&ctx.registry, id, &err).await;
            }
            tokens.write().await.remove(&id);
        });

        info!("Submitted job {}", id);
        Ok(id)
    }

    pub async fn status(&self, id: &JobId) -> Result<JobStatusView, PdfOcrError> {
        self.ctx
            .registry
            .get(id)
            .await
            .map(|job| JobStatusView::from(&job))
    }

    /// Path of the finished output. Only available once the job completed.
    pub async fn retrieve(&self, id: &JobId) -> Result<PathBuf, PdfOcrError> {
        let job = self.ctx.registry.get(id).await?;
        if job.status == JobStatus::Completed {
            Ok(job.output_path)
        } else {
            Err(PdfOcrError::NotReady {
                id: id.to_string(),
                status: job.status.to_string(),
            })
        }
    }

    /// Remove a finished job's record. Files stay where they are.
    pub async fn delete(&self, id: &JobId) -> Result<Job, PdfOcrError> {
        self.ctx.registry.delete(id).await
    }

    /// Request cancellation of a queued or running job.
    ///
    /// A queued job moves to `error` immediately. A running job stops before
    /// its next chunk (or before merging); the chunk in flight is not
    /// interrupted.
    pub async fn cancel(&self, id: &JobId) -> Result<JobStatusView, PdfOcrError> {
        let job = self.ctx.registry.get(id).await?;
        if job.status.is_terminal() {
            return Err(PdfOcrError::JobFinalized { id: id.to_string() });
        }
        if let Some(token) = self.tokens.read().await.get(id) {
            token.cancel();
        }

        let err = PdfOcrError::Cancelled {
            stage: "start".into(),
        };
        let updated = self
            .ctx
            .registry
            .update(id, |j| {
                if j.status == JobStatus::Queued {
                    j.fail((&err).into());
                }
            })
            .await;
        let job = match updated {
            Ok(job) => job,
            Err(PdfOcrError::JobFinalized { .. }) => self.ctx.registry.get(id).await?,
            Err(e) => return Err(e),
        };
        debug!("Cancellation requested for job {} ({})", id, job.status);
        Ok(JobStatusView::from(&job))
    }

    /// Resolve once the job is `completed` or `error`.
    pub async fn wait(&self, id: &JobId) -> Result<Job, PdfOcrError> {
        self.ctx.registry.wait_terminal(id).await
    }
}

/// `<dir>/<stem>_OCR.pdf` for `input`.
pub fn default_output_path(input: &Path, dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    dir.join(format!("{stem}{OUTPUT_SUFFIX}.pdf"))
}

/// Releases one unit of queue capacity when the job task ends.
struct InFlightSlot(Arc<AtomicUsize>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
