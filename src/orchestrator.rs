//! The per-job state machine.
//!
//! ```text
//! queued ─▶ processing ─▶ deps ─▶ analyze ─▶ ceiling ─▶ plan ─▶ chunks… ─▶ merge ─▶ completed
//!                           └─────────┴──────────┴─────────┴────────┴─────────┴──▶ error
//! ```
//!
//! [`run_job`] is the only place where a [`PdfOcrError`] becomes a job's
//! terminal state. Every step below it returns `Result` and bails with `?`;
//! the per-job [`JobWorkspace`] is owned by [`execute`] and removed when it
//! returns or unwinds.

use crate::config::{ExistingTextPolicy, OcrConfig};
use crate::error::{JobError, PdfOcrError};
use crate::job::{Job, JobId, JobStatus};
use crate::pipeline::analyze::{analyze, analyze_structure};
use crate::pipeline::document::{run_blocking, SharedBackend};
use crate::pipeline::engine::{ChunkJob, SharedEngine};
use crate::pipeline::merge::{merge, publish_copy};
use crate::pipeline::plan::{plan, ChunkPolicy, ChunkRange};
use crate::pipeline::workspace::JobWorkspace;
use crate::progress;
use crate::registry::JobRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Everything a worker needs to run one job.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<OcrConfig>,
    pub engine: SharedEngine,
    pub backend: SharedBackend,
    pub registry: Arc<JobRegistry>,
}

/// Run job `id` to a terminal state.
///
/// Never returns an error: failures are recorded on the job record.
pub async fn run_job(ctx: &PipelineContext, id: JobId, cancel: CancellationToken) {
    let span = info_span!("ocr_job", job_id = %id);
    async {
        let start = Instant::now();
        match execute(ctx, id, &cancel).await {
            Ok(pages) => {
                match ctx.registry.update(&id, |j| j.complete(pages)).await {
                    Ok(_) => info!("Job completed: {} pages in {:?}", pages, start.elapsed()),
                    Err(e) => warn!("Could not record completion: {}", e),
                }
            }
            Err(PdfOcrError::JobFinalized { .. }) => {
                debug!("Job was finalized before it started; nothing to do");
            }
            Err(e) => {
                error!("Job failed after {:?}: {}", start.elapsed(), e);
                record_failure(&ctx.registry, id, &e).await;
            }
        }
    }
    .instrument(span)
    .await
}

/// Move a non-terminal job to `error` with `err`. A job that is already
/// terminal is left untouched.
pub async fn record_failure(registry: &JobRegistry, id: JobId, err: &PdfOcrError) {
    let job_error = JobError::from(err);
    match registry.update(&id, |j| j.fail(job_error)).await {
        Ok(_) => {}
        Err(PdfOcrError::JobFinalized { .. }) => {
            debug!("Job {} already terminal; dropping error: {}", id, err)
        }
        Err(e) => warn!("Could not record failure for job {}: {}", id, e),
    }
}

/// Steps 1–8. Returns the page count of the published output.
async fn execute(
    ctx: &PipelineContext,
    id: JobId,
    cancel: &CancellationToken,
) -> Result<usize, PdfOcrError> {
    let config = ctx.config.as_ref();

    // ── Step 1: Start and check dependencies ─────────────────────────────
    let job = ctx
        .registry
        .update(&id, |j| {
            j.status = JobStatus::Processing;
            j.advance(progress::STARTED, "Checking dependencies");
        })
        .await?;
    ensure_not_cancelled(cancel, "start")?;
    check_dependencies(ctx).await?;

    // ── Step 2: Analyze ──────────────────────────────────────────────────
    // Text extraction only matters when it can skip recognition.
    let info = match config.existing_text {
        ExistingTextPolicy::ReuseWhenPresent => analyze(&ctx.backend, &job.input_path).await?,
        ExistingTextPolicy::Recognize => {
            analyze_structure(&ctx.backend, &job.input_path).await?
        }
    };
    ctx.registry
        .update(&id, |j| {
            j.total_pages = Some(info.page_count);
            j.advance(
                progress::ANALYZED,
                format!("Document has {} pages", info.page_count),
            );
        })
        .await?;

    // ── Step 3: Size and page ceilings ───────────────────────────────────
    if info.file_size > config.max_input_bytes {
        return Err(PdfOcrError::FileTooLarge {
            bytes: info.file_size,
            limit: config.max_input_bytes,
        });
    }
    if info.page_count > config.max_pages_total {
        return Err(PdfOcrError::TooManyPages {
            pages: info.page_count,
            limit: config.max_pages_total,
        });
    }

    if info.text_layer == Some(true) {
        info!("Every page already has text; publishing the input unchanged");
        ctx.registry
            .update(&id, |j| j.advance(progress::MERGING, "Document already searchable"))
            .await?;
        publish_copy(&job.input_path, &job.output_path).await?;
        return Ok(info.page_count);
    }

    // ── Step 4: Plan ─────────────────────────────────────────────────────
    let chunk_plan = plan(
        info.page_count,
        info.file_size,
        &ChunkPolicy::from_config(config),
    );
    let total = chunk_plan.len();
    info!(
        "Processing {} pages in {} chunks of up to {} pages",
        info.page_count,
        total,
        chunk_plan.chunk_size()
    );
    ctx.registry
        .update(&id, |j| {
            j.total_chunks = Some(total);
            j.advance(
                progress::CHUNKS_START,
                format!("Split into {total} chunks"),
            );
        })
        .await?;

    // ── Step 5: Chunks, strictly in order ────────────────────────────────
    let workspace = JobWorkspace::create(config.work_dir.as_deref())?;
    let mut outputs: Vec<PathBuf> = Vec::with_capacity(total);
    for chunk in chunk_plan.iter() {
        ensure_not_cancelled(cancel, &format!("chunk {}", chunk.index))?;
        ctx.registry
            .update(&id, |j| {
                j.current_chunk = Some(chunk.index);
                j.advance(
                    progress::chunk_progress(chunk.index - 1, total),
                    format!(
                        "Processing chunk {}/{} (pages {}-{})",
                        chunk.index,
                        total,
                        chunk.start + 1,
                        chunk.end
                    ),
                );
            })
            .await?;

        outputs.push(process_chunk(ctx, &job, &workspace, chunk).await?);
    }

    // ── Step 6: Merge ────────────────────────────────────────────────────
    ensure_not_cancelled(cancel, "merge")?;
    ctx.registry
        .update(&id, |j| j.advance(progress::MERGING, "Merging chunks"))
        .await?;
    let report = merge(&ctx.backend, &outputs, &job.output_path).await?;

    // ── Step 7/8: Finalize; workspace dropped here ───────────────────────
    drop(workspace);
    Ok(report.pages)
}

/// Split one chunk out of the source and run the engine on it.
async fn process_chunk(
    ctx: &PipelineContext,
    job: &Job,
    workspace: &JobWorkspace,
    chunk: &ChunkRange,
) -> Result<PathBuf, PdfOcrError> {
    let start = Instant::now();
    let input = workspace.chunk_input(chunk.index);
    let output = workspace.chunk_output(chunk.index);

    let (source, dest) = (job.input_path.clone(), input.clone());
    let (first, end) = (chunk.start, chunk.end);
    run_blocking(&ctx.backend, move |b| b.extract_range(&source, first, end, &dest)).await?;

    let result = ctx
        .engine
        .process(&ChunkJob {
            chunk: chunk.index,
            input: &input,
            output: &output,
            options: &ctx.config.engine,
            timeout: ctx.config.chunk_timeout(),
        })
        .await?;

    if let Err(e) = tokio::fs::remove_file(&input).await {
        debug!("Could not remove split chunk {}: {}", input.display(), e);
    }
    debug!(
        "Chunk {} ({} pages) done in {:?}",
        chunk.index,
        chunk.pages(),
        start.elapsed()
    );
    Ok(result)
}

/// Engine and backend checks, reported together.
async fn check_dependencies(ctx: &PipelineContext) -> Result<(), PdfOcrError> {
    debug!(
        "Checking {} engine and {} backend",
        ctx.engine.name(),
        ctx.backend.name()
    );
    let engine = ctx.engine.check_dependencies().await;
    let backend = run_blocking(&ctx.backend, |b| b.check_available()).await;

    let mut missing = Vec::new();
    for result in [engine, backend] {
        match result {
            Ok(()) => {}
            Err(PdfOcrError::DependencyMissing { tools }) => missing.extend(tools),
            Err(e) => return Err(e),
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PdfOcrError::DependencyMissing { tools: missing })
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, stage: &str) -> Result<(), PdfOcrError> {
    if cancel.is_cancelled() {
        Err(PdfOcrError::Cancelled {
            stage: stage.to_string(),
        })
    } else {
        Ok(())
    }
}
