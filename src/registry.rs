//! In-memory job registry shared by the service and its workers.
//!
//! Every operation takes the map lock exactly once, so a reader never sees a
//! half-applied update. Updates run on a copy of the record and are committed
//! only if the copy still satisfies the job invariants:
//!
//! - terminal records are frozen (only deletion is allowed),
//! - status moves along `queued → processing → completed | error`,
//! - progress and the page/chunk counters never go down,
//! - `error` is set exactly when the status is `error`.

use crate::error::PdfOcrError;
use crate::job::{Job, JobId, JobStatus};
use std::collections::HashMap;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    changed: Notify,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record. Ids come from [`JobId::new`], so a clash means a bug.
    pub async fn create(&self, job: Job) -> Result<JobId, PdfOcrError> {
        let id = job.id;
        {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&id) {
                return Err(PdfOcrError::Internal(format!("duplicate job id {id}")));
            }
            jobs.insert(id, job);
        }
        self.changed.notify_waiters();
        Ok(id)
    }

    pub async fn get(&self, id: &JobId) -> Result<Job, PdfOcrError> {
        self.jobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Apply `mutate` atomically and return the committed record.
    pub async fn update<F>(&self, id: &JobId, mutate: F) -> Result<Job, PdfOcrError>
    where
        F: FnOnce(&mut Job),
    {
        let committed = {
            let mut jobs = self.jobs.write().await;
            let current = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
            if current.status.is_terminal() {
                return Err(PdfOcrError::JobFinalized { id: id.to_string() });
            }

            let mut next = current.clone();
            mutate(&mut next);
            next.progress = next.progress.max(current.progress).min(100);
            check_update(current, &next)?;

            *current = next;
            current.clone()
        };
        self.changed.notify_waiters();
        Ok(committed)
    }

    /// Remove a terminal record and return it.
    pub async fn delete(&self, id: &JobId) -> Result<Job, PdfOcrError> {
        let removed = {
            let mut jobs = self.jobs.write().await;
            let job = jobs.get(id).ok_or_else(|| not_found(id))?;
            if !job.status.is_terminal() {
                return Err(PdfOcrError::JobActive {
                    id: id.to_string(),
                    status: job.status.to_string(),
                });
            }
            jobs.remove(id).ok_or_else(|| not_found(id))?
        };
        debug!("Deleted job {}", id);
        self.changed.notify_waiters();
        Ok(removed)
    }

    /// Resolve once the job reaches a terminal state.
    pub async fn wait_terminal(&self, id: &JobId) -> Result<Job, PdfOcrError> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.get(id).await?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            notified.await;
        }
    }

    pub async fn list(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

fn not_found(id: &JobId) -> PdfOcrError {
    PdfOcrError::NotFound { id: id.to_string() }
}

fn check_update(old: &Job, new: &Job) -> Result<(), PdfOcrError> {
    if old.id != new.id || old.input_path != new.input_path || old.output_path != new.output_path {
        return Err(PdfOcrError::Internal(format!(
            "job {}: identity fields are immutable",
            old.id
        )));
    }
    if !old.status.can_transition_to(new.status) {
        return Err(PdfOcrError::Internal(format!(
            "job {}: illegal transition {} → {}",
            old.id, old.status, new.status
        )));
    }
    if (new.status == JobStatus::Error) != new.error.is_some() {
        return Err(PdfOcrError::Internal(format!(
            "job {}: error must be set exactly when status is error",
            old.id
        )));
    }
    let counters = [
        ("total_pages", old.total_pages, new.total_pages),
        ("total_chunks", old.total_chunks, new.total_chunks),
        ("current_chunk", old.current_chunk, new.current_chunk),
        ("pages_processed", old.pages_processed, new.pages_processed),
    ];
    for (name, before, after) in counters {
        if let Some(b) = before {
            if after.is_none_or(|a| a < b) {
                return Err(PdfOcrError::Internal(format!(
                    "job {}: {name} cannot decrease",
                    old.id
                )));
            }
        }
    }
    Ok(())
}
