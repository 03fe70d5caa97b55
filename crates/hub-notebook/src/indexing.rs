//! Indexing coordinator: one indexing job per notebook.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use hub_core::{
    now_millis, Backend, HubError, IndexFreshness, IndexMode, IndexingJob, JobStatus, NotebookId,
    Result,
};

use crate::store::NotebookStore;

/// Submits indexing batches and tracks the last job of each notebook.
///
/// A job moves `running -> done | failed`. Failed jobs are never retried
/// automatically; calling [`start`](Self::start) again submits a new job.
pub struct IndexingCoordinator<B: Backend> {
    store: Arc<NotebookStore<B>>,
    jobs: Mutex<HashMap<NotebookId, IndexingJob>>,
}

impl<B: Backend> IndexingCoordinator<B> {
    pub fn new(store: Arc<NotebookStore<B>>) -> Self {
        Self {
            store,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Index a snapshot of the notebook's files as one batch.
    ///
    /// Fails with a validation error for an empty snapshot and with a
    /// conflict while another job for the same notebook is running.
    pub async fn start(
        &self,
        id: NotebookId,
        files: Vec<String>,
        mode: IndexMode,
    ) -> Result<IndexingJob> {
        if files.is_empty() {
            return Err(HubError::validation(format!(
                "notebook {} has no files to index",
                id
            )));
        }

        let job = {
            let mut jobs = self.lock()?;
            reject_running(&jobs, id)?;
            let job = IndexingJob::start(id, files, mode);
            jobs.insert(id, job.clone());
            job
        };

        info!(
            notebook = %id,
            job = %job.job_id,
            files = job.files.len(),
            "Indexing started ({})",
            mode
        );

        let outcome = self
            .store
            .backend()
            .index_files(id, &job.files, mode)
            .await;

        let mut jobs = self.lock()?;
        let current = match jobs.get_mut(&id) {
            Some(current) if current.job_id == job.job_id => current,
            _ => {
                debug!(notebook = %id, job = %job.job_id, "Job was dropped while running, ignoring completion");
                return outcome.map(|_| job);
            }
        };

        current.finished_at = Some(now_millis());
        match outcome {
            Ok(()) => {
                current.status = JobStatus::Done;
                info!(notebook = %id, job = %current.job_id, "Indexing done");
                Ok(current.clone())
            }
            Err(e) => {
                current.status = JobStatus::Failed;
                current.error = Some(e.to_string());
                warn!(notebook = %id, job = %current.job_id, "Indexing failed: {}", e);
                Err(e)
            }
        }
    }

    /// Fail with a conflict if a job for the notebook is running.
    ///
    /// Lets callers refuse a duplicate start before doing any remote work.
    pub fn ensure_not_running(&self, id: NotebookId) -> Result<()> {
        reject_running(&*self.lock()?, id)
    }

    /// Snapshot of the notebook's last job.
    pub fn status(&self, id: NotebookId) -> Option<IndexingJob> {
        self.jobs.lock().ok().and_then(|jobs| jobs.get(&id).cloned())
    }

    /// How far search over the notebook can be trusted, given its current
    /// membership.
    pub fn freshness(&self, id: NotebookId, current_files: &[String]) -> IndexFreshness {
        match self.status(id) {
            None => IndexFreshness::NotIndexed,
            Some(job) => match job.status {
                JobStatus::Running => IndexFreshness::Indexing,
                JobStatus::Failed => IndexFreshness::Failed,
                JobStatus::Idle => IndexFreshness::Stale,
                JobStatus::Done if job.covers(current_files) => IndexFreshness::Fresh,
                JobStatus::Done => IndexFreshness::Stale,
            },
        }
    }

    /// Mark a finished job as outdated after a membership change.
    ///
    /// Returns whether a job was invalidated.
    pub fn invalidate(&self, id: NotebookId) -> bool {
        let Ok(mut jobs) = self.jobs.lock() else {
            return false;
        };
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Done => {
                job.status = JobStatus::Idle;
                debug!(notebook = %id, "Index invalidated, re-index required");
                true
            }
            _ => false,
        }
    }

    /// Drop the notebook's job entirely.
    pub fn forget(&self, id: NotebookId) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.remove(&id);
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<NotebookId, IndexingJob>>> {
        self.jobs
            .lock()
            .map_err(|e| HubError::storage(e.to_string()))
    }
}

fn reject_running(jobs: &HashMap<NotebookId, IndexingJob>, id: NotebookId) -> Result<()> {
    match jobs.get(&id) {
        Some(job) if job.status == JobStatus::Running => Err(HubError::conflict(format!(
            "notebook {} is already being indexed (job {})",
            id, job.job_id
        ))),
        _ => Ok(()),
    }
}
