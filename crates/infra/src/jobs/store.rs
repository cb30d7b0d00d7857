//! Job storage contract and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use jobgate_core::{JobId, UserId};

use super::types::{InvalidTransition, Job, JobStatus};

/// Job store abstraction.
///
/// Implementations must serialize conflicting writes so that callers never
/// observe a partially applied update.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. Fails with `AlreadyExists` on a duplicate id.
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Move a job to `status`. Only forward transitions are accepted.
    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<(), JobStoreError>;

    /// Attach the error text of a failed run to the job.
    async fn record_error(&self, id: JobId, message: &str) -> Result<(), JobStoreError>;

    /// Atomically claim the oldest queued job, marking it running.
    /// Returns None if no jobs are queued.
    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// All jobs owned by `user_id`, oldest first.
    async fn list_for_owner(&self, user_id: UserId) -> Result<Vec<Job>, JobStoreError>;

    /// Put every running job back in the queue. Used at startup only, when no
    /// worker can legitimately hold a job.
    async fn requeue_stranded(&self) -> Result<usize, JobStoreError>;

    /// Get job statistics.
    async fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {id}: {source}")]
    InvalidTransition {
        id: JobId,
        #[source]
        source: InvalidTransition,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    /// Integrity errors signal a programming error rather than an outage.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            JobStoreError::AlreadyExists(_) | JobStoreError::InvalidTransition { .. }
        )
    }
}

/// Job statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl JobStats {
    pub(crate) fn add(&mut self, status: JobStatus, n: usize) {
        match status {
            JobStatus::Queued => self.queued += n,
            JobStatus::Running => self.running += n,
            JobStatus::Succeeded => self.succeeded += n,
            JobStatus::Failed => self.failed += n,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.running + self.succeeded + self.failed
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    jobs: HashMap<JobId, Entry>,
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.jobs.insert(
            job.id,
            Entry {
                seq,
                job: job.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.jobs.get(&id).map(|e| e.job.clone()))
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let entry = inner.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        entry
            .job
            .transition(status)
            .map_err(|source| JobStoreError::InvalidTransition { id, source })
    }

    async fn record_error(&self, id: JobId, message: &str) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let entry = inner.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        entry.job.error = Some(message.to_string());
        entry.job.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;

        // Oldest queued job by insertion order
        let next = inner
            .jobs
            .values_mut()
            .filter(|e| e.job.status == JobStatus::Queued)
            .min_by_key(|e| e.seq);

        match next {
            Some(entry) => {
                let id = entry.job.id;
                entry
                    .job
                    .transition(JobStatus::Running)
                    .map_err(|source| JobStoreError::InvalidTransition { id, source })?;
                Ok(Some(entry.job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn list_for_owner(&self, user_id: UserId) -> Result<Vec<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut entries: Vec<_> = inner
            .jobs
            .values()
            .filter(|e| e.job.is_owned_by(user_id))
            .collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries.into_iter().map(|e| e.job.clone()).collect())
    }

    async fn requeue_stranded(&self) -> Result<usize, JobStoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let now = Utc::now();
        let mut count = 0;
        for entry in inner.jobs.values_mut() {
            if entry.job.status == JobStatus::Running {
                entry.job.status = JobStatus::Queued;
                entry.job.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut stats = JobStats::default();
        for entry in inner.jobs.values() {
            stats.add(entry.job.status, 1);
        }
        Ok(stats)
    }
}

#[async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).insert(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id).await
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<(), JobStoreError> {
        (**self).update_status(id, status).await
    }

    async fn record_error(&self, id: JobId, message: &str) -> Result<(), JobStoreError> {
        (**self).record_error(id, message).await
    }

    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next().await
    }

    async fn list_for_owner(&self, user_id: UserId) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_for_owner(user_id).await
    }

    async fn requeue_stranded(&self) -> Result<usize, JobStoreError> {
        (**self).requeue_stranded().await
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats().await
    }
}
