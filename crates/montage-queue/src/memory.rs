//! In-process job store.
//!
//! Same contract as the Postgres store, backed by a mutex-guarded map. The
//! mutex makes every claim trivially atomic, which is exactly the locking
//! guarantee the contract asks for. Used by tests and by embedders that can
//! live without durability.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

use montage_models::{Job, JobId, JobPayload, JobStatus, QualityTier};

use crate::error::QueueResult;
use crate::store::{JobStore, QueueStats};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Enqueue order; breaks `created_at` ties deterministically.
    order: Vec<JobId>,
}

/// In-memory [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(
        &self,
        user_id: &str,
        project_id: &str,
        quality_tier: QualityTier,
        payload: JobPayload,
    ) -> QueueResult<JobId> {
        let job = Job::new(user_id, project_id, quality_tier, payload);
        let id = job.id;

        let mut inner = self.inner.lock().await;
        inner.jobs.insert(id, job);
        inner.order.push(id);
        Ok(id)
    }

    async fn claim_next(&self) -> QueueResult<Option<Job>> {
        let mut inner = self.inner.lock().await;

        let next = inner
            .order
            .iter()
            .copied()
            .find(|id| {
                inner
                    .jobs
                    .get(id)
                    .is_some_and(|j| j.status == JobStatus::Pending)
            });

        let Some(id) = next else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&id).expect("ordered id present");
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        Ok(Some(job.clone()))
    }

    async fn update_progress(
        &self,
        id: JobId,
        current: u32,
        total: u32,
        message: &str,
    ) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&id) {
            if !job.is_terminal() {
                job.progress.current = current;
                job.progress.total = total;
                job.progress.message = Some(message.to_string());
            }
        }
        Ok(())
    }

    async fn complete(&self, id: JobId, result_ref: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            warn!(job_id = %id, "complete() for unknown job");
            return Ok(());
        };

        match job.status {
            JobStatus::Processing => {
                job.status = JobStatus::Completed;
                job.result_ref = Some(result_ref.to_string());
                job.completed_at = Some(Utc::now());
                job.progress.current = job.progress.total;
            }
            JobStatus::Completed => {
                // Idempotent; the first completed_at wins.
            }
            other => {
                warn!(job_id = %id, status = %other, "complete() ignored for job not in processing");
            }
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, message: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            warn!(job_id = %id, "fail() for unknown job");
            return Ok(());
        };

        match job.status {
            JobStatus::Processing => {
                job.status = JobStatus::Failed;
                job.error_message = Some(message.to_string());
                job.completed_at = Some(Utc::now());
            }
            JobStatus::Failed => {}
            other => {
                warn!(job_id = %id, status = %other, "fail() ignored for job not in processing");
            }
        }
        Ok(())
    }

    async fn cancel(&self, id: JobId, user_id: &str) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(false);
        };

        if job.user_id != user_id || job.status != JobStatus::Pending {
            return Ok(false);
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn get(&self, id: JobId, user_id: &str) -> QueueResult<Option<Job>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .get(&id)
            .filter(|j| j.user_id == user_id)
            .cloned())
    }

    async fn queue_position(&self, id: JobId) -> QueueResult<Option<u64>> {
        let inner = self.inner.lock().await;

        let Some(job) = inner.jobs.get(&id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Pending {
            return Ok(None);
        }

        let earlier = inner
            .order
            .iter()
            .take_while(|other| **other != id)
            .filter(|other| {
                inner
                    .jobs
                    .get(other)
                    .is_some_and(|j| j.status == JobStatus::Pending)
            })
            .count() as u64;

        Ok(Some(1 + earlier))
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let inner = self.inner.lock().await;
        let mut stats = QueueStats::default();
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn fail_stale(&self, older_than: Duration, message: &str) -> QueueResult<u64> {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return Ok(0);
        };

        let mut inner = self.inner.lock().await;
        let mut swept = 0u64;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Processing
                && job.started_at.is_some_and(|t| t < cutoff)
            {
                job.status = JobStatus::Failed;
                job.error_message = Some(message.to_string());
                job.completed_at = Some(Utc::now());
                swept += 1;
            }
        }
        Ok(swept)
    }
}
