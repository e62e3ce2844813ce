//! The job store contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use montage_models::{Job, JobId, JobPayload, QualityTier};

use crate::error::QueueResult;

/// Aggregate queue counts by status. Eventually consistent; a snapshot may be
/// stale by the time it is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }
}

/// The exclusive gateway to job records.
///
/// All callers — producers and workers alike — mutate jobs only through this
/// trait. Transition guards live in the implementations: an operation invoked
/// against a job in the wrong state is a logged no-op, never a corruption.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new pending job. `created_at` is set by the store.
    async fn enqueue(
        &self,
        user_id: &str,
        project_id: &str,
        quality_tier: QualityTier,
        payload: JobPayload,
    ) -> QueueResult<JobId>;

    /// Atomically claim the oldest pending job for this worker.
    ///
    /// The selected job transitions to `processing` with `started_at` set.
    /// Concurrent callers never receive the same job and never wait on each
    /// other's locks. Returns `None` without blocking when nothing is pending.
    async fn claim_next(&self) -> QueueResult<Option<Job>>;

    /// Record scene-level progress. Fire-and-forget, last write wins;
    /// updates against terminal jobs are dropped.
    async fn update_progress(
        &self,
        id: JobId,
        current: u32,
        total: u32,
        message: &str,
    ) -> QueueResult<()>;

    /// Transition `processing -> completed` and store the result reference.
    ///
    /// Also forces `progress.current = progress.total`. Idempotent when the
    /// job is already completed (the first `completed_at` wins); any other
    /// state is a guarded no-op.
    async fn complete(&self, id: JobId, result_ref: &str) -> QueueResult<()>;

    /// Transition `processing -> failed` with a user-safe message.
    async fn fail(&self, id: JobId, message: &str) -> QueueResult<()>;

    /// Cancel a job that is still pending and owned by `user_id`.
    ///
    /// Returns `false` (not an error) once the job has left `pending`
    /// or when the caller does not own it.
    async fn cancel(&self, id: JobId, user_id: &str) -> QueueResult<bool>;

    /// Ownership-checked read: the full job record, or `None` when the job
    /// does not exist or is not owned by `user_id`.
    async fn get(&self, id: JobId, user_id: &str) -> QueueResult<Option<Job>>;

    /// Advisory 1-based position among pending jobs, computed as one plus the
    /// count of pending jobs created earlier. `None` once the job has left
    /// `pending`.
    async fn queue_position(&self, id: JobId) -> QueueResult<Option<u64>>;

    /// Aggregate counts by status.
    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Fail jobs stuck in `processing` longer than `older_than`.
    ///
    /// `processing -> failed` is a legal forward transition, so orphans left
    /// by a crashed worker become visible failures instead of being requeued
    /// (requeueing would revisit `pending`). Returns the number of jobs
    /// swept.
    async fn fail_stale(&self, older_than: Duration, message: &str) -> QueueResult<u64>;
}
