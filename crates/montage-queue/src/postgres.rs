//! Postgres job store.
//!
//! The claim uses a locking read with `FOR UPDATE SKIP LOCKED`: each worker
//! locks the single oldest pending row for the duration of its update while
//! concurrent claimers skip past locked rows to the next candidate. N workers
//! calling concurrently partition the pending set with no duplicate delivery
//! and no worker waiting on another's lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use montage_models::{Job, JobId, JobPayload, JobProgress, JobStatus, QualityTier};

use crate::error::{QueueError, QueueResult};
use crate::store::{JobStore, QueueStats};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Written to a claimed job whose stored record cannot be decoded.
const CORRUPT_RECORD_MESSAGE: &str = "Something went wrong. Please try again.";

const JOB_COLUMNS: &str = "id, user_id, project_id, status, quality_tier, \
     progress_current, progress_total, progress_message, \
     result_ref, error_message, payload, created_at, started_at, completed_at";

/// Connect a Postgres pool with the queue's defaults.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> QueueResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("Connected to Postgres queue store");
    Ok(pool)
}

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migrations.
    pub async fn migrate(&self) -> QueueResult<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    async fn current_status(&self, id: JobId) -> QueueResult<Option<String>> {
        let row = sqlx::query("SELECT status FROM render_jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>("status")))
    }
}

fn job_from_row(row: &PgRow) -> QueueResult<Job> {
    let id: Uuid = row.try_get("id")?;

    let status: JobStatus = row
        .try_get::<String, _>("status")?
        .parse()
        .map_err(|e: montage_models::status::ParseJobStatusError| {
            QueueError::corrupt_record(id, e.to_string())
        })?;

    let quality_tier: QualityTier = row
        .try_get::<String, _>("quality_tier")?
        .parse()
        .map_err(|e: montage_models::job::ParseQualityTierError| {
            QueueError::corrupt_record(id, e.to_string())
        })?;

    let payload: JobPayload = serde_json::from_value(row.try_get("payload")?)
        .map_err(|e| QueueError::corrupt_record(id, format!("payload: {e}")))?;

    Ok(Job {
        id: JobId::from_uuid(id),
        user_id: row.try_get("user_id")?,
        project_id: row.try_get("project_id")?,
        status,
        quality_tier,
        progress: JobProgress {
            current: row.try_get::<i32, _>("progress_current")?.max(0) as u32,
            total: row.try_get::<i32, _>("progress_total")?.max(0) as u32,
            message: row.try_get("progress_message")?,
        },
        result_ref: row.try_get("result_ref")?,
        error_message: row.try_get("error_message")?,
        payload,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(
        &self,
        user_id: &str,
        project_id: &str,
        quality_tier: QualityTier,
        payload: JobPayload,
    ) -> QueueResult<JobId> {
        let id = JobId::new();
        let payload_json = serde_json::to_value(&payload)?;

        sqlx::query(
            "INSERT INTO render_jobs (id, user_id, project_id, status, quality_tier, payload) \
             VALUES ($1, $2, $3, 'pending', $4, $5)",
        )
        .bind(id.as_uuid())
        .bind(user_id)
        .bind(project_id)
        .bind(quality_tier.as_str())
        .bind(payload_json)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %id, user_id, "Enqueued render job");
        Ok(id)
    }

    async fn claim_next(&self) -> QueueResult<Option<Job>> {
        // Unqualified column names in RETURNING would be ambiguous against
        // the CTE, so the job columns are prefixed with the update target.
        let returning = JOB_COLUMNS
            .split(", ")
            .map(|c| format!("j.{c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "WITH next AS ( \
                 SELECT id \
                 FROM render_jobs \
                 WHERE status = 'pending' \
                 ORDER BY created_at, id \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) \
             UPDATE render_jobs j \
             SET status = 'processing', started_at = NOW() \
             FROM next \
             WHERE j.id = next.id \
             RETURNING {returning}"
        );

        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => match job_from_row(&row) {
                Ok(job) => {
                    debug!(job_id = %job.id, "Claimed job");
                    Ok(Some(job))
                }
                Err(e) => {
                    // The row is already ours and can never process; fail it
                    // in place instead of stranding it in processing.
                    let id: Uuid = row.get("id");
                    error!(job_id = %id, error = %e, "Claimed job record is corrupt, failing it");
                    sqlx::query(
                        "UPDATE render_jobs \
                         SET status = 'failed', error_message = $2, completed_at = NOW() \
                         WHERE id = $1 AND status = 'processing'",
                    )
                    .bind(id)
                    .bind(CORRUPT_RECORD_MESSAGE)
                    .execute(&self.pool)
                    .await?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn update_progress(
        &self,
        id: JobId,
        current: u32,
        total: u32,
        message: &str,
    ) -> QueueResult<()> {
        sqlx::query(
            "UPDATE render_jobs \
             SET progress_current = $2, progress_total = $3, progress_message = $4 \
             WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(id.as_uuid())
        .bind(current as i32)
        .bind(total as i32)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(&self, id: JobId, result_ref: &str) -> QueueResult<()> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = 'completed', result_ref = $2, completed_at = NOW(), \
                 progress_current = progress_total \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id.as_uuid())
        .bind(result_ref)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            match self.current_status(id).await?.as_deref() {
                Some("completed") => debug!(job_id = %id, "complete() repeated, keeping first result"),
                Some(other) => {
                    warn!(job_id = %id, status = other, "complete() ignored for job not in processing")
                }
                None => warn!(job_id = %id, "complete() for unknown job"),
            }
        }
        Ok(())
    }

    async fn fail(&self, id: JobId, message: &str) -> QueueResult<()> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = 'failed', error_message = $2, completed_at = NOW() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id.as_uuid())
        .bind(message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            match self.current_status(id).await?.as_deref() {
                Some("failed") => {}
                Some(other) => {
                    warn!(job_id = %id, status = other, "fail() ignored for job not in processing")
                }
                None => warn!(job_id = %id, "fail() for unknown job"),
            }
        }
        Ok(())
    }

    async fn cancel(&self, id: JobId, user_id: &str) -> QueueResult<bool> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = 'cancelled', completed_at = NOW() \
             WHERE id = $1 AND user_id = $2 AND status = 'pending'",
        )
        .bind(id.as_uuid())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: JobId, user_id: &str) -> QueueResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM render_jobs WHERE id = $1 AND user_id = $2");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| job_from_row(&r)).transpose()
    }

    async fn queue_position(&self, id: JobId) -> QueueResult<Option<u64>> {
        let target = sqlx::query(
            "SELECT created_at FROM render_jobs WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(target) = target else {
            return Ok(None);
        };
        let created_at: DateTime<Utc> = target.get("created_at");

        let row = sqlx::query(
            "SELECT COUNT(*) AS earlier FROM render_jobs \
             WHERE status = 'pending' AND (created_at, id) < ($1, $2)",
        )
        .bind(created_at)
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let earlier: i64 = row.get("earlier");
        Ok(Some(1 + earlier.max(0) as u64))
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM render_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let count = count.max(0) as u64;
            match status.as_str() {
                "pending" => stats.pending = count,
                "processing" => stats.processing = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "cancelled" => stats.cancelled = count,
                other => warn!(status = other, "unknown status in stats"),
            }
        }
        Ok(stats)
    }

    async fn fail_stale(&self, older_than: Duration, message: &str) -> QueueResult<u64> {
        let result = sqlx::query(
            "UPDATE render_jobs \
             SET status = 'failed', error_message = $2, completed_at = NOW() \
             WHERE status = 'processing' \
               AND started_at < NOW() - ($1 * INTERVAL '1 second')",
        )
        .bind(older_than.as_secs_f64())
        .bind(message)
        .execute(&self.pool)
        .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            warn!(swept, "Failed stale processing jobs");
        }
        Ok(swept)
    }
}
