//! The durable job queue: enqueue, claim with `FOR UPDATE SKIP LOCKED`,
//! complete, retry-with-backoff, and dead-letter.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::{Job, JobStatus};

use crate::error::StorageError;
use crate::PgStorage;

#[derive(FromRow)]
struct JobRow {
    job_id: Uuid,
    case_id: Option<Uuid>,
    job_type: String,
    status: String,
    payload_json: serde_json::Value,
    attempts: i32,
    max_attempts: i32,
    run_at: DateTime<Utc>,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, StorageError> {
        Ok(Self {
            job_id: row.job_id,
            case_id: row.case_id,
            job_type: row.job_type,
            status: JobStatus::from_str(&row.status).map_err(|e| StorageError::DataCorruption {
                context: "job status".to_owned(),
                source: Box::new(e),
            })?,
            payload_json: row.payload_json,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            run_at: row.run_at,
            locked_by: row.locked_by,
            locked_at: row.locked_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "job_id, case_id, job_type, status, payload_json, attempts, \
    max_attempts, run_at, locked_by, locked_at, last_error, created_at, updated_at";

/// A new job as built by a caller before it's assigned a queue identity.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub case_id: Option<Uuid>,
    pub job_type: String,
    pub payload_json: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub max_attempts: i32,
}

impl PgStorage {
    pub async fn enqueue_job(&self, new_job: &NewJob) -> Result<Job, StorageError> {
        let job_id = Uuid::new_v4();
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "INSERT INTO jobs (job_id, case_id, job_type, status, payload_json, run_at, max_attempts) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(new_job.case_id)
        .bind(&new_job.job_type)
        .bind(JobStatus::Queued.as_db_str())
        .bind(&new_job.payload_json)
        .bind(new_job.run_at)
        .bind(new_job.max_attempts)
        .fetch_one(self.pool())
        .await?;
        Job::try_from(row)
    }

    /// Claim up to `limit` due, queued jobs for `worker_id`, skipping rows
    /// locked by a concurrent claimer. One round trip: `SELECT ... FOR
    /// UPDATE SKIP LOCKED` followed by an `UPDATE ... WHERE job_id = ANY`
    /// inside the same transaction, so the claim itself is race-free.
    pub async fn claim_jobs(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>, StorageError> {
        let mut tx = self.pool().begin().await?;

        let claimed_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT job_id FROM jobs \
             WHERE status = $1 AND run_at <= now() \
             ORDER BY run_at, job_id \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(JobStatus::Queued.as_db_str())
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if claimed_ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "UPDATE jobs SET status = $1, locked_by = $2, locked_at = now(), updated_at = now() \
             WHERE job_id = ANY($3) \
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(JobStatus::Running.as_db_str())
        .bind(worker_id)
        .bind(&claimed_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    pub async fn mark_job_done(&self, job_id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE jobs SET status = $1, locked_by = NULL, locked_at = NULL, updated_at = now() \
             WHERE job_id = $2",
        )
        .bind(JobStatus::Done.as_db_str())
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Record a failed attempt and reschedule, or dead-letter if the job
    /// has now exhausted `max_attempts`. Returns `true` if dead-lettered.
    pub async fn fail_job_attempt(
        &self,
        job_id: Uuid,
        error_message: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let row: (i32, i32) = sqlx::query_as(
            "UPDATE jobs SET attempts = attempts + 1, last_error = $1, updated_at = now() \
             WHERE job_id = $2 \
             RETURNING attempts, max_attempts",
        )
        .bind(error_message)
        .bind(job_id)
        .fetch_one(self.pool())
        .await?;
        let (attempts, max_attempts) = row;

        if attempts >= max_attempts {
            sqlx::query(
                "UPDATE jobs SET status = $1, locked_by = NULL, locked_at = NULL, updated_at = now() \
                 WHERE job_id = $2",
            )
            .bind(JobStatus::Dead.as_db_str())
            .bind(job_id)
            .execute(self.pool())
            .await?;
            Ok(true)
        } else {
            sqlx::query(
                "UPDATE jobs SET status = $1, run_at = $2, locked_by = NULL, locked_at = NULL, updated_at = now() \
                 WHERE job_id = $3",
            )
            .bind(JobStatus::Queued.as_db_str())
            .bind(next_run_at)
            .bind(job_id)
            .execute(self.pool())
            .await?;
            Ok(false)
        }
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE job_id = $1"))
            .bind(job_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(Job::try_from).transpose()
    }

    /// Jobs still `running` with no matching live worker, for startup
    /// recovery: requeue anything locked before the process's own start
    /// time.
    pub async fn list_stale_running_jobs(&self, locked_before: DateTime<Utc>) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 AND locked_at < $2"
        ))
        .bind(JobStatus::Running.as_db_str())
        .bind(locked_before)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    pub async fn requeue_job(&self, job_id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE jobs SET status = $1, locked_by = NULL, locked_at = NULL, run_at = now(), updated_at = now() \
             WHERE job_id = $2",
        )
        .bind(JobStatus::Queued.as_db_str())
        .bind(job_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// True if a `queued`/`running` job of `job_type` already exists for
    /// `case_id` — recovery uses this to avoid double-enqueueing.
    pub async fn has_active_job(&self, case_id: Uuid, job_type: &str) -> Result<bool, StorageError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM jobs WHERE case_id = $1 AND job_type = $2 AND status IN ($3, $4))",
        )
        .bind(case_id)
        .bind(job_type)
        .bind(JobStatus::Queued.as_db_str())
        .bind(JobStatus::Running.as_db_str())
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    pub async fn list_dead_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 ORDER BY updated_at DESC"
        ))
        .bind(JobStatus::Dead.as_db_str())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }
}
