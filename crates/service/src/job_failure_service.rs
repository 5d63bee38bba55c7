//! Finalizes a case whose job has exhausted its retry budget. Invoked by
//! the worker runtime immediately after a job is dead-lettered.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use triage_core::{Job, NewCaseEvent};
use triage_storage::job_repository::NewJob;
use triage_storage::PgStorage;

use crate::error::ServiceError;
use crate::job_types;

pub struct JobFailureService {
    storage: Arc<PgStorage>,
}

impl JobFailureService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>) -> Self {
        Self { storage }
    }

    /// Move the job's case to `FAILED` and enqueue the Room-1 failure
    /// notice. `cause`/`details` are derived from the job's own type and
    /// last error text — free-text, not a classified taxonomy (§9 open
    /// question: the mapping is heuristic by design).
    pub async fn handle_max_retries(&self, job: &Job) -> Result<(), ServiceError> {
        let Some(case_id) = job.case_id else {
            // Not every job type is case-scoped; nothing to finalize.
            return Ok(());
        };

        if !self.storage.mark_case_failed(case_id).await? {
            // Case already reached a terminal/cleanup status through some
            // other path; this job's failure is moot.
            return Ok(());
        }
        self.storage
            .append_case_event(
                &NewCaseEvent::system(case_id, "CASE_FAILED_MAX_RETRIES")
                    .with_payload(serde_json::json!({ "job_id": job.job_id, "job_type": job.job_type })),
            )
            .await?;

        self.enqueue_failure_notice(case_id, job).await?;

        Ok(())
    }

    async fn enqueue_failure_notice(&self, case_id: Uuid, job: &Job) -> Result<(), ServiceError> {
        let cause = job.job_type.clone();
        let details = job.last_error.clone().unwrap_or_default();

        self.storage
            .enqueue_job(&NewJob {
                case_id: Some(case_id),
                job_type: job_types::POST_ROOM1_FINAL_FAILURE.to_owned(),
                payload_json: serde_json::json!({ "cause": cause, "details": details }),
                run_at: Utc::now(),
                max_attempts: triage_core::default_max_attempts(),
            })
            .await?;
        self.storage
            .append_case_event(&NewCaseEvent::system(case_id, "JOB_ENQUEUED_POST_ROOM1_FAILURE"))
            .await?;
        Ok(())
    }
}
