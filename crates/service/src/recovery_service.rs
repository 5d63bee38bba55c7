//! Startup recovery: requeue jobs a crashed worker left `running`, then
//! re-enqueue whatever job a non-cleaned case's current status implies
//! is still outstanding.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use triage_core::{CaseStatus, NewCaseEvent};
use triage_storage::job_repository::NewJob;
use triage_storage::PgStorage;

use crate::error::ServiceError;
use crate::job_types;

pub struct RecoveryService {
    storage: Arc<PgStorage>,
}

impl RecoveryService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>) -> Self {
        Self { storage }
    }

    /// Requeue every job still marked `running` from before `process_started_at`
    /// — the previous process's worker died mid-claim. Attempts are left
    /// unchanged; this is a requeue, not a failed attempt.
    pub async fn reconcile_running_jobs(
        &self,
        process_started_at: DateTime<Utc>,
    ) -> Result<usize, ServiceError> {
        let stale = self.storage.list_stale_running_jobs(process_started_at).await?;
        for job in &stale {
            self.storage.requeue_job(job.job_id).await?;
        }
        Ok(stale.len())
    }

    /// Scan every non-`CLEANED` case and re-enqueue the job its current
    /// status implies is still outstanding, unless one is already
    /// queued/running. Returns the number of jobs enqueued.
    pub async fn recover(&self) -> Result<usize, ServiceError> {
        let cases = self.storage.list_non_cleaned_cases().await?;
        let mut enqueued = 0usize;

        for case in cases {
            let Some(job_type) = expected_job_type(case.status) else { continue };

            if self.storage.has_active_job(case.case_id, job_type).await? {
                continue;
            }

            self.storage
                .enqueue_job(&NewJob {
                    case_id: Some(case.case_id),
                    job_type: job_type.to_owned(),
                    payload_json: serde_json::json!({}),
                    run_at: Utc::now(),
                    max_attempts: triage_core::default_max_attempts(),
                })
                .await?;
            self.storage
                .append_case_event(
                    &NewCaseEvent::system(case.case_id, "JOB_ENQUEUED_RECOVERY")
                        .with_payload(serde_json::json!({ "job_type": job_type })),
                )
                .await?;
            enqueued += 1;
        }

        Ok(enqueued)
    }
}

fn expected_job_type(status: CaseStatus) -> Option<&'static str> {
    match status {
        CaseStatus::DoctorAccepted => Some(job_types::POST_ROOM3_REQUEST),
        CaseStatus::ApptConfirmed => Some(job_types::POST_ROOM1_FINAL_APPT),
        CaseStatus::ApptDenied => Some(job_types::POST_ROOM1_FINAL_APPT_DENIED),
        CaseStatus::DoctorDenied => Some(job_types::POST_ROOM1_FINAL_DENIAL_TRIAGE),
        CaseStatus::Failed => Some(job_types::POST_ROOM1_FINAL_FAILURE),
        CaseStatus::CleanupRunning => Some(job_types::EXECUTE_CLEANUP),
        _ => None,
    }
}
