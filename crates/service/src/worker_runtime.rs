//! The job worker's poll loop: claim a batch, dispatch each job to its
//! handler by `job_type`, and apply the uniform success/retry/dead-letter
//! outcome.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use triage_core::{compute_retry_delay_seconds, Job, NewCaseEvent};
use triage_storage::PgStorage;

use crate::cleanup_service::CleanupService;
use crate::error::ServiceError;
use crate::job_failure_service::JobFailureService;
use crate::job_types;
use crate::post_room2_widget_service::PostRoom2WidgetService;
use crate::process_pdf_service::ProcessPdfService;
use crate::room1_final_reply_service::Room1FinalReplyService;
use crate::room3_request_service::Room3RequestService;

/// Every service the worker may need to invoke, grouped into one struct
/// so `WorkerRuntime::new` doesn't take a dozen positional arguments.
pub struct JobHandlers {
    pub process_pdf: Arc<ProcessPdfService>,
    pub post_room2_widget: Arc<PostRoom2WidgetService>,
    pub post_room3_request: Arc<Room3RequestService>,
    pub room1_final_reply: Arc<Room1FinalReplyService>,
    pub execute_cleanup: Arc<CleanupService>,
}

pub struct WorkerRuntime {
    storage: Arc<PgStorage>,
    handlers: JobHandlers,
    job_failure: Arc<JobFailureService>,
    worker_id: String,
    claim_limit: i64,
}

impl WorkerRuntime {
    #[must_use]
    pub fn new(
        storage: Arc<PgStorage>,
        handlers: JobHandlers,
        job_failure: Arc<JobFailureService>,
        worker_id: String,
        claim_limit: i64,
    ) -> Self {
        Self { storage, handlers, job_failure, worker_id, claim_limit }
    }

    /// Claim and process one batch of due jobs. Returns the number of
    /// jobs claimed (0 means the caller should sleep before calling
    /// again).
    pub async fn run_once(&self) -> Result<usize, ServiceError> {
        let jobs = self.storage.claim_jobs(&self.worker_id, self.claim_limit).await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        for job in &jobs {
            self.process_one(job).await;
        }

        Ok(jobs.len())
    }

    async fn process_one(&self, job: &Job) {
        let result = self.dispatch(job).await;

        match result {
            Ok(()) => {
                if let Err(e) = self.storage.mark_job_done(job.job_id).await {
                    tracing::error!(job_id = %job.job_id, error = %e, "failed to mark job done");
                }
            },
            Err(e) => self.handle_failure(job, &e).await,
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<(), ServiceError> {
        match job.job_type.as_str() {
            job_types::PROCESS_PDF_CASE => {
                let case_id = job
                    .case_id
                    .ok_or_else(|| ServiceError::InvalidInput("process_pdf_case job missing case_id".to_owned()))?;
                let pdf_mxc_url = job
                    .payload_json
                    .get("pdf_mxc_url")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| ServiceError::InvalidInput("process_pdf_case job missing pdf_mxc_url".to_owned()))?;
                self.handlers.process_pdf.process(case_id, pdf_mxc_url).await
            },
            job_types::POST_ROOM2_WIDGET => {
                let case_id = self.require_case_id(job)?;
                self.handlers.post_room2_widget.post(case_id).await
            },
            job_types::POST_ROOM3_REQUEST => {
                let case_id = self.require_case_id(job)?;
                self.handlers.post_room3_request.post(case_id).await
            },
            job_types::POST_ROOM1_FINAL_DENIAL_TRIAGE
            | job_types::POST_ROOM1_FINAL_APPT
            | job_types::POST_ROOM1_FINAL_APPT_DENIED
            | job_types::POST_ROOM1_FINAL_FAILURE => {
                let case_id = self.require_case_id(job)?;
                self.handlers.room1_final_reply.post(case_id, &job.job_type, &job.payload_json).await
            },
            job_types::EXECUTE_CLEANUP => {
                let case_id = self.require_case_id(job)?;
                self.handlers.execute_cleanup.execute(case_id).await
            },
            other => Err(ServiceError::InvalidInput(format!("Unknown job type: {other}"))),
        }
    }

    fn require_case_id(&self, job: &Job) -> Result<Uuid, ServiceError> {
        job.case_id.ok_or_else(|| ServiceError::InvalidInput(format!("{} job missing case_id", job.job_type)))
    }

    async fn handle_failure(&self, job: &Job, error: &ServiceError) {
        tracing::warn!(job_id = %job.job_id, job_type = %job.job_type, error = %error, "job attempt failed");

        let jitter_fraction = rand::thread_rng().gen_range(0.0..1.0);
        let next_attempt = job.attempts + 1;
        let error_summary = error.to_string();
        let delay_seconds = compute_retry_delay_seconds(next_attempt, jitter_fraction);
        let next_run_at = Utc::now() + chrono::Duration::seconds(delay_seconds as i64);

        let dead_lettered = match self.storage.fail_job_attempt(job.job_id, &error_summary, next_run_at).await {
            Ok(dead) => dead,
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "failed to record job attempt failure");
                return;
            },
        };

        if dead_lettered {
            if let Some(case_id) = job.case_id {
                let _ = self
                    .storage
                    .append_case_event(
                        &NewCaseEvent::system(case_id, "JOB_MAX_RETRIES_EXCEEDED").with_payload(
                            serde_json::json!({ "job_id": job.job_id, "job_type": job.job_type }),
                        ),
                    )
                    .await;
            }
            if let Err(e) = self.job_failure.handle_max_retries(job).await {
                tracing::error!(job_id = %job.job_id, error = %e, "job failure finalizer itself failed");
            }
        } else {
            if let Some(case_id) = job.case_id {
                let _ = self
                    .storage
                    .append_case_event(
                        &NewCaseEvent::system(case_id, "JOB_RETRY_SCHEDULED").with_payload(serde_json::json!({
                            "job_id": job.job_id,
                            "job_type": job.job_type,
                            "run_after_seconds": delay_seconds,
                            "error": error_summary,
                        })),
                    )
                    .await;
            }
        }
    }
}
