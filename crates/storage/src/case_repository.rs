//! CAS-guarded mutations and reads on the `cases` aggregate root.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::{
    AppointmentStatus, ArtifactStorageMode, Case, CaseStatus, DoctorDecision, SupportFlag,
};

use crate::error::StorageError;
use crate::PgStorage;

/// Raw row shape exactly as columns come back from Postgres; parsed into
/// `Case` by `TryFrom` so parse failures surface as `StorageError::DataCorruption`
/// instead of panicking deep inside a query.
#[derive(Debug, FromRow)]
struct CaseRow {
    case_id: Uuid,
    status: String,
    room1_origin_event_id: String,
    room1_origin_sender_user_id: String,
    artifact_storage_mode: String,
    pdf_mxc_url: Option<String>,
    pdf_sha256: Option<String>,
    agency_record_number: Option<String>,
    extracted_text: Option<String>,
    structured_data_json: Option<serde_json::Value>,
    summary_text: Option<String>,
    suggested_action_json: Option<serde_json::Value>,
    doctor_user_id: Option<String>,
    doctor_decision: Option<String>,
    doctor_support_flag: Option<String>,
    doctor_reason: Option<String>,
    doctor_decided_at: Option<DateTime<Utc>>,
    scheduler_user_id: Option<String>,
    appointment_status: Option<String>,
    appointment_datetime_text: Option<String>,
    appointment_location: Option<String>,
    appointment_instructions: Option<String>,
    appointment_reason: Option<String>,
    appointment_decided_at: Option<DateTime<Utc>>,
    room1_final_reply_event_id: Option<String>,
    cleanup_triggered_by_user_id: Option<String>,
    cleanup_triggered_at: Option<DateTime<Utc>>,
    cleanup_completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CaseRow> for Case {
    type Error = StorageError;

    fn try_from(row: CaseRow) -> Result<Self, StorageError> {
        let corrupt = |context: &str, e: impl std::error::Error + Send + Sync + 'static| {
            StorageError::DataCorruption { context: context.to_owned(), source: Box::new(e) }
        };
        Ok(Self {
            case_id: row.case_id,
            status: CaseStatus::from_str(&row.status).map_err(|e| corrupt("status", e))?,
            room1_origin_event_id: row.room1_origin_event_id,
            room1_origin_sender_user_id: row.room1_origin_sender_user_id,
            artifact_storage_mode: match row.artifact_storage_mode.as_str() {
                "full_pdf" => ArtifactStorageMode::FullPdf,
                other => {
                    return Err(StorageError::DataCorruption {
                        context: "artifact_storage_mode".to_owned(),
                        source: Box::<dyn std::error::Error + Send + Sync>::from(format!(
                            "unknown artifact_storage_mode {other}"
                        )),
                    })
                },
            },
            pdf_mxc_url: row.pdf_mxc_url,
            pdf_sha256: row.pdf_sha256,
            agency_record_number: row.agency_record_number,
            extracted_text: row.extracted_text,
            structured_data_json: row.structured_data_json,
            summary_text: row.summary_text,
            suggested_action_json: row.suggested_action_json,
            doctor_user_id: row.doctor_user_id,
            doctor_decision: row
                .doctor_decision
                .as_deref()
                .map(DoctorDecision::from_str)
                .transpose()
                .map_err(|e| corrupt("doctor_decision", e))?,
            doctor_support_flag: row
                .doctor_support_flag
                .as_deref()
                .map(SupportFlag::from_str)
                .transpose()
                .map_err(|e| corrupt("doctor_support_flag", e))?,
            doctor_reason: row.doctor_reason,
            doctor_decided_at: row.doctor_decided_at,
            scheduler_user_id: row.scheduler_user_id,
            appointment_status: row
                .appointment_status
                .as_deref()
                .map(AppointmentStatus::from_str)
                .transpose()
                .map_err(|e| corrupt("appointment_status", e))?,
            appointment_datetime_text: row.appointment_datetime_text,
            appointment_location: row.appointment_location,
            appointment_instructions: row.appointment_instructions,
            appointment_reason: row.appointment_reason,
            appointment_decided_at: row.appointment_decided_at,
            room1_final_reply_event_id: row.room1_final_reply_event_id,
            cleanup_triggered_by_user_id: row.cleanup_triggered_by_user_id,
            cleanup_triggered_at: row.cleanup_triggered_at,
            cleanup_completed_at: row.cleanup_completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const CASE_COLUMNS: &str = "case_id, status, room1_origin_event_id, room1_origin_sender_user_id, \
    artifact_storage_mode, pdf_mxc_url, pdf_sha256, agency_record_number, extracted_text, \
    structured_data_json, summary_text, suggested_action_json, doctor_user_id, doctor_decision, \
    doctor_support_flag, doctor_reason, doctor_decided_at, scheduler_user_id, appointment_status, \
    appointment_datetime_text, appointment_location, appointment_instructions, appointment_reason, \
    appointment_decided_at, room1_final_reply_event_id, cleanup_triggered_by_user_id, \
    cleanup_triggered_at, cleanup_completed_at, created_at, updated_at";

/// A fresh Room-1 PDF intake, as classified by the ingress poller.
#[derive(Debug, Clone)]
pub struct NewIntake {
    pub room1_origin_event_id: String,
    pub room1_origin_sender_user_id: String,
    pub pdf_mxc_url: String,
}

/// The two destinations a denial count in the prior-case lookup can point
/// at (§4.6): a doctor deny or a scheduler appointment denial.
#[derive(Debug, Clone)]
pub struct PriorDenial {
    pub case_id: Uuid,
    pub agency_record_number: String,
    pub denied_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Result of `PgStorage::find_prior_denial`.
#[derive(Debug, Clone)]
pub struct PriorCaseLookup {
    pub most_recent: Option<PriorDenial>,
    pub denial_count_in_window: i64,
}

impl PgStorage {
    /// Insert a new case row for a Room-1 PDF intake. On a unique-violation
    /// of `room1_origin_event_id` (duplicate poller delivery) returns
    /// `Ok(None)` — a silent no-op, not an error.
    pub async fn insert_case_intake(&self, intake: &NewIntake) -> Result<Option<Case>, StorageError> {
        let case_id = Uuid::new_v4();
        let result = sqlx::query(
            "INSERT INTO cases (case_id, status, room1_origin_event_id, room1_origin_sender_user_id, pdf_mxc_url) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(case_id)
        .bind(CaseStatus::R1AckProcessing.as_db_str())
        .bind(&intake.room1_origin_event_id)
        .bind(&intake.room1_origin_sender_user_id)
        .bind(&intake.pdf_mxc_url)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => self.get_case(case_id).await,
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                tracing::info!(
                    origin_event_id = %intake.room1_origin_event_id,
                    "duplicate room1 origin event, intake is a no-op"
                );
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_case(&self, case_id: Uuid) -> Result<Option<Case>, StorageError> {
        let row = sqlx::query_as::<_, CaseRow>(&format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE case_id = $1"
        ))
        .bind(case_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(Case::try_from).transpose()
    }

    pub async fn require_case(&self, case_id: Uuid) -> Result<Case, StorageError> {
        self.get_case(case_id)
            .await?
            .ok_or_else(|| StorageError::NotFound { entity: "case", id: case_id.to_string() })
    }

    /// Generic single-state CAS transition with no extra column writes,
    /// used for the several transitions that are purely status moves
    /// (`EXTRACTING`, `LLM_STRUCT`, `LLM_SUGGEST`, `R2_POST_WIDGET`,
    /// `R3_POST_REQUEST`, `WAIT_APPT`, `CLEANED`).
    pub async fn transition_status(
        &self,
        case_id: Uuid,
        from: CaseStatus,
        to: CaseStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET status = $1, updated_at = now() WHERE case_id = $2 AND status = $3",
        )
        .bind(to.as_db_str())
        .bind(case_id)
        .bind(from.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Same as `transition_status` but accepts either of two source states
    /// (used by the post-Room2-widget handler's idempotent two-step move).
    pub async fn transition_status_from_either(
        &self,
        case_id: Uuid,
        from_a: CaseStatus,
        from_b: CaseStatus,
        to: CaseStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET status = $1, updated_at = now() \
             WHERE case_id = $2 AND status IN ($3, $4)",
        )
        .bind(to.as_db_str())
        .bind(case_id)
        .bind(from_a.as_db_str())
        .bind(from_b.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn save_extraction(
        &self,
        case_id: Uuid,
        agency_record_number: Option<&str>,
        extracted_text: &str,
        pdf_sha256: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE cases SET agency_record_number = $1, extracted_text = $2, pdf_sha256 = $3, \
             updated_at = now() WHERE case_id = $4",
        )
        .bind(agency_record_number)
        .bind(extracted_text)
        .bind(pdf_sha256)
        .bind(case_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn save_llm1_output(
        &self,
        case_id: Uuid,
        structured_data_json: &serde_json::Value,
        summary_text: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE cases SET structured_data_json = $1, summary_text = $2, updated_at = now() \
             WHERE case_id = $3",
        )
        .bind(structured_data_json)
        .bind(summary_text)
        .bind(case_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn save_llm2_output(
        &self,
        case_id: Uuid,
        suggested_action_json: &serde_json::Value,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE cases SET suggested_action_json = $1, updated_at = now() WHERE case_id = $2",
        )
        .bind(suggested_action_json)
        .bind(case_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Doctor decision CAS. Returns `true` iff applied.
    pub async fn apply_doctor_decision(
        &self,
        case_id: Uuid,
        doctor_user_id: &str,
        decision: DoctorDecision,
        support_flag: SupportFlag,
        reason: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let next_status = match decision {
            DoctorDecision::Accept => CaseStatus::DoctorAccepted,
            DoctorDecision::Deny => CaseStatus::DoctorDenied,
        };
        let result = sqlx::query(
            "UPDATE cases SET status = $1, doctor_user_id = $2, doctor_decision = $3, \
             doctor_support_flag = $4, doctor_reason = $5, doctor_decided_at = $6, updated_at = now() \
             WHERE case_id = $7 AND status = $8 AND doctor_decided_at IS NULL",
        )
        .bind(next_status.as_db_str())
        .bind(doctor_user_id)
        .bind(decision.as_db_str())
        .bind(support_flag.as_db_str())
        .bind(reason)
        .bind(decided_at)
        .bind(case_id)
        .bind(CaseStatus::WaitDoctor.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Scheduler decision CAS.
    pub async fn apply_scheduler_decision(
        &self,
        case_id: Uuid,
        scheduler_user_id: &str,
        appointment_status: AppointmentStatus,
        appointment_datetime_text: Option<&str>,
        location: Option<&str>,
        instructions: Option<&str>,
        reason: Option<&str>,
        decided_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET status = $1, scheduler_user_id = $2, appointment_status = $3, \
             appointment_datetime_text = $4, appointment_location = $5, appointment_instructions = $6, \
             appointment_reason = $7, appointment_decided_at = $8, updated_at = now() \
             WHERE case_id = $9 AND status = $10 AND appointment_decided_at IS NULL",
        )
        .bind(appointment_status.next_status().as_db_str())
        .bind(scheduler_user_id)
        .bind(appointment_status.as_db_str())
        .bind(appointment_datetime_text)
        .bind(location)
        .bind(instructions)
        .bind(reason)
        .bind(decided_at)
        .bind(case_id)
        .bind(CaseStatus::WaitAppt.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Final-reply mark CAS: the second concurrent poster always loses.
    pub async fn mark_final_reply_posted(
        &self,
        case_id: Uuid,
        final_reply_event_id: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET room1_final_reply_event_id = $1, status = $2, updated_at = now() \
             WHERE case_id = $3 AND room1_final_reply_event_id IS NULL",
        )
        .bind(final_reply_event_id)
        .bind(CaseStatus::WaitR1CleanupThumbs.as_db_str())
        .bind(case_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Cleanup-claim CAS: first positive Room-1 reaction wins.
    pub async fn claim_cleanup(
        &self,
        case_id: Uuid,
        triggered_by_user_id: &str,
        triggered_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET cleanup_triggered_at = $1, cleanup_triggered_by_user_id = $2, \
             status = $3, updated_at = now() \
             WHERE case_id = $4 AND status = $5 AND cleanup_triggered_at IS NULL",
        )
        .bind(triggered_at)
        .bind(triggered_by_user_id)
        .bind(CaseStatus::CleanupRunning.as_db_str())
        .bind(case_id)
        .bind(CaseStatus::WaitR1CleanupThumbs.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_cleanup_completed(&self, case_id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET cleanup_completed_at = now(), status = $1, updated_at = now() \
             WHERE case_id = $2 AND status = $3",
        )
        .bind(CaseStatus::Cleaned.as_db_str())
        .bind(case_id)
        .bind(CaseStatus::CleanupRunning.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Failure-finalizer CAS: accepts any non-terminal source status, since
    /// a dead-lettered job can strike a case in any of several states.
    pub async fn mark_case_failed(&self, case_id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE cases SET status = $1, updated_at = now() \
             WHERE case_id = $2 AND status NOT IN ($3, $4, $5, $6)",
        )
        .bind(CaseStatus::Failed.as_db_str())
        .bind(case_id)
        .bind(CaseStatus::Failed.as_db_str())
        .bind(CaseStatus::WaitR1CleanupThumbs.as_db_str())
        .bind(CaseStatus::CleanupRunning.as_db_str())
        .bind(CaseStatus::Cleaned.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// All cases whose `status` is not yet `CLEANED`, for startup recovery.
    pub async fn list_non_cleaned_cases(&self) -> Result<Vec<Case>, StorageError> {
        let rows = sqlx::query_as::<_, CaseRow>(&format!(
            "SELECT {CASE_COLUMNS} FROM cases WHERE status != $1 ORDER BY created_at"
        ))
        .bind(CaseStatus::Cleaned.as_db_str())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(Case::try_from).collect()
    }

    /// §4.6 prior-case lookup: most recent denial for the same agency
    /// record number (excluding `case_id` itself) within the trailing
    /// window, plus the count of denials in that same window.
    pub async fn find_prior_denial(
        &self,
        case_id: Uuid,
        agency_record_number: &str,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Result<PriorCaseLookup, StorageError> {
        #[derive(FromRow)]
        struct Row {
            case_id: Uuid,
            agency_record_number: String,
            denied_at: DateTime<Utc>,
            reason: Option<String>,
        }

        let window_start = now - chrono::Duration::days(window_days);
        let rows = sqlx::query_as::<_, Row>(
            "SELECT case_id, agency_record_number, denied_at, reason FROM ( \
                SELECT case_id, agency_record_number, doctor_decided_at AS denied_at, doctor_reason AS reason \
                FROM cases \
                WHERE agency_record_number = $1 AND case_id != $2 AND doctor_decision = 'deny' \
                UNION ALL \
                SELECT case_id, agency_record_number, appointment_decided_at AS denied_at, appointment_reason AS reason \
                FROM cases \
                WHERE agency_record_number = $1 AND case_id != $2 AND appointment_status = 'denied' \
             ) denials \
             WHERE denied_at >= $3 AND denied_at <= $4 \
             ORDER BY denied_at DESC",
        )
        .bind(agency_record_number)
        .bind(case_id)
        .bind(window_start)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        let denial_count_in_window = rows.len() as i64;
        let most_recent = rows.into_iter().next().map(|r| PriorDenial {
            case_id: r.case_id,
            agency_record_number: r.agency_record_number,
            denied_at: r.denied_at,
            reason: r.reason,
        });
        Ok(PriorCaseLookup { most_recent, denial_count_in_window })
    }
}
