//! The shared handler behind all four `post_room1_final_*` job types:
//! post the case's final outcome back into Room 1 as a reply to the
//! original PDF message, then move the case into its cleanup-waiting
//! state.

use std::sync::Arc;

use uuid::Uuid;

use triage_core::{normalize_reason, Case, CaseMessageKind, CaseStatus, NewCaseEvent, ReactionCheckpointStage};
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::error::ServiceError;
use crate::job_types;
use crate::ports::ChatTransport;
use crate::templates;

const REASON_NOT_INFORMED: &str = triage_core::REASON_NOT_INFORMED;

pub struct Room1FinalReplyService {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
    rooms: RoomIds,
}

impl Room1FinalReplyService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>, chat: Arc<dyn ChatTransport>, rooms: RoomIds) -> Self {
        Self { storage, chat, rooms }
    }

    pub async fn post(
        &self,
        case_id: Uuid,
        job_type: &str,
        job_payload: &serde_json::Value,
    ) -> Result<(), ServiceError> {
        let case = self.storage.require_case(case_id).await?;

        let required_status = match job_type {
            job_types::POST_ROOM1_FINAL_DENIAL_TRIAGE => CaseStatus::DoctorDenied,
            job_types::POST_ROOM1_FINAL_APPT => CaseStatus::ApptConfirmed,
            job_types::POST_ROOM1_FINAL_APPT_DENIED => CaseStatus::ApptDenied,
            job_types::POST_ROOM1_FINAL_FAILURE => CaseStatus::Failed,
            other => return Err(ServiceError::InvalidInput(format!("unknown room1 final job type: {other}"))),
        };
        if case.status != required_status {
            return Err(ServiceError::retriable(
                "transition",
                format!("case {case_id} not in expected status {required_status:?} for {job_type}"),
            ));
        }

        if case.room1_final_reply_event_id.is_some() {
            self.storage
                .append_case_event(&NewCaseEvent::system(case_id, "ROOM1_FINAL_REPLY_POST_SKIPPED_ALREADY_EXISTS"))
                .await?;
            return Ok(());
        }

        let body = self.render_body(&case, job_type, job_payload)?;
        let final_event_id =
            self.chat.reply_text(&self.rooms.room1_id, &case.room1_origin_event_id, &body).await?;

        if !self.storage.mark_final_reply_posted(case_id, &final_event_id).await? {
            // Another concurrent delivery of this job won the race and
            // already posted the final reply; this attempt's redact
            // target never gets recorded. Not a failure.
            self.storage
                .append_case_event(&NewCaseEvent::system(case_id, "ROOM1_FINAL_REPLY_RACE_ALREADY_POSTED"))
                .await?;
            return Ok(());
        }

        self.storage
            .record_case_message(
                case_id,
                &self.rooms.room1_id,
                &final_event_id,
                CaseMessageKind::Room1Final,
                None,
            )
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::bot(case_id, "ROOM1_FINAL_REPLY_POSTED")
                    .with_room(self.rooms.room1_id.clone())
                    .with_matrix_event(final_event_id.clone()),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room1_id,
                &final_event_id,
                "bot",
                "m.text",
                &body,
                Some(&case.room1_origin_event_id),
            )
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::system(case_id, "CASE_STATUS_CHANGED").with_payload(serde_json::json!({
                    "from": required_status.as_db_str(),
                    "to": CaseStatus::WaitR1CleanupThumbs.as_db_str(),
                })),
            )
            .await?;
        self.storage
            .open_reaction_checkpoint(
                case_id,
                ReactionCheckpointStage::Room1Final,
                &self.rooms.room1_id,
                &final_event_id,
            )
            .await?;

        Ok(())
    }

    fn render_body(
        &self,
        case: &Case,
        job_type: &str,
        job_payload: &serde_json::Value,
    ) -> Result<String, ServiceError> {
        Ok(match job_type {
            job_types::POST_ROOM1_FINAL_DENIAL_TRIAGE => {
                templates::render_room1_final_denial(&normalize_reason(case.doctor_reason.as_deref()))
            },
            job_types::POST_ROOM1_FINAL_APPT => templates::render_room1_final_appt_confirmed(
                case.appointment_datetime_text.as_deref().unwrap_or(REASON_NOT_INFORMED),
                case.appointment_location.as_deref().unwrap_or(REASON_NOT_INFORMED),
                case.appointment_instructions.as_deref().unwrap_or(REASON_NOT_INFORMED),
            ),
            job_types::POST_ROOM1_FINAL_APPT_DENIED => {
                templates::render_room1_final_appt_denied(&normalize_reason(case.appointment_reason.as_deref()))
            },
            job_types::POST_ROOM1_FINAL_FAILURE => {
                let cause = job_payload.get("cause").and_then(serde_json::Value::as_str).unwrap_or("unknown");
                let details = job_payload.get("details").and_then(serde_json::Value::as_str).unwrap_or("");
                templates::render_room1_final_failure(cause, details)
            },
            other => return Err(ServiceError::InvalidInput(format!("unknown room1 final job type: {other}"))),
        })
    }
}
