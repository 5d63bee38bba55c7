//! The Room-3 reply handler: the scheduler's plaintext confirmation or
//! denial of an appointment request.

use std::sync::Arc;

use chrono::Utc;

use triage_core::{CaseMessageKind, CaseStatus, NewCaseEvent};
use triage_storage::job_repository::NewJob;
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::error::ServiceError;
use crate::job_types;
use crate::ports::ChatTransport;
use crate::templates::{self, TemplateParseError};

pub struct Room3ReplyService {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
    rooms: RoomIds,
}

impl Room3ReplyService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>, chat: Arc<dyn ChatTransport>, rooms: RoomIds) -> Self {
        Self { storage, chat, rooms }
    }

    /// Handle a Room-3 reply whose parent is a `room3_request` message.
    /// The caller (ingress poller) is responsible for resolving that the
    /// reply's `in_reply_to_event_id` is a `room3_request` before calling
    /// this; this method re-resolves it itself so it stays correct if
    /// ever called directly.
    pub async fn handle_reply(
        &self,
        in_reply_to_event_id: &str,
        reply_event_id: &str,
        sender_user_id: &str,
        body: &str,
    ) -> Result<(), ServiceError> {
        let Some(parent) = self.storage.find_case_message(&self.rooms.room3_id, in_reply_to_event_id).await?
        else {
            return Ok(());
        };
        if !parent.kind.is_room3_reply_parent() {
            return Ok(());
        }
        let case_id = parent.case_id;

        let case = self.storage.require_case(case_id).await?;
        if case.status != CaseStatus::WaitAppt {
            self.storage
                .append_case_event(
                    &NewCaseEvent::human(case_id, sender_user_id, "ROOM3_REPLY_IGNORED_WRONG_STATE")
                        .with_payload(serde_json::json!({ "actual_status": case.status.as_db_str() })),
                )
                .await?;
            return Ok(());
        }

        self.storage
            .record_case_message(
                case_id,
                &self.rooms.room3_id,
                reply_event_id,
                CaseMessageKind::Room3Reply,
                Some(sender_user_id),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room3_id,
                reply_event_id,
                sender_user_id,
                "m.text",
                body,
                Some(in_reply_to_event_id),
            )
            .await?;

        let parsed = match templates::parse_room3_reply(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.handle_parse_failure(case_id, reply_event_id, err).await?;
                return Ok(());
            },
        };

        let decided_at = Utc::now();
        let applied = self
            .storage
            .apply_scheduler_decision(
                case_id,
                sender_user_id,
                parsed.appointment_status,
                parsed.datetime_text.as_deref(),
                parsed.location.as_deref(),
                parsed.instructions.as_deref(),
                parsed.reason.as_deref(),
                decided_at,
            )
            .await?;

        if !applied {
            self.storage
                .append_case_event(&NewCaseEvent::human(
                    case_id,
                    sender_user_id,
                    "ROOM3_REPLY_DUPLICATE_OR_RACE_IGNORED",
                ))
                .await?;
            return Ok(());
        }

        let event_type = match parsed.appointment_status {
            triage_core::AppointmentStatus::Confirmed => "ROOM3_APPOINTMENT_CONFIRMED",
            triage_core::AppointmentStatus::Denied => "ROOM3_APPOINTMENT_DENIED",
        };
        self.storage
            .append_case_event(&NewCaseEvent::human(case_id, sender_user_id, event_type))
            .await?;

        self.storage
            .enqueue_job(&NewJob {
                case_id: Some(case_id),
                job_type: parsed.appointment_status.next_job_type().to_owned(),
                payload_json: serde_json::json!({}),
                run_at: Utc::now(),
                max_attempts: triage_core::default_max_attempts(),
            })
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::system(case_id, "JOB_ENQUEUED_NEXT_STEP")
                    .with_payload(serde_json::json!({ "job_type": parsed.appointment_status.next_job_type() })),
            )
            .await?;

        Ok(())
    }

    async fn handle_parse_failure(
        &self,
        case_id: uuid::Uuid,
        reply_event_id: &str,
        err: TemplateParseError,
    ) -> Result<(), ServiceError> {
        self.storage.append_case_event(&NewCaseEvent::system(case_id, "ROOM3_TEMPLATE_PARSE_FAILED")).await?;
        if err == TemplateParseError::InvalidCaseLine {
            self.storage
                .append_case_event(&NewCaseEvent::system(case_id, "ROOM3_TEMPLATE_INVALID_CASE_LINE"))
                .await?;
        }

        let reformat_body = templates::render_room3_reformat_prompt(case_id);
        let posted_event_id = self.chat.reply_text(&self.rooms.room3_id, reply_event_id, &reformat_body).await?;
        self.storage
            .record_case_message(
                case_id,
                &self.rooms.room3_id,
                &posted_event_id,
                CaseMessageKind::BotReformatPromptRoom3,
                None,
            )
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::bot(case_id, "ROOM3_REFORMAT_PROMPT_POSTED")
                    .with_room(self.rooms.room3_id.clone())
                    .with_matrix_event(posted_event_id.clone()),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room3_id,
                &posted_event_id,
                "bot",
                "m.text",
                &reformat_body,
                Some(reply_event_id),
            )
            .await?;
        Ok(())
    }
}
