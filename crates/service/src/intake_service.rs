//! Room-1 intake: turns a freshly-observed PDF message into a new case.

use std::sync::Arc;

use chrono::Utc;

use triage_core::{CaseMessageKind, NewCaseEvent, TransitionOutcome};
use triage_storage::case_repository::NewIntake;
use triage_storage::job_repository::NewJob;
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::error::ServiceError;
use crate::job_types;
use crate::ports::ChatTransport;

const PROCESSING_REPLY_BODY: &str = "Recebido. Processando o relatório…";

pub struct IntakeService {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
    rooms: RoomIds,
}

impl IntakeService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>, chat: Arc<dyn ChatTransport>, rooms: RoomIds) -> Self {
        Self { storage, chat, rooms }
    }

    /// Handle one observed Room-1 PDF event. Idempotent: a redelivery of
    /// the same `origin_event_id` is a silent no-op.
    pub async fn handle_room1_pdf_event(
        &self,
        origin_event_id: &str,
        sender_user_id: &str,
        pdf_mxc_url: &str,
    ) -> Result<TransitionOutcome, ServiceError> {
        let intake = NewIntake {
            room1_origin_event_id: origin_event_id.to_owned(),
            room1_origin_sender_user_id: sender_user_id.to_owned(),
            pdf_mxc_url: pdf_mxc_url.to_owned(),
        };

        let Some(case) = self.storage.insert_case_intake(&intake).await? else {
            return Ok(TransitionOutcome::DuplicateOrRace);
        };

        self.storage
            .record_case_message(
                case.case_id,
                &self.rooms.room1_id,
                origin_event_id,
                CaseMessageKind::Room1Origin,
                Some(sender_user_id),
            )
            .await?;
        self.storage
            .append_case_event(&NewCaseEvent::human(case.case_id, sender_user_id, "CASE_CREATED"))
            .await?;

        let reply_event_id =
            self.chat.reply_text(&self.rooms.room1_id, origin_event_id, PROCESSING_REPLY_BODY).await?;

        self.storage
            .record_case_message(
                case.case_id,
                &self.rooms.room1_id,
                &reply_event_id,
                CaseMessageKind::BotProcessing,
                None,
            )
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::bot(case.case_id, "BOT_PROCESSING_REPLY_POSTED")
                    .with_room(self.rooms.room1_id.clone())
                    .with_matrix_event(reply_event_id.clone()),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case.case_id,
                &self.rooms.room1_id,
                &reply_event_id,
                "bot",
                "m.text",
                PROCESSING_REPLY_BODY,
                Some(origin_event_id),
            )
            .await?;

        self.storage
            .enqueue_job(&NewJob {
                case_id: Some(case.case_id),
                job_type: job_types::PROCESS_PDF_CASE.to_owned(),
                payload_json: serde_json::json!({ "pdf_mxc_url": pdf_mxc_url }),
                run_at: Utc::now(),
                max_attempts: triage_core::default_max_attempts(),
            })
            .await?;

        Ok(TransitionOutcome::Applied)
    }
}
