//! The `post_room3_request` handler: post the scheduling request into
//! Room 3 once a doctor has accepted a case, and track the bot's own
//! acknowledgement with a reaction checkpoint.

use std::sync::Arc;

use uuid::Uuid;

use triage_core::{CaseMessageKind, CaseStatus, NewCaseEvent, ReactionCheckpointStage};
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::error::ServiceError;
use crate::ports::ChatTransport;
use crate::templates;

pub struct Room3RequestService {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
    rooms: RoomIds,
}

impl Room3RequestService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>, chat: Arc<dyn ChatTransport>, rooms: RoomIds) -> Self {
        Self { storage, chat, rooms }
    }

    pub async fn post(&self, case_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.storage.list_case_messages(case_id).await?;
        let already_posted = existing.iter().any(|m| m.kind == CaseMessageKind::Room3Request);

        if already_posted {
            // A prior attempt posted but crashed before the final
            // transition; this redelivery just needs to finish the move.
            self.storage.transition_status(case_id, CaseStatus::R3PostRequest, CaseStatus::WaitAppt).await?;
            return Ok(());
        }

        if !self
            .storage
            .transition_status_from_either(
                case_id,
                CaseStatus::DoctorAccepted,
                CaseStatus::R3PostRequest,
                CaseStatus::R3PostRequest,
            )
            .await?
        {
            return Err(ServiceError::retriable(
                "transition",
                format!("case {case_id} not in DOCTOR_ACCEPTED/R3_POST_REQUEST"),
            ));
        }

        let case = self.storage.require_case(case_id).await?;
        let summary_text = case
            .summary_text
            .clone()
            .ok_or_else(|| ServiceError::InvalidInput("case missing summary_text".to_owned()))?;

        let request_body = templates::render_room3_request(case_id, &summary_text);
        let request_event_id = self.chat.send_text(&self.rooms.room3_id, &request_body).await?;
        self.storage
            .record_case_message(
                case_id,
                &self.rooms.room3_id,
                &request_event_id,
                CaseMessageKind::Room3Request,
                None,
            )
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::bot(case_id, "ROOM3_REQUEST_POSTED")
                    .with_room(self.rooms.room3_id.clone())
                    .with_matrix_event(request_event_id.clone()),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room3_id,
                &request_event_id,
                "bot",
                "m.text",
                &request_body,
                None,
            )
            .await?;

        let ack_body = templates::render_room3_ack();
        let ack_event_id = self.chat.reply_text(&self.rooms.room3_id, &request_event_id, ack_body).await?;
        self.storage
            .record_case_message(case_id, &self.rooms.room3_id, &ack_event_id, CaseMessageKind::BotAck, None)
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::bot(case_id, "ROOM3_ACK_POSTED")
                    .with_room(self.rooms.room3_id.clone())
                    .with_matrix_event(ack_event_id.clone()),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room3_id,
                &ack_event_id,
                "bot",
                "m.text",
                ack_body,
                Some(&request_event_id),
            )
            .await?;
        self.storage
            .open_reaction_checkpoint(case_id, ReactionCheckpointStage::Room3Ack, &self.rooms.room3_id, &ack_event_id)
            .await?;

        if !self.storage.transition_status(case_id, CaseStatus::R3PostRequest, CaseStatus::WaitAppt).await? {
            return Err(ServiceError::retriable(
                "transition",
                format!("case {case_id} not in R3_POST_REQUEST for final transition to WAIT_APPT"),
            ));
        }

        Ok(())
    }
}
