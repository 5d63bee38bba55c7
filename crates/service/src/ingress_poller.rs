//! The ingress poller: a long-poll `sync` loop that classifies each
//! observed timeline event by room and dispatches it to the right
//! handler. The sync cursor (`next_batch`) is kept in memory only — a
//! restart resumes from "now", never replays history.

use std::sync::Arc;

use triage_core::CaseMessageKind;
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::doctor_decision_service::DoctorDecisionService;
use crate::error::ServiceError;
use crate::intake_service::IntakeService;
use crate::ports::{ChatEvent, ChatTransport};
use crate::reaction_service::ReactionService;
use crate::room3_reply_service::Room3ReplyService;

pub struct IngressPoller {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
    rooms: RoomIds,
    intake: Arc<IntakeService>,
    doctor_decision: Arc<DoctorDecisionService>,
    room3_reply: Arc<Room3ReplyService>,
    reaction: Arc<ReactionService>,
    cursor: Option<String>,
    sync_timeout_ms: u64,
}

impl IngressPoller {
    #[must_use]
    #[allow(clippy::too_many_arguments, reason = "wires every handler this poller dispatches to")]
    pub fn new(
        storage: Arc<PgStorage>,
        chat: Arc<dyn ChatTransport>,
        rooms: RoomIds,
        intake: Arc<IntakeService>,
        doctor_decision: Arc<DoctorDecisionService>,
        room3_reply: Arc<Room3ReplyService>,
        reaction: Arc<ReactionService>,
        sync_timeout_ms: u64,
    ) -> Self {
        Self {
            storage,
            chat,
            rooms,
            intake,
            doctor_decision,
            room3_reply,
            reaction,
            cursor: None,
            sync_timeout_ms,
        }
    }

    /// One long-poll cycle: fetch new events since the in-memory cursor,
    /// auto-join invites, dispatch every event, then advance the cursor.
    /// The cursor only advances after the whole batch has been dispatched,
    /// so a crash mid-batch redelivers the batch from its start rather
    /// than silently skipping events — every handler downstream is
    /// idempotent on redelivery.
    pub async fn poll_once(&mut self) -> Result<usize, ServiceError> {
        let result = self.chat.sync(self.cursor.as_deref(), self.sync_timeout_ms).await?;

        for room_id in &result.invited_rooms {
            if let Err(e) = self.chat.join_room(room_id).await {
                tracing::warn!(room_id = %room_id, error = %e, "failed to auto-join invited room");
            }
        }

        let event_count = result.events.len();
        for event in &result.events {
            if let Err(e) = self.dispatch(event).await {
                tracing::error!(
                    room_id = %event.room_id,
                    event_id = %event.event_id,
                    error = %e,
                    "failed to dispatch ingress event"
                );
            }
        }

        self.cursor = Some(result.next_batch);
        Ok(event_count)
    }

    async fn dispatch(&self, event: &ChatEvent) -> Result<(), ServiceError> {
        if event.event_type == "m.reaction" {
            let (Some(related_event_id), Some(reaction_key)) =
                (event.reaction_related_event_id.as_deref(), event.reaction_key.as_deref())
            else {
                return Ok(());
            };
            return self.reaction.handle_reaction(&event.room_id, related_event_id, &event.sender, reaction_key).await;
        }

        if event.room_id == self.rooms.room1_id {
            return self.dispatch_room1(event).await;
        }
        if event.room_id == self.rooms.room2_id {
            return self.dispatch_room2(event).await;
        }
        if event.room_id == self.rooms.room3_id {
            return self.dispatch_room3(event).await;
        }

        Ok(())
    }

    async fn dispatch_room1(&self, event: &ChatEvent) -> Result<(), ServiceError> {
        let Some(mxc_url) = event.mxc_url.as_deref() else { return Ok(()) };
        let is_pdf = event.mimetype.as_deref() == Some("application/pdf");
        if !is_pdf {
            return Ok(());
        }
        self.intake.handle_room1_pdf_event(&event.event_id, &event.sender, mxc_url).await.map(|_| ())
    }

    async fn dispatch_room2(&self, event: &ChatEvent) -> Result<(), ServiceError> {
        let (Some(body), Some(in_reply_to)) = (event.body.as_deref(), event.in_reply_to_event_id.as_deref())
        else {
            return Ok(());
        };

        let Some(parent) = self.storage.find_case_message(&self.rooms.room2_id, in_reply_to).await? else {
            return Ok(());
        };
        if !parent.kind.is_room2_decision_parent() {
            return Ok(());
        }

        self.doctor_decision.handle_room2_chat_reply(&event.event_id, &event.sender, body).await
    }

    async fn dispatch_room3(&self, event: &ChatEvent) -> Result<(), ServiceError> {
        let (Some(body), Some(in_reply_to)) = (event.body.as_deref(), event.in_reply_to_event_id.as_deref()) else {
            return Ok(());
        };

        let Some(parent) = self.storage.find_case_message(&self.rooms.room3_id, in_reply_to).await? else {
            return Ok(());
        };
        if parent.kind != CaseMessageKind::Room3Request {
            return Ok(());
        }

        self.room3_reply.handle_reply(in_reply_to, &event.event_id, &event.sender, body).await
    }
}
