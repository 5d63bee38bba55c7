//! The reaction handler: a 👍/✅ on a tracked message either triggers
//! Room-1 cleanup or simply resolves an audit-only checkpoint, depending
//! on which message kind was reacted to.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use triage_core::{is_positive_reaction, CaseMessageKind, CaseStatus, NewCaseEvent};
use triage_storage::job_repository::NewJob;
use triage_storage::PgStorage;

use crate::error::ServiceError;
use crate::job_types;

pub struct ReactionService {
    storage: Arc<PgStorage>,
}

impl ReactionService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>) -> Self {
        Self { storage }
    }

    /// Handle one observed reaction event. A reaction to a message this
    /// engine never recorded (or a non-positive key) is a silent no-op —
    /// §9's explicit design note: the handler doesn't distinguish "redact
    /// a reaction" from "ignore".
    pub async fn handle_reaction(
        &self,
        room_id: &str,
        related_event_id: &str,
        reactor_user_id: &str,
        reaction_key: &str,
    ) -> Result<(), ServiceError> {
        if !is_positive_reaction(reaction_key) {
            return Ok(());
        }

        let Some(message) = self.storage.find_case_message(room_id, related_event_id).await? else {
            return Ok(());
        };

        match message.kind {
            CaseMessageKind::Room1Final => {
                self.handle_room1_final_reaction(message.case_id, room_id, related_event_id, reactor_user_id)
                    .await
            },
            CaseMessageKind::Room2DecisionAck => {
                self.handle_checkpoint_only_reaction(
                    message.case_id,
                    room_id,
                    related_event_id,
                    reactor_user_id,
                    "ROOM2_ACK_POSITIVE_RECEIVED",
                )
                .await
            },
            CaseMessageKind::BotAck => {
                self.handle_checkpoint_only_reaction(
                    message.case_id,
                    room_id,
                    related_event_id,
                    reactor_user_id,
                    "ROOM3_ACK_THUMBS_UP_RECEIVED",
                )
                .await
            },
            _ => Ok(()),
        }
    }

    async fn handle_room1_final_reaction(
        &self,
        case_id: Uuid,
        room_id: &str,
        related_event_id: &str,
        reactor_user_id: &str,
    ) -> Result<(), ServiceError> {
        let case = self.storage.require_case(case_id).await?;
        if case.status != CaseStatus::WaitR1CleanupThumbs {
            self.storage
                .append_case_event(&NewCaseEvent::human(
                    case_id,
                    reactor_user_id,
                    "ROOM1_FINAL_THUMBS_UP_IGNORED_WRONG_STATE",
                ))
                .await?;
            return Ok(());
        }

        let claimed = self.storage.claim_cleanup(case_id, reactor_user_id, Utc::now()).await?;
        if claimed {
            self.storage
                .append_case_event(&NewCaseEvent::human(
                    case_id,
                    reactor_user_id,
                    "ROOM1_FINAL_THUMBS_UP_TRIGGERED_CLEANUP",
                ))
                .await?;
            self.storage
                .enqueue_job(&NewJob {
                    case_id: Some(case_id),
                    job_type: job_types::EXECUTE_CLEANUP.to_owned(),
                    payload_json: serde_json::json!({}),
                    run_at: Utc::now(),
                    max_attempts: triage_core::default_max_attempts(),
                })
                .await?;
            self.storage
                .append_case_event(
                    &NewCaseEvent::system(case_id, "JOB_ENQUEUED_NEXT_STEP")
                        .with_payload(serde_json::json!({ "job_type": job_types::EXECUTE_CLEANUP })),
                )
                .await?;
        } else {
            self.storage
                .append_case_event(&NewCaseEvent::human(
                    case_id,
                    reactor_user_id,
                    "ROOM1_FINAL_THUMBS_UP_IGNORED_ALREADY_TRIGGERED",
                ))
                .await?;
        }

        self.storage.resolve_reaction_checkpoint(room_id, related_event_id, reactor_user_id).await?;
        Ok(())
    }

    async fn handle_checkpoint_only_reaction(
        &self,
        case_id: Uuid,
        room_id: &str,
        related_event_id: &str,
        reactor_user_id: &str,
        audit_event_type: &'static str,
    ) -> Result<(), ServiceError> {
        self.storage.append_case_event(&NewCaseEvent::human(case_id, reactor_user_id, audit_event_type)).await?;
        self.storage.resolve_reaction_checkpoint(room_id, related_event_id, reactor_user_id).await?;
        Ok(())
    }
}
