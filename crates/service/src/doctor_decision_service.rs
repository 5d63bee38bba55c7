//! The doctor-decision handler: shared by the HMAC webhook, the widget's
//! bearer-authenticated submit endpoint, and the Room-2 chat-based reply
//! path. All three funnel through `apply()` so the CAS semantics and
//! audit trail are identical regardless of entry point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use triage_core::{validate_decision_support, CaseStatus, DoctorDecision, NewCaseEvent, SupportFlag, TransitionOutcome};
use triage_storage::job_repository::NewJob;
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::error::ServiceError;
use crate::job_types;
use crate::ports::{ChatTransport, MembershipAuthorizer};
use crate::templates::{self, TemplateParseError};

/// A doctor decision payload, shape-identical across the webhook and
/// widget submit entry points.
#[derive(Debug, Clone)]
pub struct DoctorDecisionPayload {
    pub case_id: Uuid,
    pub doctor_user_id: String,
    pub decision: DoctorDecision,
    pub support_flag: SupportFlag,
    pub reason: Option<String>,
    pub widget_event_id: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
}

pub struct DoctorDecisionService {
    storage: Arc<PgStorage>,
    chat: Option<Arc<dyn ChatTransport>>,
    membership: Arc<dyn MembershipAuthorizer>,
    rooms: RoomIds,
}

impl DoctorDecisionService {
    #[must_use]
    pub fn new(
        storage: Arc<PgStorage>,
        chat: Option<Arc<dyn ChatTransport>>,
        membership: Arc<dyn MembershipAuthorizer>,
        rooms: RoomIds,
    ) -> Self {
        Self { storage, chat, membership, rooms }
    }

    /// Shared webhook/widget-submit semantics.
    pub async fn apply(&self, payload: DoctorDecisionPayload) -> Result<TransitionOutcome, ServiceError> {
        validate_decision_support(payload.decision, payload.support_flag)
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        let Some(case) = self.storage.get_case(payload.case_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };

        if case.status != CaseStatus::WaitDoctor {
            self.storage
                .append_case_event(
                    &NewCaseEvent::human(case.case_id, &payload.doctor_user_id, "ROOM2_DECISION_IGNORED_WRONG_STATE")
                        .with_payload(serde_json::json!({ "actual_status": case.status.as_db_str() })),
                )
                .await?;
            return Ok(TransitionOutcome::WrongState);
        }

        let decided_at = payload.submitted_at.unwrap_or_else(Utc::now);
        let applied = self
            .storage
            .apply_doctor_decision(
                case.case_id,
                &payload.doctor_user_id,
                payload.decision,
                payload.support_flag,
                payload.reason.as_deref(),
                decided_at,
            )
            .await?;

        if !applied {
            self.storage
                .append_case_event(&NewCaseEvent::human(
                    case.case_id,
                    &payload.doctor_user_id,
                    "ROOM2_DECISION_DUPLICATE_OR_RACE_IGNORED",
                ))
                .await?;
            return Ok(TransitionOutcome::DuplicateOrRace);
        }

        self.storage
            .append_case_event(
                &NewCaseEvent::human(case.case_id, &payload.doctor_user_id, "ROOM2_WIDGET_SUBMITTED")
                    .with_payload(serde_json::json!({
                        "decision": payload.decision.as_db_str(),
                        "support_flag": payload.support_flag.as_db_str(),
                    })),
            )
            .await?;

        self.storage
            .enqueue_job(&NewJob {
                case_id: Some(case.case_id),
                job_type: payload.decision.next_job_type().to_owned(),
                payload_json: serde_json::json!({}),
                run_at: Utc::now(),
                max_attempts: triage_core::default_max_attempts(),
            })
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::system(case.case_id, "JOB_ENQUEUED_NEXT_STEP")
                    .with_payload(serde_json::json!({ "job_type": payload.decision.next_job_type() })),
            )
            .await?;

        self.post_decision_ack(case.case_id, payload.widget_event_id.as_deref()).await;

        Ok(TransitionOutcome::Applied)
    }

    /// Post the Room-2 decision-ack reply. Best-effort: a posting failure
    /// is logged but never reverts the already-applied decision.
    async fn post_decision_ack(&self, case_id: Uuid, widget_event_id: Option<&str>) {
        let Some(chat) = &self.chat else { return };

        let ack_body = "Decisão registrada.";
        let posted = if let Some(event_id) = widget_event_id {
            chat.reply_text(&self.rooms.room2_id, event_id, ack_body).await
        } else {
            chat.send_text(&self.rooms.room2_id, ack_body).await
        };

        let ack_event_id = match posted {
            Ok(event_id) => event_id,
            Err(e) => {
                tracing::warn!(case_id = %case_id, error = %e, "failed to post room2 decision ack");
                return;
            },
        };

        if let Err(e) = self
            .storage
            .record_case_message(
                case_id,
                &self.rooms.room2_id,
                &ack_event_id,
                triage_core::CaseMessageKind::Room2DecisionAck,
                None,
            )
            .await
        {
            tracing::warn!(case_id = %case_id, error = %e, "failed to record room2 decision ack message");
            return;
        }
        if let Err(e) = self
            .storage
            .append_case_event(
                &NewCaseEvent::bot(case_id, "ROOM2_DECISION_ACK_POSTED")
                    .with_room(self.rooms.room2_id.clone())
                    .with_matrix_event(ack_event_id.clone()),
            )
            .await
        {
            tracing::warn!(case_id = %case_id, error = %e, "failed to audit room2 decision ack");
        }
        if let Err(e) = self
            .storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room2_id,
                &ack_event_id,
                "bot",
                "m.text",
                ack_body,
                widget_event_id,
            )
            .await
        {
            tracing::warn!(case_id = %case_id, error = %e, "failed to record room2 decision ack transcript");
        }
        if let Err(e) = self
            .storage
            .open_reaction_checkpoint(
                case_id,
                triage_core::ReactionCheckpointStage::Room2Ack,
                &self.rooms.room2_id,
                &ack_event_id,
            )
            .await
        {
            tracing::warn!(case_id = %case_id, error = %e, "failed to open room2 ack checkpoint");
        }
    }

    /// The Room-2 chat-based decision reply: strict plaintext parsing,
    /// membership authorization, then routed through `apply()`. Always
    /// emits a `resultado: sucesso|erro` ack as a reply to the doctor's
    /// own message.
    pub async fn handle_room2_chat_reply(
        &self,
        reply_event_id: &str,
        sender_user_id: &str,
        body: &str,
    ) -> Result<(), ServiceError> {
        let Some(chat) = &self.chat else {
            return Err(ServiceError::NotConfigured("chat transport required for room2 chat replies".to_owned()));
        };

        let parsed = match templates::parse_room2_decision(body) {
            Ok(parsed) => parsed,
            Err(TemplateParseError::ForgedDoctorUserId) => {
                self.ack_chat_reply(chat, reply_event_id, false, "invalid_template").await;
                return Ok(());
            },
            Err(_) => {
                self.ack_chat_reply(chat, reply_event_id, false, "invalid_template").await;
                return Ok(());
            },
        };

        if !self.membership.is_member(&self.rooms.room2_id, sender_user_id).await? {
            self.ack_chat_reply(chat, reply_event_id, false, "authorization_failed").await;
            return Ok(());
        }

        let outcome = self
            .apply(DoctorDecisionPayload {
                case_id: parsed.case_id,
                doctor_user_id: sender_user_id.to_owned(),
                decision: parsed.decision,
                support_flag: parsed.support_flag,
                reason: parsed.reason,
                widget_event_id: None,
                submitted_at: None,
            })
            .await?;

        let (success, detail) = match outcome {
            TransitionOutcome::Applied => (true, "ok"),
            TransitionOutcome::NotFound => (false, "case_not_found"),
            TransitionOutcome::WrongState => (false, "wrong_state"),
            TransitionOutcome::DuplicateOrRace => (false, "duplicate_or_race"),
        };
        self.ack_chat_reply(chat, reply_event_id, success, detail).await;
        Ok(())
    }

    async fn ack_chat_reply(&self, chat: &Arc<dyn ChatTransport>, reply_event_id: &str, success: bool, detail: &str) {
        let body = templates::render_room2_ack(success, detail);
        if let Err(e) = chat.reply_text(&self.rooms.room2_id, reply_event_id, &body).await {
            tracing::warn!(error = %e, "failed to post room2 chat-reply ack");
        }
    }
}
