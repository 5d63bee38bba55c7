//! The `post_room2_widget` handler: once LLM2 has produced a suggestion,
//! post the case into Room 2 as a root message plus three replies
//! (attachment, summary, decision template) and hand off to the doctor.

use std::sync::Arc;

use uuid::Uuid;

use triage_core::{Case, CaseMessageKind, CaseStatus, NewCaseEvent};
use triage_storage::PgStorage;

use crate::config::RoomIds;
use crate::error::ServiceError;
use crate::ports::ChatTransport;
use crate::prior_case_lookup;
use crate::templates;

pub struct PostRoom2WidgetService {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
    rooms: RoomIds,
}

impl PostRoom2WidgetService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>, chat: Arc<dyn ChatTransport>, rooms: RoomIds) -> Self {
        Self { storage, chat, rooms }
    }

    /// Post a case's root + 3 replies into Room 2 and move it to
    /// `WAIT_DOCTOR`. Idempotent: a redelivered job that finds the root
    /// message already recorded skips straight to the final transition.
    pub async fn post(&self, case_id: Uuid) -> Result<(), ServiceError> {
        if !self
            .storage
            .transition_status_from_either(
                case_id,
                CaseStatus::LlmSuggest,
                CaseStatus::R2PostWidget,
                CaseStatus::R2PostWidget,
            )
            .await?
        {
            // Already past this point (e.g. WAIT_DOCTOR from a prior
            // successful run) — nothing left for this job to do.
            return Ok(());
        }

        let case = self.storage.require_case(case_id).await?;
        let agency_record_number = case
            .agency_record_number
            .clone()
            .ok_or_else(|| ServiceError::InvalidInput("case missing agency_record_number".to_owned()))?;
        let extracted_text = case
            .extracted_text
            .clone()
            .ok_or_else(|| ServiceError::InvalidInput("case missing extracted_text".to_owned()))?;
        let summary_text = case
            .summary_text
            .clone()
            .ok_or_else(|| ServiceError::InvalidInput("case missing summary_text".to_owned()))?;
        let suggested_action_json = case
            .suggested_action_json
            .clone()
            .ok_or_else(|| ServiceError::InvalidInput("case missing suggested_action_json".to_owned()))?;

        let existing = self.storage.list_case_messages(case_id).await?;
        let already_posted = existing.iter().any(|m| m.kind == CaseMessageKind::Room2CaseRoot);

        if !already_posted {
            self.post_widget_messages(&case, &agency_record_number, &extracted_text, &summary_text, &suggested_action_json)
                .await?;
        }

        if !self.storage.transition_status(case_id, CaseStatus::R2PostWidget, CaseStatus::WaitDoctor).await? {
            return Err(ServiceError::retriable(
                "transition",
                format!("case {case_id} not in R2_POST_WIDGET for final transition to WAIT_DOCTOR"),
            ));
        }

        Ok(())
    }

    async fn post_widget_messages(
        &self,
        case: &Case,
        agency_record_number: &str,
        extracted_text: &str,
        summary_text: &str,
        suggested_action_json: &serde_json::Value,
    ) -> Result<(), ServiceError> {
        let prior_case_note = prior_case_lookup::render_prior_case_note(
            &self.storage,
            case.case_id,
            agency_record_number,
        )
        .await?;

        let root_body = templates::render_room2_root(case.case_id, agency_record_number, prior_case_note.as_deref());
        let root_event_id = self.chat.send_text(&self.rooms.room2_id, &root_body).await?;
        self.record_posted(
            case.case_id,
            &root_event_id,
            CaseMessageKind::Room2CaseRoot,
            "ROOM2_CASE_ROOT_POSTED",
            &root_body,
            None,
        )
        .await?;

        let attachment_filename = templates::room2_attachment_filename(case.case_id);
        let attachment_event_id = self
            .chat
            .reply_file_text(&self.rooms.room2_id, &root_event_id, &attachment_filename, extracted_text)
            .await?;
        self.record_posted(
            case.case_id,
            &attachment_event_id,
            CaseMessageKind::Room2CaseInstructions,
            "ROOM2_CASE_INSTRUCTIONS_POSTED",
            extracted_text,
            Some(&root_event_id),
        )
        .await?;

        let summary_body = templates::render_room2_summary(summary_text, suggested_action_json);
        let summary_event_id = self.chat.reply_text(&self.rooms.room2_id, &root_event_id, &summary_body).await?;
        self.record_posted(
            case.case_id,
            &summary_event_id,
            CaseMessageKind::Room2CaseSummary,
            "ROOM2_CASE_SUMMARY_POSTED",
            &summary_body,
            Some(&root_event_id),
        )
        .await?;

        let template_body = templates::render_room2_decision_template(case.case_id);
        let template_event_id = self.chat.reply_text(&self.rooms.room2_id, &root_event_id, &template_body).await?;
        self.record_posted(
            case.case_id,
            &template_event_id,
            CaseMessageKind::Room2CaseTemplate,
            "ROOM2_CASE_TEMPLATE_POSTED",
            &template_body,
            Some(&root_event_id),
        )
        .await?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors the case_messages + audit + transcript trio every poster writes")]
    async fn record_posted(
        &self,
        case_id: Uuid,
        event_id: &str,
        kind: CaseMessageKind,
        audit_event_type: &'static str,
        message_text: &str,
        reply_to_event_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.storage.record_case_message(case_id, &self.rooms.room2_id, event_id, kind, None).await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::bot(case_id, audit_event_type)
                    .with_room(self.rooms.room2_id.clone())
                    .with_matrix_event(event_id.to_owned()),
            )
            .await?;
        self.storage
            .record_matrix_message_transcript(
                case_id,
                &self.rooms.room2_id,
                event_id,
                "bot",
                "m.text",
                message_text,
                reply_to_event_id,
            )
            .await?;
        Ok(())
    }
}
