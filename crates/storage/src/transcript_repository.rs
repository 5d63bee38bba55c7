//! Three append-only transcript tables feeding the monitoring timeline:
//! extracted report text, LLM interactions, and raw Matrix messages.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::PromptVersionRef;

use crate::error::StorageError;
use crate::PgStorage;

#[derive(Debug, Clone, FromRow)]
pub struct ReportTranscript {
    pub transcript_id: i64,
    pub case_id: Uuid,
    pub extracted_text: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct LlmInteraction {
    pub interaction_id: i64,
    pub case_id: Uuid,
    pub stage: String,
    pub input_payload: serde_json::Value,
    pub output_payload: serde_json::Value,
    pub prompt_system_name: String,
    pub prompt_system_version: i32,
    pub prompt_user_name: String,
    pub prompt_user_version: i32,
    pub model_name: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MatrixMessageTranscript {
    pub transcript_id: i64,
    pub case_id: Uuid,
    pub room_id: String,
    pub event_id: String,
    pub sender: String,
    pub message_type: String,
    pub message_text: String,
    pub reply_to_event_id: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// The two prompts used for one LLM call, each stamped at call time.
#[derive(Debug, Clone)]
pub struct PromptPairRef {
    pub system: PromptVersionRef,
    pub user: PromptVersionRef,
}

impl PgStorage {
    pub async fn record_report_transcript(
        &self,
        case_id: Uuid,
        extracted_text: &str,
    ) -> Result<ReportTranscript, StorageError> {
        let row = sqlx::query_as::<_, ReportTranscript>(
            "INSERT INTO case_report_transcripts (case_id, extracted_text) VALUES ($1, $2) \
             RETURNING transcript_id, case_id, extracted_text, captured_at",
        )
        .bind(case_id)
        .bind(extracted_text)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn record_llm_interaction(
        &self,
        case_id: Uuid,
        stage: &str,
        input_payload: &serde_json::Value,
        output_payload: &serde_json::Value,
        prompts: &PromptPairRef,
        model_name: &str,
    ) -> Result<LlmInteraction, StorageError> {
        let row = sqlx::query_as::<_, LlmInteraction>(
            "INSERT INTO case_llm_interactions \
             (case_id, stage, input_payload, output_payload, prompt_system_name, prompt_system_version, \
              prompt_user_name, prompt_user_version, model_name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING interaction_id, case_id, stage, input_payload, output_payload, prompt_system_name, \
                       prompt_system_version, prompt_user_name, prompt_user_version, model_name, captured_at",
        )
        .bind(case_id)
        .bind(stage)
        .bind(input_payload)
        .bind(output_payload)
        .bind(&prompts.system.name)
        .bind(prompts.system.version)
        .bind(&prompts.user.name)
        .bind(prompts.user.version)
        .bind(model_name)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn record_matrix_message_transcript(
        &self,
        case_id: Uuid,
        room_id: &str,
        event_id: &str,
        sender: &str,
        message_type: &str,
        message_text: &str,
        reply_to_event_id: Option<&str>,
    ) -> Result<MatrixMessageTranscript, StorageError> {
        let row = sqlx::query_as::<_, MatrixMessageTranscript>(
            "INSERT INTO case_matrix_message_transcripts \
             (case_id, room_id, event_id, sender, message_type, message_text, reply_to_event_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING transcript_id, case_id, room_id, event_id, sender, message_type, message_text, \
                       reply_to_event_id, captured_at",
        )
        .bind(case_id)
        .bind(room_id)
        .bind(event_id)
        .bind(sender)
        .bind(message_type)
        .bind(message_text)
        .bind(reply_to_event_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn list_report_transcripts(&self, case_id: Uuid) -> Result<Vec<ReportTranscript>, StorageError> {
        let rows = sqlx::query_as::<_, ReportTranscript>(
            "SELECT transcript_id, case_id, extracted_text, captured_at \
             FROM case_report_transcripts WHERE case_id = $1 ORDER BY captured_at",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_llm_interactions(&self, case_id: Uuid) -> Result<Vec<LlmInteraction>, StorageError> {
        let rows = sqlx::query_as::<_, LlmInteraction>(
            "SELECT interaction_id, case_id, stage, input_payload, output_payload, prompt_system_name, \
                    prompt_system_version, prompt_user_name, prompt_user_version, model_name, captured_at \
             FROM case_llm_interactions WHERE case_id = $1 ORDER BY captured_at",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn list_matrix_message_transcripts(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<MatrixMessageTranscript>, StorageError> {
        let rows = sqlx::query_as::<_, MatrixMessageTranscript>(
            "SELECT transcript_id, case_id, room_id, event_id, sender, message_type, message_text, \
                    reply_to_event_id, captured_at \
             FROM case_matrix_message_transcripts WHERE case_id = $1 ORDER BY captured_at",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
