//! `case_messages`: the reply-routing index and cleanup redaction list.

use std::str::FromStr;

use sqlx::FromRow;
use uuid::Uuid;

use triage_core::{CaseMessage, CaseMessageKind};

use crate::error::StorageError;
use crate::PgStorage;

#[derive(FromRow)]
struct MessageRow {
    case_id: Uuid,
    room_id: String,
    event_id: String,
    kind: String,
    sender_user_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<MessageRow> for CaseMessage {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, StorageError> {
        Ok(Self {
            case_id: row.case_id,
            room_id: row.room_id,
            event_id: row.event_id,
            kind: CaseMessageKind::from_str(&row.kind).map_err(|e| StorageError::DataCorruption {
                context: "case_messages.kind".to_owned(),
                source: Box::new(e),
            })?,
            sender_user_id: row.sender_user_id,
            created_at: row.created_at,
        })
    }
}

impl PgStorage {
    /// Record a message-to-case mapping. On a `(room_id, event_id)`
    /// collision (duplicate poller delivery) this is a silent no-op:
    /// returns the existing row rather than erroring.
    pub async fn record_case_message(
        &self,
        case_id: Uuid,
        room_id: &str,
        event_id: &str,
        kind: CaseMessageKind,
        sender_user_id: Option<&str>,
    ) -> Result<CaseMessage, StorageError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "INSERT INTO case_messages (case_id, room_id, event_id, kind, sender_user_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (room_id, event_id) DO UPDATE SET room_id = EXCLUDED.room_id \
             RETURNING case_id, room_id, event_id, kind, sender_user_id, created_at",
        )
        .bind(case_id)
        .bind(room_id)
        .bind(event_id)
        .bind(kind.as_db_str())
        .bind(sender_user_id)
        .fetch_one(self.pool())
        .await?;
        CaseMessage::try_from(row)
    }

    pub async fn find_case_message(
        &self,
        room_id: &str,
        event_id: &str,
    ) -> Result<Option<CaseMessage>, StorageError> {
        let row = sqlx::query_as::<_, MessageRow>(
            "SELECT case_id, room_id, event_id, kind, sender_user_id, created_at \
             FROM case_messages WHERE room_id = $1 AND event_id = $2",
        )
        .bind(room_id)
        .bind(event_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(CaseMessage::try_from).transpose()
    }

    pub async fn list_case_messages(&self, case_id: Uuid) -> Result<Vec<CaseMessage>, StorageError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT case_id, room_id, event_id, kind, sender_user_id, created_at \
             FROM case_messages WHERE case_id = $1 ORDER BY created_at",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(CaseMessage::try_from).collect()
    }

    /// All `(room_id, event_id)` pairs for a case, for the Room-1 cleanup
    /// job's redaction sweep.
    pub async fn list_case_message_ids(&self, case_id: Uuid) -> Result<Vec<(String, String)>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT room_id, event_id FROM case_messages WHERE case_id = $1",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
