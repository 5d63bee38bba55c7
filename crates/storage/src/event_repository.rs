//! Append-only writes and ordered reads on `case_events`.

use std::str::FromStr;

use sqlx::FromRow;
use uuid::Uuid;

use triage_core::{ActorType, CaseEvent, NewCaseEvent};

use crate::error::StorageError;
use crate::PgStorage;

#[derive(FromRow)]
struct EventRow {
    event_id: i64,
    case_id: Uuid,
    occurred_at: chrono::DateTime<chrono::Utc>,
    actor_type: String,
    actor_user_id: Option<String>,
    room_id: Option<String>,
    matrix_event_id: Option<String>,
    event_type: String,
    payload_json: serde_json::Value,
}

impl TryFrom<EventRow> for CaseEvent {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, StorageError> {
        Ok(Self {
            event_id: row.event_id,
            case_id: row.case_id,
            occurred_at: row.occurred_at,
            actor_type: ActorType::from_str(&row.actor_type).map_err(|e| {
                StorageError::DataCorruption { context: "actor_type".to_owned(), source: Box::new(e) }
            })?,
            actor_user_id: row.actor_user_id,
            room_id: row.room_id,
            matrix_event_id: row.matrix_event_id,
            event_type: row.event_type,
            payload_json: row.payload_json,
        })
    }
}

impl PgStorage {
    /// Append one audit row. Never updates or deletes.
    pub async fn append_case_event(&self, event: &NewCaseEvent) -> Result<CaseEvent, StorageError> {
        let row = sqlx::query_as::<_, EventRow>(
            "INSERT INTO case_events (case_id, actor_type, actor_user_id, room_id, matrix_event_id, event_type, payload_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING event_id, case_id, occurred_at, actor_type, actor_user_id, room_id, matrix_event_id, event_type, payload_json",
        )
        .bind(event.case_id)
        .bind(event.actor_type.as_db_str())
        .bind(&event.actor_user_id)
        .bind(&event.room_id)
        .bind(&event.matrix_event_id)
        .bind(&event.event_type)
        .bind(&event.payload_json)
        .fetch_one(self.pool())
        .await?;
        CaseEvent::try_from(row)
    }

    /// Full audit trail for a case, oldest first.
    pub async fn list_case_events(&self, case_id: Uuid) -> Result<Vec<CaseEvent>, StorageError> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT event_id, case_id, occurred_at, actor_type, actor_user_id, room_id, matrix_event_id, event_type, payload_json \
             FROM case_events WHERE case_id = $1 ORDER BY event_id",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(CaseEvent::try_from).collect()
    }
}
