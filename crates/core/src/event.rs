//! The append-only case audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Who originated a `CaseEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    System,
    Bot,
    Human,
}

impl ActorType {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Bot => "bot",
            Self::Human => "human",
        }
    }
}

impl std::str::FromStr for ActorType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "system" => Self::System,
            "bot" => Self::Bot,
            "human" => Self::Human,
            other => return Err(CoreError::InvalidActorType(other.to_owned())),
        })
    }
}

/// One row of the append-only audit trail. Never updated or deleted —
/// repository methods only ever `INSERT` these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    pub event_id: i64,
    pub case_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub actor_type: ActorType,
    pub actor_user_id: Option<String>,
    pub room_id: Option<String>,
    pub matrix_event_id: Option<String>,
    pub event_type: String,
    pub payload_json: serde_json::Value,
}

/// A not-yet-persisted audit row, as built by a service before insertion.
#[derive(Debug, Clone)]
pub struct NewCaseEvent {
    pub case_id: Uuid,
    pub actor_type: ActorType,
    pub actor_user_id: Option<String>,
    pub room_id: Option<String>,
    pub matrix_event_id: Option<String>,
    pub event_type: String,
    pub payload_json: serde_json::Value,
}

impl NewCaseEvent {
    #[must_use]
    pub fn system(case_id: Uuid, event_type: impl Into<String>) -> Self {
        Self {
            case_id,
            actor_type: ActorType::System,
            actor_user_id: None,
            room_id: None,
            matrix_event_id: None,
            event_type: event_type.into(),
            payload_json: serde_json::json!({}),
        }
    }

    #[must_use]
    pub fn bot(case_id: Uuid, event_type: impl Into<String>) -> Self {
        Self { actor_type: ActorType::Bot, ..Self::system(case_id, event_type) }
    }

    #[must_use]
    pub fn human(case_id: Uuid, actor_user_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Human,
            actor_user_id: Some(actor_user_id.into()),
            ..Self::system(case_id, event_type)
        }
    }

    #[must_use]
    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    #[must_use]
    pub fn with_matrix_event(mut self, matrix_event_id: impl Into<String>) -> Self {
        self.matrix_event_id = Some(matrix_event_id.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload_json: serde_json::Value) -> Self {
        self.payload_json = payload_json;
        self
    }
}
