//! `case_messages`: the (room_id, event_id) -> (case_id, kind) index.
//!
//! Doubles as the cleanup redaction list and as the reply-parent resolver
//! the ingress poller uses to route Room-2/Room-3 replies back to a case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// The role a posted/received chat message plays in a case's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMessageKind {
    Room1Origin,
    BotProcessing,
    Room2CaseRoot,
    Room2CaseSummary,
    Room2CaseTemplate,
    Room2CaseInstructions,
    Room2DoctorReply,
    Room2DecisionAck,
    Room3Request,
    BotAck,
    Room3Reply,
    BotReformatPromptRoom3,
    Room1Final,
}

impl CaseMessageKind {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Room1Origin => "room1_origin",
            Self::BotProcessing => "bot_processing",
            Self::Room2CaseRoot => "room2_case_root",
            Self::Room2CaseSummary => "room2_case_summary",
            Self::Room2CaseTemplate => "room2_case_template",
            Self::Room2CaseInstructions => "room2_case_instructions",
            Self::Room2DoctorReply => "room2_doctor_reply",
            Self::Room2DecisionAck => "room2_decision_ack",
            Self::Room3Request => "room3_request",
            Self::BotAck => "bot_ack",
            Self::Room3Reply => "room3_reply",
            Self::BotReformatPromptRoom3 => "bot_reformat_prompt_room3",
            Self::Room1Final => "room1_final",
        }
    }

    /// Room-2 message kinds a doctor may legally reply to with a decision.
    #[must_use]
    pub fn is_room2_decision_parent(self) -> bool {
        matches!(self, Self::Room2CaseRoot | Self::Room2CaseInstructions | Self::Room2CaseTemplate)
    }

    /// Room-3 message kinds a scheduler may legally reply to.
    #[must_use]
    pub fn is_room3_reply_parent(self) -> bool {
        matches!(self, Self::Room3Request)
    }
}

impl std::str::FromStr for CaseMessageKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "room1_origin" => Self::Room1Origin,
            "bot_processing" => Self::BotProcessing,
            "room2_case_root" => Self::Room2CaseRoot,
            "room2_case_summary" => Self::Room2CaseSummary,
            "room2_case_template" => Self::Room2CaseTemplate,
            "room2_case_instructions" => Self::Room2CaseInstructions,
            "room2_doctor_reply" => Self::Room2DoctorReply,
            "room2_decision_ack" => Self::Room2DecisionAck,
            "room3_request" => Self::Room3Request,
            "bot_ack" => Self::BotAck,
            "room3_reply" => Self::Room3Reply,
            "bot_reformat_prompt_room3" => Self::BotReformatPromptRoom3,
            "room1_final" => Self::Room1Final,
            other => return Err(CoreError::InvalidMessageKind(other.to_owned())),
        })
    }
}

impl std::fmt::Display for CaseMessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A single row mapping a chat message to the case it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMessage {
    pub case_id: Uuid,
    pub room_id: String,
    pub event_id: String,
    pub kind: CaseMessageKind,
    pub sender_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
