//! Reaction checkpoints: an audit convenience, not a behavioral gate —
//! nothing reads these to decide whether to proceed; they exist purely so
//! a dashboard can show "awaiting thumbs-up".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Which posted message a checkpoint is tracking a positive reaction for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionCheckpointStage {
    Room2Ack,
    Room3Ack,
    Room1Final,
}

impl ReactionCheckpointStage {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Room2Ack => "ROOM2_ACK",
            Self::Room3Ack => "ROOM3_ACK",
            Self::Room1Final => "ROOM1_FINAL",
        }
    }
}

impl std::str::FromStr for ReactionCheckpointStage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "ROOM2_ACK" => Self::Room2Ack,
            "ROOM3_ACK" => Self::Room3Ack,
            "ROOM1_FINAL" => Self::Room1Final,
            other => return Err(CoreError::InvalidCheckpointStage(other.to_owned())),
        })
    }
}

/// Whether the expected human confirmation has arrived yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionCheckpointOutcome {
    Pending,
    PositiveReceived,
}

impl ReactionCheckpointOutcome {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PositiveReceived => "POSITIVE_RECEIVED",
        }
    }
}

impl std::str::FromStr for ReactionCheckpointOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "POSITIVE_RECEIVED" => Self::PositiveReceived,
            other => return Err(CoreError::InvalidCheckpointOutcome(other.to_owned())),
        })
    }
}

/// One expected human confirmation, per (case, stage, target message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReactionCheckpoint {
    pub checkpoint_id: i64,
    pub case_id: Uuid,
    pub stage: ReactionCheckpointStage,
    pub room_id: String,
    pub target_event_id: String,
    pub outcome: ReactionCheckpointOutcome,
    pub reactor_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Strip Unicode variation selectors (U+FE0E/U+FE0F) and surrounding
/// whitespace, then test whether the result is one of the two accepted
/// positive reaction keys.
#[must_use]
pub fn is_positive_reaction(key: &str) -> bool {
    let normalized: String =
        key.chars().filter(|&c| c != '\u{FE0E}' && c != '\u{FE0F}').collect();
    matches!(normalized.trim(), "\u{1F44D}" | "\u{2705}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_thumbs_up_and_variation_selectors() {
        for key in ["\u{1F44D}", "\u{1F44D}\u{FE0F}", " \u{1F44D} "] {
            assert!(is_positive_reaction(key), "expected {key:?} to be positive");
        }
    }

    #[test]
    fn accepts_checkmark_and_variation_selectors() {
        for key in ["\u{2705}", "\u{2705}\u{FE0F}"] {
            assert!(is_positive_reaction(key), "expected {key:?} to be positive");
        }
    }

    #[test]
    fn rejects_everything_else() {
        for key in ["\u{1F44E}", "\u{2764}", "", "thumbsup"] {
            assert!(!is_positive_reaction(key), "expected {key:?} to be rejected");
        }
    }
}
