//! `case_reaction_checkpoints`: audit-only tracking of expected reactions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::{CaseReactionCheckpoint, ReactionCheckpointOutcome, ReactionCheckpointStage};

use crate::error::StorageError;
use crate::PgStorage;

#[derive(FromRow)]
struct CheckpointRow {
    checkpoint_id: i64,
    case_id: Uuid,
    stage: String,
    room_id: String,
    target_event_id: String,
    outcome: String,
    reactor_user_id: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<CheckpointRow> for CaseReactionCheckpoint {
    type Error = StorageError;

    fn try_from(row: CheckpointRow) -> Result<Self, StorageError> {
        Ok(Self {
            checkpoint_id: row.checkpoint_id,
            case_id: row.case_id,
            stage: ReactionCheckpointStage::from_str(&row.stage).map_err(|e| {
                StorageError::DataCorruption { context: "checkpoint stage".to_owned(), source: Box::new(e) }
            })?,
            room_id: row.room_id,
            target_event_id: row.target_event_id,
            outcome: ReactionCheckpointOutcome::from_str(&row.outcome).map_err(|e| {
                StorageError::DataCorruption { context: "checkpoint outcome".to_owned(), source: Box::new(e) }
            })?,
            reactor_user_id: row.reactor_user_id,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

impl PgStorage {
    /// Open a checkpoint for an expected reaction. Idempotent on
    /// `(case_id, stage, target_event_id)`: a duplicate open returns the
    /// existing row.
    pub async fn open_reaction_checkpoint(
        &self,
        case_id: Uuid,
        stage: ReactionCheckpointStage,
        room_id: &str,
        target_event_id: &str,
    ) -> Result<CaseReactionCheckpoint, StorageError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "INSERT INTO case_reaction_checkpoints (case_id, stage, room_id, target_event_id, outcome) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (case_id, stage, target_event_id) DO UPDATE SET stage = EXCLUDED.stage \
             RETURNING checkpoint_id, case_id, stage, room_id, target_event_id, outcome, reactor_user_id, created_at, resolved_at",
        )
        .bind(case_id)
        .bind(stage.as_db_str())
        .bind(room_id)
        .bind(target_event_id)
        .bind(ReactionCheckpointOutcome::Pending.as_db_str())
        .fetch_one(self.pool())
        .await?;
        CaseReactionCheckpoint::try_from(row)
    }

    /// Resolve a checkpoint on a positive reaction. A CAS on `outcome =
    /// 'PENDING'` so a second thumbs-up on the same message is a no-op.
    pub async fn resolve_reaction_checkpoint(
        &self,
        room_id: &str,
        target_event_id: &str,
        reactor_user_id: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE case_reaction_checkpoints SET outcome = $1, reactor_user_id = $2, resolved_at = now() \
             WHERE room_id = $3 AND target_event_id = $4 AND outcome = $5",
        )
        .bind(ReactionCheckpointOutcome::PositiveReceived.as_db_str())
        .bind(reactor_user_id)
        .bind(room_id)
        .bind(target_event_id)
        .bind(ReactionCheckpointOutcome::Pending.as_db_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_checkpoint_by_target(
        &self,
        room_id: &str,
        target_event_id: &str,
    ) -> Result<Option<CaseReactionCheckpoint>, StorageError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            "SELECT checkpoint_id, case_id, stage, room_id, target_event_id, outcome, reactor_user_id, created_at, resolved_at \
             FROM case_reaction_checkpoints WHERE room_id = $1 AND target_event_id = $2",
        )
        .bind(room_id)
        .bind(target_event_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(CaseReactionCheckpoint::try_from).transpose()
    }

    pub async fn list_case_checkpoints(
        &self,
        case_id: Uuid,
    ) -> Result<Vec<CaseReactionCheckpoint>, StorageError> {
        let rows = sqlx::query_as::<_, CheckpointRow>(
            "SELECT checkpoint_id, case_id, stage, room_id, target_event_id, outcome, reactor_user_id, created_at, resolved_at \
             FROM case_reaction_checkpoints WHERE case_id = $1 ORDER BY created_at",
        )
        .bind(case_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(CaseReactionCheckpoint::try_from).collect()
    }
}
