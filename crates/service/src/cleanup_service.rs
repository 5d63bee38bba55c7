//! The `execute_cleanup` handler: redact every message recorded for a
//! case across all three rooms.

use std::sync::Arc;

use uuid::Uuid;

use triage_core::NewCaseEvent;
use triage_storage::PgStorage;

use crate::error::ServiceError;
use crate::ports::ChatTransport;

pub struct CleanupService {
    storage: Arc<PgStorage>,
    chat: Arc<dyn ChatTransport>,
}

impl CleanupService {
    #[must_use]
    pub fn new(storage: Arc<PgStorage>, chat: Arc<dyn ChatTransport>) -> Self {
        Self { storage, chat }
    }

    /// Redact every message recorded for `case_id`. Individual redaction
    /// failures are logged and swallowed so one bad message doesn't stop
    /// the rest of the sweep; the job as a whole only succeeds if every
    /// redaction succeeded, so a partial failure is retried in full —
    /// redaction is idempotent on an already-redacted event.
    pub async fn execute(&self, case_id: Uuid) -> Result<(), ServiceError> {
        let message_ids = self.storage.list_case_message_ids(case_id).await?;

        let mut failures = 0usize;
        for (room_id, event_id) in &message_ids {
            if let Err(e) = self.chat.redact_event(room_id, event_id).await {
                tracing::warn!(
                    case_id = %case_id,
                    room_id = %room_id,
                    event_id = %event_id,
                    error = %e,
                    "failed to redact case message during cleanup"
                );
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(ServiceError::retriable(
                "cleanup",
                format!("{failures}/{} message redactions failed", message_ids.len()),
            ));
        }

        if !self.storage.mark_cleanup_completed(case_id).await? {
            return Err(ServiceError::retriable(
                "cleanup",
                format!("case {case_id} not in CLEANUP_RUNNING for mark_cleanup_completed"),
            ));
        }
        self.storage.append_case_event(&NewCaseEvent::system(case_id, "CLEANUP_COMPLETED")).await?;

        Ok(())
    }
}
