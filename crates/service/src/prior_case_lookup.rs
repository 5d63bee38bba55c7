//! §4.6 prior-case lookup: wraps `PgStorage::find_prior_denial` with the
//! reason-normalization and note-rendering rules the Room-2 widget poster
//! applies to its result.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use triage_core::normalize_reason;
use triage_core::PRIOR_CASE_DENIAL_WINDOW_DAYS;
use triage_storage::PgStorage;

use crate::error::ServiceError;

/// Look up the most recent denial for `agency_record_number` within the
/// trailing window, rendered as a one-line note (or `None` if the window
/// holds no prior denial).
pub async fn render_prior_case_note(
    storage: &Arc<PgStorage>,
    case_id: Uuid,
    agency_record_number: &str,
) -> Result<Option<String>, ServiceError> {
    let lookup = storage
        .find_prior_denial(case_id, agency_record_number, Utc::now(), PRIOR_CASE_DENIAL_WINDOW_DAYS)
        .await?;

    if lookup.most_recent.is_none() {
        return Ok(None);
    }

    let reason = normalize_reason(lookup.most_recent.as_ref().and_then(|d| d.reason.as_deref()));
    Ok(Some(crate::templates::render_prior_case_note(lookup.denial_count_in_window, &reason)))
}
