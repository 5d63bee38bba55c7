//! Monitoring read model: paginated case list and per-case activity
//! timeline, assembled by unioning the four activity sources.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::CaseStatus;

use crate::error::StorageError;
use crate::PgStorage;

/// One row of the monitoring list: a case plus its most recent activity
/// timestamp across any of the four activity sources.
#[derive(Debug, Clone, FromRow)]
struct MonitoringCaseRow {
    case_id: Uuid,
    status: String,
    agency_record_number: Option<String>,
    created_at: DateTime<Utc>,
    latest_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MonitoringCaseSummary {
    pub case_id: Uuid,
    pub status: CaseStatus,
    pub agency_record_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub latest_activity_at: DateTime<Utc>,
}

impl TryFrom<MonitoringCaseRow> for MonitoringCaseSummary {
    type Error = StorageError;

    fn try_from(row: MonitoringCaseRow) -> Result<Self, StorageError> {
        Ok(Self {
            case_id: row.case_id,
            status: CaseStatus::from_str(&row.status).map_err(|e| StorageError::DataCorruption {
                context: "monitoring case status".to_owned(),
                source: Box::new(e),
            })?,
            agency_record_number: row.agency_record_number,
            created_at: row.created_at,
            latest_activity_at: row.latest_activity_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MonitoringPage {
    pub cases: Vec<MonitoringCaseSummary>,
    pub total_count: i64,
}

/// One entry in a case's assembled activity timeline.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    pub source: TimelineSource,
    pub channel: Option<String>,
    pub actor: Option<String>,
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub content_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineSource {
    Pdf,
    Llm,
    Matrix,
    Audit,
}

impl TimelineSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Llm => "llm",
            Self::Matrix => "matrix",
            Self::Audit => "audit",
        }
    }
}

impl PgStorage {
    /// Paginated monitoring list. "Latest activity" is `MAX(activity_at)`
    /// over a `UNION ALL` of `cases.updated_at` and the three transcript
    /// tables' `captured_at`, grouped by case, filtered by status/date
    /// window, ordered `(latest_activity_at DESC, case_id DESC)` for
    /// stable pagination.
    pub async fn list_cases_for_monitoring(
        &self,
        status: Option<CaseStatus>,
        from_date: DateTime<Utc>,
        to_date: DateTime<Utc>,
        page: i64,
        page_size: i64,
    ) -> Result<MonitoringPage, StorageError> {
        let offset = (page.max(1) - 1) * page_size;
        let status_filter = status.map(CaseStatus::as_db_str);

        let rows = sqlx::query_as::<_, MonitoringCaseRow>(
            "WITH activity AS ( \
                SELECT case_id, updated_at AS activity_at FROM cases \
                UNION ALL \
                SELECT case_id, captured_at FROM case_report_transcripts \
                UNION ALL \
                SELECT case_id, captured_at FROM case_llm_interactions \
                UNION ALL \
                SELECT case_id, captured_at FROM case_matrix_message_transcripts \
             ), latest AS ( \
                SELECT case_id, max(activity_at) AS latest_activity_at FROM activity GROUP BY case_id \
             ) \
             SELECT c.case_id, c.status, c.agency_record_number, c.created_at, l.latest_activity_at \
             FROM cases c \
             JOIN latest l ON l.case_id = c.case_id \
             WHERE ($1::text IS NULL OR c.status = $1) \
               AND l.latest_activity_at >= $2 AND l.latest_activity_at <= $3 \
             ORDER BY l.latest_activity_at DESC, c.case_id DESC \
             LIMIT $4 OFFSET $5",
        )
        .bind(status_filter)
        .bind(from_date)
        .bind(to_date)
        .bind(page_size)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        let total_count: i64 = sqlx::query_scalar(
            "WITH activity AS ( \
                SELECT case_id, updated_at AS activity_at FROM cases \
                UNION ALL \
                SELECT case_id, captured_at FROM case_report_transcripts \
                UNION ALL \
                SELECT case_id, captured_at FROM case_llm_interactions \
                UNION ALL \
                SELECT case_id, captured_at FROM case_matrix_message_transcripts \
             ), latest AS ( \
                SELECT case_id, max(activity_at) AS latest_activity_at FROM activity GROUP BY case_id \
             ) \
             SELECT count(*) FROM cases c \
             JOIN latest l ON l.case_id = c.case_id \
             WHERE ($1::text IS NULL OR c.status = $1) \
               AND l.latest_activity_at >= $2 AND l.latest_activity_at <= $3",
        )
        .bind(status_filter)
        .bind(from_date)
        .bind(to_date)
        .fetch_one(self.pool())
        .await?;

        let cases = rows.into_iter().map(MonitoringCaseSummary::try_from).collect::<Result<_, _>>()?;
        Ok(MonitoringPage { cases, total_count })
    }

    /// A single case's timeline: the union of all four activity sources,
    /// ascending by timestamp.
    pub async fn get_case_timeline(&self, case_id: Uuid) -> Result<Vec<TimelineEntry>, StorageError> {
        let mut entries = Vec::new();

        for event in self.list_case_events(case_id).await? {
            entries.push(TimelineEntry {
                timestamp: event.occurred_at,
                source: TimelineSource::Audit,
                channel: event.room_id.clone(),
                actor: event.actor_user_id.clone().or_else(|| Some(event.actor_type.as_db_str().to_owned())),
                event_type: event.event_type,
                payload: Some(event.payload_json),
                content_text: None,
            });
        }

        for t in self.list_report_transcripts(case_id).await? {
            entries.push(TimelineEntry {
                timestamp: t.captured_at,
                source: TimelineSource::Pdf,
                channel: None,
                actor: None,
                event_type: "report_extracted".to_owned(),
                payload: None,
                content_text: Some(t.extracted_text),
            });
        }

        for t in self.list_llm_interactions(case_id).await? {
            entries.push(TimelineEntry {
                timestamp: t.captured_at,
                source: TimelineSource::Llm,
                channel: None,
                actor: Some(t.model_name.clone()),
                event_type: t.stage.clone(),
                payload: Some(serde_json::json!({
                    "input": t.input_payload,
                    "output": t.output_payload,
                    "prompt_system": { "name": t.prompt_system_name, "version": t.prompt_system_version },
                    "prompt_user": { "name": t.prompt_user_name, "version": t.prompt_user_version },
                })),
                content_text: None,
            });
        }

        for t in self.list_matrix_message_transcripts(case_id).await? {
            entries.push(TimelineEntry {
                timestamp: t.captured_at,
                source: TimelineSource::Matrix,
                channel: Some(t.room_id.clone()),
                actor: Some(t.sender.clone()),
                event_type: t.message_type.clone(),
                payload: t.reply_to_event_id.clone().map(|r| serde_json::json!({ "reply_to_event_id": r })),
                content_text: Some(t.message_text.clone()),
            });
        }

        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}
