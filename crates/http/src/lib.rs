//! HTTP API server (Axum): the decision webhook, the admin widget API, and
//! the monitoring read model.

pub mod api_error;

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use triage_core::{CaseStatus, DoctorDecision, SupportFlag};
use triage_service::ports::{self, TokenService};
use triage_service::{DoctorDecisionPayload, DoctorDecisionService};
use triage_storage::monitoring_repository::TimelineEntry;
use triage_storage::PgStorage;

use api_error::{outcome_to_api_error, ApiError};

/// Shared state handed to every handler.
pub struct AppState {
    pub storage: Arc<PgStorage>,
    pub doctor_decision: Arc<DoctorDecisionService>,
    pub webhook_hmac_secret: String,
    pub token_service: Arc<dyn TokenService>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/callbacks/triage-decision", post(decision_webhook))
        .route("/widget/room2/bootstrap", post(widget_bootstrap))
        .route("/widget/room2/submit", post(widget_submit))
        .route("/monitoring/cases", get(list_monitoring_cases))
        .route("/monitoring/cases/{case_id}", get(get_monitoring_case))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Shape shared by the decision webhook and the widget submit endpoint.
#[derive(Debug, Deserialize)]
struct DecisionRequest {
    case_id: Uuid,
    doctor_user_id: String,
    decision: String,
    support_flag: String,
    reason: Option<String>,
    widget_event_id: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

impl DecisionRequest {
    fn into_payload(self) -> Result<DoctorDecisionPayload, ApiError> {
        let decision = DoctorDecision::from_str(&self.decision).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let support_flag =
            SupportFlag::from_str(&self.support_flag).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(DoctorDecisionPayload {
            case_id: self.case_id,
            doctor_user_id: self.doctor_user_id,
            decision,
            support_flag,
            reason: self.reason,
            widget_event_id: self.widget_event_id,
            submitted_at: self.submitted_at,
        })
    }
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

/// `POST /callbacks/triage-decision`: HMAC-SHA256 over the raw body,
/// signature hex-encoded in `X-Signature`. Verified before the body is
/// ever deserialized, so a forged body never reaches decision logic.
async fn decision_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Result<Json<OkResponse>, ApiError> {
    let signature = headers
        .get("X-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing X-Signature header".to_owned()))?;

    if !ports::verify_webhook_signature(&state.webhook_hmac_secret, &raw_body, signature) {
        return Err(ApiError::Unauthorized("invalid webhook signature".to_owned()));
    }

    let request: DecisionRequest =
        serde_json::from_slice(&raw_body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))?;
    let payload = request.into_payload()?;

    let outcome = state.doctor_decision.apply(payload).await?;
    if let Some(err) = outcome_to_api_error(outcome, "case not in WAIT_DOCTOR") {
        return Err(err);
    }
    Ok(Json(OkResponse { ok: true }))
}

/// Resolves and validates the bearer token on a widget request. Returns
/// the authenticated admin user, or the `401`/`403` §7 calls for.
async fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<triage_core::User, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing authorization header".to_owned()))?;
    let raw_token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("expected a Bearer token".to_owned()))?;

    let token_hash = state.token_service.hash(raw_token);
    let token = state
        .storage
        .find_auth_token_by_hash(&token_hash)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown bearer token".to_owned()))?;
    if !token.is_active(Utc::now()) {
        return Err(ApiError::Unauthorized("bearer token expired or revoked".to_owned()));
    }

    let user = state
        .storage
        .get_user(token.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown bearer token".to_owned()))?;
    if !user.is_active() {
        return Err(ApiError::Forbidden("account is not active".to_owned()));
    }
    if user.role != triage_core::Role::Admin {
        return Err(ApiError::Forbidden("admin role required".to_owned()));
    }
    Ok(user)
}

#[derive(Debug, Deserialize)]
struct CaseIdRequest {
    case_id: Uuid,
}

#[derive(Debug, Serialize)]
struct WidgetBootstrapResponse {
    case_id: Uuid,
    status: CaseStatus,
    doctor_decision: Option<DoctorDecision>,
    doctor_reason: Option<String>,
}

/// `POST /widget/room2/bootstrap`: the widget's read of a case's current
/// decision state, used to render the form before the doctor submits.
async fn widget_bootstrap(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CaseIdRequest>,
) -> Result<Json<WidgetBootstrapResponse>, ApiError> {
    authenticate_admin(&state, &headers).await?;

    let case = state
        .storage
        .get_case(request.case_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("case '{}' not found", request.case_id)))?;

    Ok(Json(WidgetBootstrapResponse {
        case_id: case.case_id,
        status: case.status,
        doctor_decision: case.doctor_decision,
        doctor_reason: case.doctor_reason,
    }))
}

/// `POST /widget/room2/submit`: same payload shape as the webhook, same
/// `apply()` semantics, admin-bearer-authenticated instead of HMAC-signed.
async fn widget_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    authenticate_admin(&state, &headers).await?;

    let payload = request.into_payload()?;
    let outcome = state.doctor_decision.apply(payload).await?;
    if let Some(err) = outcome_to_api_error(outcome, "case not in WAIT_DOCTOR") {
        return Err(err);
    }
    Ok(Json(OkResponse { ok: true }))
}

#[derive(Debug, Deserialize)]
struct MonitoringListQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
    status: Option<String>,
    from_date: Option<DateTime<Utc>>,
    to_date: Option<DateTime<Utc>>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

#[derive(Debug, Serialize)]
struct MonitoringCaseSummaryResponse {
    case_id: Uuid,
    status: CaseStatus,
    agency_record_number: Option<String>,
    created_at: DateTime<Utc>,
    latest_activity_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct MonitoringListResponse {
    cases: Vec<MonitoringCaseSummaryResponse>,
    total_count: i64,
    page: i64,
    page_size: i64,
}

/// `GET /monitoring/cases`: paginated case list. Default window is
/// today UTC, matching §6.
async fn list_monitoring_cases(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonitoringListQuery>,
) -> Result<Json<MonitoringListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(CaseStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let now = Utc::now();
    let default_from = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .unwrap_or(now);
    let from_date = query.from_date.unwrap_or(default_from);
    let to_date = query.to_date.unwrap_or(now);

    let page = state.storage.list_cases_for_monitoring(status, from_date, to_date, query.page, query.page_size).await?;

    Ok(Json(MonitoringListResponse {
        cases: page
            .cases
            .into_iter()
            .map(|c| MonitoringCaseSummaryResponse {
                case_id: c.case_id,
                status: c.status,
                agency_record_number: c.agency_record_number,
                created_at: c.created_at,
                latest_activity_at: c.latest_activity_at,
            })
            .collect(),
        total_count: page.total_count,
        page: query.page,
        page_size: query.page_size,
    }))
}

#[derive(Debug, Serialize)]
struct TimelineEntryResponse {
    timestamp: DateTime<Utc>,
    source: &'static str,
    channel: Option<String>,
    actor: Option<String>,
    event_type: String,
    payload: Option<serde_json::Value>,
    content_text: Option<String>,
}

impl From<TimelineEntry> for TimelineEntryResponse {
    fn from(entry: TimelineEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            source: entry.source.as_str(),
            channel: entry.channel,
            actor: entry.actor,
            event_type: entry.event_type,
            payload: entry.payload,
            content_text: entry.content_text,
        }
    }
}

#[derive(Debug, Serialize)]
struct MonitoringCaseDetailResponse {
    case_id: Uuid,
    status: CaseStatus,
    timeline: Vec<TimelineEntryResponse>,
}

/// `GET /monitoring/cases/{case_id}`: a single case's assembled activity
/// timeline, ascending by timestamp.
async fn get_monitoring_case(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<Uuid>,
) -> Result<Json<MonitoringCaseDetailResponse>, ApiError> {
    let case =
        state.storage.get_case(case_id).await?.ok_or_else(|| ApiError::NotFound(format!("case '{case_id}' not found")))?;
    let timeline = state.storage.get_case_timeline(case_id).await?;

    Ok(Json(MonitoringCaseDetailResponse {
        case_id: case.case_id,
        status: case.status,
        timeline: timeline.into_iter().map(TimelineEntryResponse::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_request_rejects_unknown_decision() {
        let request = DecisionRequest {
            case_id: Uuid::new_v4(),
            doctor_user_id: "@doctor:example.org".to_owned(),
            decision: "maybe".to_owned(),
            support_flag: "none".to_owned(),
            reason: None,
            widget_event_id: None,
            submitted_at: None,
        };
        assert!(request.into_payload().is_err());
    }

    #[test]
    fn decision_request_parses_valid_payload() {
        let case_id = Uuid::new_v4();
        let request = DecisionRequest {
            case_id,
            doctor_user_id: "@doctor:example.org".to_owned(),
            decision: "accept".to_owned(),
            support_flag: "anesthesist".to_owned(),
            reason: None,
            widget_event_id: None,
            submitted_at: None,
        };
        let payload = request.into_payload().expect("valid payload");
        assert_eq!(payload.case_id, case_id);
        assert_eq!(payload.decision, DoctorDecision::Accept);
        assert_eq!(payload.support_flag, SupportFlag::Anesthesist);
    }
}
