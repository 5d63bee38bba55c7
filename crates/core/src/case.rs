//! The case aggregate root and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Status of a case as it moves through the triage workflow.
///
/// Transitions are enforced exclusively by CAS statements in the storage
/// layer (see `triage_storage::CaseStore`); this enum only names the closed
/// set of states a case can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStatus {
    New,
    R1AckProcessing,
    Extracting,
    LlmStruct,
    LlmSuggest,
    R2PostWidget,
    WaitDoctor,
    DoctorAccepted,
    DoctorDenied,
    R3PostRequest,
    WaitAppt,
    ApptConfirmed,
    ApptDenied,
    Failed,
    WaitR1CleanupThumbs,
    CleanupRunning,
    Cleaned,
}

impl CaseStatus {
    /// Every state except `Cleaned` is a candidate for recovery reconciliation.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cleaned)
    }

    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::R1AckProcessing => "R1_ACK_PROCESSING",
            Self::Extracting => "EXTRACTING",
            Self::LlmStruct => "LLM_STRUCT",
            Self::LlmSuggest => "LLM_SUGGEST",
            Self::R2PostWidget => "R2_POST_WIDGET",
            Self::WaitDoctor => "WAIT_DOCTOR",
            Self::DoctorAccepted => "DOCTOR_ACCEPTED",
            Self::DoctorDenied => "DOCTOR_DENIED",
            Self::R3PostRequest => "R3_POST_REQUEST",
            Self::WaitAppt => "WAIT_APPT",
            Self::ApptConfirmed => "APPT_CONFIRMED",
            Self::ApptDenied => "APPT_DENIED",
            Self::Failed => "FAILED",
            Self::WaitR1CleanupThumbs => "WAIT_R1_CLEANUP_THUMBS",
            Self::CleanupRunning => "CLEANUP_RUNNING",
            Self::Cleaned => "CLEANED",
        }
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NEW" => Self::New,
            "R1_ACK_PROCESSING" => Self::R1AckProcessing,
            "EXTRACTING" => Self::Extracting,
            "LLM_STRUCT" => Self::LlmStruct,
            "LLM_SUGGEST" => Self::LlmSuggest,
            "R2_POST_WIDGET" => Self::R2PostWidget,
            "WAIT_DOCTOR" => Self::WaitDoctor,
            "DOCTOR_ACCEPTED" => Self::DoctorAccepted,
            "DOCTOR_DENIED" => Self::DoctorDenied,
            "R3_POST_REQUEST" => Self::R3PostRequest,
            "WAIT_APPT" => Self::WaitAppt,
            "APPT_CONFIRMED" => Self::ApptConfirmed,
            "APPT_DENIED" => Self::ApptDenied,
            "FAILED" => Self::Failed,
            "WAIT_R1_CLEANUP_THUMBS" => Self::WaitR1CleanupThumbs,
            "CLEANUP_RUNNING" => Self::CleanupRunning,
            "CLEANED" => Self::Cleaned,
            other => return Err(CoreError::InvalidCaseStatus(other.to_owned())),
        })
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A doctor's binary triage decision in Room 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorDecision {
    Accept,
    Deny,
}

impl DoctorDecision {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Deny => "deny",
        }
    }

    /// The job type this decision drives.
    #[must_use]
    pub fn next_job_type(self) -> &'static str {
        match self {
            Self::Accept => "post_room3_request",
            Self::Deny => "post_room1_final_denial_triage",
        }
    }
}

impl std::str::FromStr for DoctorDecision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" | "aceitar" => Ok(Self::Accept),
            "deny" | "negar" => Ok(Self::Deny),
            other => Err(CoreError::InvalidDoctorDecision(other.to_owned())),
        }
    }
}

/// Level of anesthesia support requested alongside an `accept` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportFlag {
    None,
    Anesthesist,
    AnesthesistIcu,
}

impl SupportFlag {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Anesthesist => "anesthesist",
            Self::AnesthesistIcu => "anesthesist_icu",
        }
    }
}

impl std::str::FromStr for SupportFlag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "nenhum" => Ok(Self::None),
            "anesthesist" | "anestesista" => Ok(Self::Anesthesist),
            "anesthesist_icu" | "anestesista_uti" => Ok(Self::AnesthesistIcu),
            other => Err(CoreError::InvalidSupportFlag(other.to_owned())),
        }
    }
}

/// Validate the invariant that a deny decision never carries support.
pub fn validate_decision_support(
    decision: DoctorDecision,
    support: SupportFlag,
) -> Result<(), CoreError> {
    if decision == DoctorDecision::Deny && support != SupportFlag::None {
        return Err(CoreError::DenyWithSupport(support.as_db_str().to_owned()));
    }
    Ok(())
}

/// Scheduler's outcome for a Room-3 appointment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Denied,
}

impl AppointmentStatus {
    #[must_use]
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Denied => "denied",
        }
    }

    #[must_use]
    pub fn next_job_type(self) -> &'static str {
        match self {
            Self::Confirmed => "post_room1_final_appt",
            Self::Denied => "post_room1_final_appt_denied",
        }
    }

    #[must_use]
    pub fn next_status(self) -> CaseStatus {
        match self {
            Self::Confirmed => CaseStatus::ApptConfirmed,
            Self::Denied => CaseStatus::ApptDenied,
        }
    }
}

impl std::str::FromStr for AppointmentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "confirmed" | "confirmado" => Ok(Self::Confirmed),
            "denied" | "negado" => Ok(Self::Denied),
            other => Err(CoreError::InvalidAppointmentStatus(other.to_owned())),
        }
    }
}

/// How the case's clinical artifact was captured (currently only one mode
/// is supported; the field exists so storage modes can be added without a
/// migration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStorageMode {
    #[default]
    FullPdf,
}

/// The case aggregate: one row per triage case, origin coordinates,
/// clinical artifacts, and the three decision contexts (doctor, scheduler,
/// cleanup).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub case_id: Uuid,
    pub status: CaseStatus,

    pub room1_origin_event_id: String,
    pub room1_origin_sender_user_id: String,

    pub artifact_storage_mode: ArtifactStorageMode,
    pub pdf_mxc_url: Option<String>,
    pub pdf_sha256: Option<String>,
    pub agency_record_number: Option<String>,
    pub extracted_text: Option<String>,
    pub structured_data_json: Option<serde_json::Value>,
    pub summary_text: Option<String>,
    pub suggested_action_json: Option<serde_json::Value>,

    pub doctor_user_id: Option<String>,
    pub doctor_decision: Option<DoctorDecision>,
    pub doctor_support_flag: Option<SupportFlag>,
    pub doctor_reason: Option<String>,
    pub doctor_decided_at: Option<DateTime<Utc>>,

    pub scheduler_user_id: Option<String>,
    pub appointment_status: Option<AppointmentStatus>,
    pub appointment_datetime_text: Option<String>,
    pub appointment_location: Option<String>,
    pub appointment_instructions: Option<String>,
    pub appointment_reason: Option<String>,
    pub appointment_decided_at: Option<DateTime<Utc>>,

    pub room1_final_reply_event_id: Option<String>,

    pub cleanup_triggered_by_user_id: Option<String>,
    pub cleanup_triggered_at: Option<DateTime<Utc>>,
    pub cleanup_completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a free-text reason: blank/whitespace-only becomes the
/// "não informado" placeholder used throughout Room-1 final replies.
#[must_use]
pub fn normalize_reason(reason: Option<&str>) -> String {
    match reason.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => crate::constants::REASON_NOT_INFORMED.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn case_status_round_trips_through_db_str() {
        for status in [
            CaseStatus::New,
            CaseStatus::R1AckProcessing,
            CaseStatus::Extracting,
            CaseStatus::LlmStruct,
            CaseStatus::LlmSuggest,
            CaseStatus::R2PostWidget,
            CaseStatus::WaitDoctor,
            CaseStatus::DoctorAccepted,
            CaseStatus::DoctorDenied,
            CaseStatus::R3PostRequest,
            CaseStatus::WaitAppt,
            CaseStatus::ApptConfirmed,
            CaseStatus::ApptDenied,
            CaseStatus::Failed,
            CaseStatus::WaitR1CleanupThumbs,
            CaseStatus::CleanupRunning,
            CaseStatus::Cleaned,
        ] {
            assert_eq!(CaseStatus::from_str(status.as_db_str()).unwrap(), status);
        }
    }

    #[test]
    fn case_status_rejects_unknown_value() {
        assert!(CaseStatus::from_str("NOT_A_STATUS").is_err());
    }

    #[test]
    fn only_cleaned_is_terminal() {
        assert!(CaseStatus::Cleaned.is_terminal());
        assert!(!CaseStatus::Failed.is_terminal());
        assert!(!CaseStatus::WaitDoctor.is_terminal());
    }

    #[test]
    fn doctor_decision_accepts_portuguese_aliases() {
        assert_eq!(DoctorDecision::from_str("aceitar").unwrap(), DoctorDecision::Accept);
        assert_eq!(DoctorDecision::from_str("Negar").unwrap(), DoctorDecision::Deny);
        assert!(DoctorDecision::from_str("talvez").is_err());
    }

    #[test]
    fn doctor_decision_drives_expected_next_job() {
        assert_eq!(DoctorDecision::Accept.next_job_type(), "post_room3_request");
        assert_eq!(DoctorDecision::Deny.next_job_type(), "post_room1_final_denial_triage");
    }

    #[test]
    fn deny_with_support_flag_is_rejected() {
        assert!(validate_decision_support(DoctorDecision::Deny, SupportFlag::Anesthesist).is_err());
        assert!(validate_decision_support(DoctorDecision::Deny, SupportFlag::None).is_ok());
    }

    #[test]
    fn accept_allows_any_support_flag() {
        assert!(validate_decision_support(DoctorDecision::Accept, SupportFlag::AnesthesistIcu).is_ok());
        assert!(validate_decision_support(DoctorDecision::Accept, SupportFlag::None).is_ok());
    }

    #[test]
    fn appointment_status_maps_to_expected_case_status() {
        assert_eq!(AppointmentStatus::Confirmed.next_status(), CaseStatus::ApptConfirmed);
        assert_eq!(AppointmentStatus::Denied.next_status(), CaseStatus::ApptDenied);
    }

    #[test]
    fn normalize_reason_defaults_blank_input() {
        assert_eq!(normalize_reason(None), crate::constants::REASON_NOT_INFORMED);
        assert_eq!(normalize_reason(Some("   ")), crate::constants::REASON_NOT_INFORMED);
        assert_eq!(normalize_reason(Some(" febre alta ")), "febre alta");
    }
}
