//! Wire shapes exchanged with the LLM1 (structuring) and LLM2 (suggestion)
//! stages, independent of which `LlmPort` implementation produces them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use triage_core::{DoctorDecision, SupportFlag};

/// Everything LLM1 needs: the cleaned report text for one case.
#[derive(Debug, Clone)]
pub struct Llm1Input {
    pub case_id: Uuid,
    pub extracted_text: String,
}

/// Precheck facts LLM1 extracts alongside the free-text summary. These
/// drive the deterministic policy reconciliation LLM2's output is passed
/// through (see `reconciliation::reconcile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecheckFacts {
    pub labs_pass: bool,
    pub ecg_present: bool,
    pub ecg_required: bool,
    pub excluded_from_eda_flow: bool,
    pub pediatric_flag: bool,
}

/// LLM1's output: structured clinical data, a human-readable summary, and
/// the precheck facts extracted alongside them.
#[derive(Debug, Clone)]
pub struct Llm1Output {
    pub structured_data: serde_json::Value,
    pub summary_text: String,
    pub precheck_facts: PrecheckFacts,
}

/// Everything LLM2 needs: LLM1's structured output plus the precheck facts.
#[derive(Debug, Clone)]
pub struct Llm2Input {
    pub case_id: Uuid,
    pub agency_record_number: String,
    pub structured_data: serde_json::Value,
    pub summary_text: String,
    pub precheck_facts: PrecheckFacts,
}

/// LLM2's raw suggestion, before deterministic reconciliation. Echoes back
/// `case_id`/`agency_record_number` so callers can cross-check that the
/// response actually corresponds to the request (§4.4: a mismatch is a
/// retriable error, not a silent overwrite).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Llm2RawOutput {
    pub case_id: Uuid,
    pub agency_record_number: String,
    pub suggestion: DoctorDecision,
    pub policy_alignment: String,
    pub support_recommendation: SupportFlag,
}

/// One forced override applied during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub rule: String,
    pub field: String,
    pub previous: serde_json::Value,
    pub reconciled: serde_json::Value,
}

/// The reconciled suggested action persisted to `cases.suggested_action_json`
/// and posted into the Room-2 widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciledSuggestion {
    pub suggestion: DoctorDecision,
    pub labs_ok: bool,
    pub ecg_ok: bool,
    pub excluded_request: bool,
    pub policy_alignment: String,
    pub support_recommendation: SupportFlag,
    pub contradictions: Vec<Contradiction>,
}
