//! Deterministic `LlmPort`: a rule-based stand-in for the vendor API, used
//! when `LLM_RUNTIME_MODE=deterministic` (no vendor key configured, or test
//! environments that must not make network calls).
//!
//! Facts are extracted from the report text via plain marker lines rather
//! than a real clinical parser — this adapter exists to make the engine
//! runnable end to end, not to approximate real clinical judgment.

use async_trait::async_trait;

use triage_core::{DoctorDecision, SupportFlag};

use crate::error::LlmError;
use crate::port::LlmPort;
use crate::types::{Llm1Input, Llm1Output, Llm2Input, Llm2RawOutput, PrecheckFacts};

#[derive(Debug, Clone, Default)]
pub struct DeterministicLlmClient;

impl DeterministicLlmClient {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn extract_facts(text: &str) -> PrecheckFacts {
        let upper = text.to_uppercase();
        PrecheckFacts {
            labs_pass: !upper.contains("LABS: FAIL") && !upper.contains("LABS:FAIL"),
            ecg_present: upper.contains("ECG: PRESENT") || upper.contains("ECG:PRESENT"),
            ecg_required: upper.contains("ECG: REQUIRED") || upper.contains("ECG:REQUIRED"),
            excluded_from_eda_flow: upper.contains("EXCLUDED_FROM_EDA_FLOW") || upper.contains("EXCLUDED"),
            pediatric_flag: upper.contains("PEDIATRIC"),
        }
    }
}

#[async_trait]
impl LlmPort for DeterministicLlmClient {
    async fn call_llm1(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        input: &Llm1Input,
    ) -> Result<Llm1Output, LlmError> {
        let precheck_facts = Self::extract_facts(&input.extracted_text);
        let summary_text = input
            .extracted_text
            .lines()
            .next()
            .unwrap_or("(empty report)")
            .chars()
            .take(200)
            .collect::<String>();
        Ok(Llm1Output {
            structured_data: serde_json::json!({ "source": "deterministic", "precheck_facts": precheck_facts }),
            summary_text,
            precheck_facts,
        })
    }

    async fn call_llm2(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        input: &Llm2Input,
    ) -> Result<Llm2RawOutput, LlmError> {
        let facts = input.precheck_facts;
        let ecg_ok = !facts.ecg_required || facts.ecg_present;
        let suggestion = if facts.labs_pass && ecg_ok && !facts.excluded_from_eda_flow {
            DoctorDecision::Accept
        } else {
            DoctorDecision::Deny
        };
        let support_recommendation =
            if facts.pediatric_flag { SupportFlag::AnesthesistIcu } else { SupportFlag::None };

        Ok(Llm2RawOutput {
            case_id: input.case_id,
            agency_record_number: input.agency_record_number.clone(),
            suggestion,
            policy_alignment: "deterministic".to_owned(),
            support_recommendation,
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn clean_report_suggests_accept() {
        let client = DeterministicLlmClient::new();
        let input = Llm1Input { case_id: Uuid::nil(), extracted_text: "Labs: OK\nECG: present".to_owned() };
        let out = client.call_llm1("", "", &input).await.unwrap();
        assert!(out.precheck_facts.labs_pass);

        let llm2_input = Llm2Input {
            case_id: Uuid::nil(),
            agency_record_number: "AR-1".to_owned(),
            structured_data: out.structured_data,
            summary_text: out.summary_text,
            precheck_facts: out.precheck_facts,
        };
        let suggestion = client.call_llm2("", "", &llm2_input).await.unwrap();
        assert_eq!(suggestion.suggestion, DoctorDecision::Accept);
    }

    #[tokio::test]
    async fn failed_labs_suggests_deny() {
        let client = DeterministicLlmClient::new();
        let facts = DeterministicLlmClient::extract_facts("LABS: FAIL\nsome other line");
        assert!(!facts.labs_pass);

        let llm2_input = Llm2Input {
            case_id: Uuid::nil(),
            agency_record_number: "AR-1".to_owned(),
            structured_data: serde_json::json!({}),
            summary_text: String::new(),
            precheck_facts: facts,
        };
        let suggestion = client.call_llm2("", "", &llm2_input).await.unwrap();
        assert_eq!(suggestion.suggestion, DoctorDecision::Deny);
    }
}
