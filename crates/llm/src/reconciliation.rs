//! Deterministic policy reconciliation. No LLM is consulted here — LLM2's
//! raw suggestion is passed through a fixed set of rules derived from
//! LLM1's precheck facts, and every forced override is recorded as a
//! `Contradiction`.

use triage_core::DoctorDecision;

use crate::types::{Contradiction, Llm2RawOutput, PrecheckFacts, ReconciledSuggestion};

/// Reconcile LLM2's raw suggestion against LLM1's precheck facts.
///
/// Rules, applied in order:
/// 1. `excluded_from_eda_flow` ⇒ force `suggestion = deny`, `excluded_request = true`.
/// 2. `labs_pass = false` ⇒ force `labs_ok = false`.
/// 3. `ecg_required && !ecg_present` ⇒ force `ecg_ok = false`.
/// 4. Any forced `false` on a required precheck ⇒ force `suggestion = deny`
///    (unless rule 1 already forced it).
#[must_use]
pub fn reconcile(facts: &PrecheckFacts, llm2: &Llm2RawOutput) -> ReconciledSuggestion {
    let mut contradictions = Vec::new();
    let mut suggestion = llm2.suggestion;
    let mut labs_ok = facts.labs_pass;
    let mut ecg_ok = !facts.ecg_required || facts.ecg_present;
    let mut excluded_request = false;

    if facts.excluded_from_eda_flow {
        if suggestion != DoctorDecision::Deny {
            contradictions.push(Contradiction {
                rule: "excluded_from_eda_flow".to_owned(),
                field: "suggestion".to_owned(),
                previous: serde_json::json!(suggestion),
                reconciled: serde_json::json!(DoctorDecision::Deny),
            });
        }
        suggestion = DoctorDecision::Deny;
        excluded_request = true;
    }

    if !facts.labs_pass && labs_ok {
        contradictions.push(Contradiction {
            rule: "labs_pass_false".to_owned(),
            field: "labs_ok".to_owned(),
            previous: serde_json::json!(true),
            reconciled: serde_json::json!(false),
        });
        labs_ok = false;
    }

    if facts.ecg_required && !facts.ecg_present && ecg_ok {
        contradictions.push(Contradiction {
            rule: "ecg_required_absent".to_owned(),
            field: "ecg_ok".to_owned(),
            previous: serde_json::json!(true),
            reconciled: serde_json::json!(false),
        });
        ecg_ok = false;
    }

    if (!labs_ok || !ecg_ok) && suggestion != DoctorDecision::Deny {
        contradictions.push(Contradiction {
            rule: "required_precheck_failed".to_owned(),
            field: "suggestion".to_owned(),
            previous: serde_json::json!(suggestion),
            reconciled: serde_json::json!(DoctorDecision::Deny),
        });
        suggestion = DoctorDecision::Deny;
    }

    ReconciledSuggestion {
        suggestion,
        labs_ok,
        ecg_ok,
        excluded_request,
        policy_alignment: llm2.policy_alignment.clone(),
        support_recommendation: llm2.support_recommendation,
        contradictions,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use triage_core::SupportFlag;

    use super::*;

    fn facts(labs_pass: bool, ecg_present: bool, ecg_required: bool, excluded: bool) -> PrecheckFacts {
        PrecheckFacts {
            labs_pass,
            ecg_present,
            ecg_required,
            excluded_from_eda_flow: excluded,
            pediatric_flag: false,
        }
    }

    fn raw(suggestion: DoctorDecision) -> Llm2RawOutput {
        Llm2RawOutput {
            case_id: Uuid::nil(),
            agency_record_number: "AR-1".to_owned(),
            suggestion,
            policy_alignment: "aligned".to_owned(),
            support_recommendation: SupportFlag::None,
        }
    }

    #[test]
    fn clean_precheck_passes_through_llm2_suggestion() {
        let out = reconcile(&facts(true, true, true, false), &raw(DoctorDecision::Accept));
        assert_eq!(out.suggestion, DoctorDecision::Accept);
        assert!(out.labs_ok && out.ecg_ok && !out.excluded_request);
        assert!(out.contradictions.is_empty());
    }

    #[test]
    fn excluded_from_flow_forces_deny_and_records_contradiction() {
        let out = reconcile(&facts(true, true, true, true), &raw(DoctorDecision::Accept));
        assert_eq!(out.suggestion, DoctorDecision::Deny);
        assert!(out.excluded_request);
        assert_eq!(out.contradictions.len(), 1);
        assert_eq!(out.contradictions[0].rule, "excluded_from_eda_flow");
    }

    #[test]
    fn failed_labs_forces_deny() {
        let out = reconcile(&facts(false, true, true, false), &raw(DoctorDecision::Accept));
        assert!(!out.labs_ok);
        assert_eq!(out.suggestion, DoctorDecision::Deny);
        assert_eq!(out.contradictions.len(), 2);
    }

    #[test]
    fn missing_required_ecg_forces_deny() {
        let out = reconcile(&facts(true, false, true, false), &raw(DoctorDecision::Accept));
        assert!(!out.ecg_ok);
        assert_eq!(out.suggestion, DoctorDecision::Deny);
    }

    #[test]
    fn ecg_absent_but_not_required_is_fine() {
        let out = reconcile(&facts(true, false, false, false), &raw(DoctorDecision::Accept));
        assert!(out.ecg_ok);
        assert_eq!(out.suggestion, DoctorDecision::Accept);
    }

    #[test]
    fn llm2_already_deny_with_failed_precheck_adds_no_duplicate_suggestion_override() {
        let out = reconcile(&facts(false, true, true, false), &raw(DoctorDecision::Deny));
        assert_eq!(out.suggestion, DoctorDecision::Deny);
        assert_eq!(out.contradictions.len(), 1);
        assert_eq!(out.contradictions[0].field, "labs_ok");
    }
}
