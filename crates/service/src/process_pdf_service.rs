//! The `process_pdf_case` handler: download, extract, run LLM1/LLM2, and
//! hand off to the Room-2 widget poster.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use triage_core::prompt::names as prompt_names;
use triage_core::{default_max_attempts, CaseStatus, NewCaseEvent};
use triage_llm::types::{Llm1Input, Llm2Input};
use triage_llm::{reconciliation, LlmPort};
use triage_storage::job_repository::NewJob;
use triage_storage::transcript_repository::PromptPairRef;
use triage_storage::PgStorage;

use crate::error::ServiceError;
use crate::job_types;
use crate::ports::{MxcDownloader, PdfExtractor};
use crate::record_number::extract_and_strip_agency_record_number;

pub struct ProcessPdfService {
    storage: Arc<PgStorage>,
    mxc: Arc<dyn MxcDownloader>,
    pdf_extractor: Arc<dyn PdfExtractor>,
    llm: Arc<dyn LlmPort>,
    llm2_enabled: bool,
    model_name: String,
}

impl ProcessPdfService {
    #[must_use]
    pub fn new(
        storage: Arc<PgStorage>,
        mxc: Arc<dyn MxcDownloader>,
        pdf_extractor: Arc<dyn PdfExtractor>,
        llm: Arc<dyn LlmPort>,
        llm2_enabled: bool,
        model_name: String,
    ) -> Self {
        Self { storage, mxc, pdf_extractor, llm, llm2_enabled, model_name }
    }

    /// Run the full extraction + LLM pipeline for a claimed job. Any
    /// failure is returned as a `ServiceError::Port("{cause}: {details}")`
    /// so the worker's generic retry/dead-letter path applies uniformly.
    pub async fn process(&self, case_id: Uuid, pdf_mxc_url: &str) -> Result<(), ServiceError> {
        if !self
            .storage
            .transition_status(case_id, CaseStatus::R1AckProcessing, CaseStatus::Extracting)
            .await?
        {
            // Job redelivered after the case already moved past this stage
            // (a prior attempt completed the transition but the job claim
            // didn't commit). Treat as already-handled, not a failure.
            return Ok(());
        }

        let pdf_bytes = self
            .mxc
            .download(pdf_mxc_url)
            .await
            .map_err(|e| ServiceError::retriable("download", e))?;

        let raw_text = self
            .pdf_extractor
            .extract_text(&pdf_bytes)
            .await
            .map_err(|e| ServiceError::retriable("extract", e))?;
        if raw_text.trim().is_empty() {
            return Err(ServiceError::retriable("extract", "PDF extraction produced empty text"));
        }

        let record_result = extract_and_strip_agency_record_number(&raw_text);
        tracing::info!(
            case_id = %case_id,
            agency_record_number = record_result.agency_record_number.as_deref().unwrap_or(""),
            "process_pdf_case_record_extract_ok"
        );

        self.storage
            .record_report_transcript(case_id, &record_result.cleaned_text)
            .await?;
        self.storage
            .save_extraction(
                case_id,
                record_result.agency_record_number.as_deref(),
                &record_result.cleaned_text,
                None,
            )
            .await?;

        self.require_transition(case_id, CaseStatus::Extracting, CaseStatus::LlmStruct).await?;

        let llm1_prompts = self.load_prompt_pair(prompt_names::LLM1_SYSTEM, prompt_names::LLM1_USER).await?;
        let llm1_input =
            Llm1Input { case_id, extracted_text: record_result.cleaned_text.clone() };
        let llm1_output = self
            .llm
            .call_llm1(&llm1_prompts.system_content, &llm1_prompts.user_content, &llm1_input)
            .await
            .map_err(|e| ServiceError::retriable("llm1", e))?;

        self.storage
            .save_llm1_output(case_id, &llm1_output.structured_data, &llm1_output.summary_text)
            .await?;
        self.storage
            .record_llm_interaction(
                case_id,
                "llm1",
                &serde_json::json!({ "extracted_text": llm1_input.extracted_text }),
                &serde_json::json!({
                    "structured_data": llm1_output.structured_data,
                    "summary_text": llm1_output.summary_text,
                }),
                &llm1_prompts.as_ref(),
                &self.model_name,
            )
            .await?;
        self.storage
            .append_case_event(&NewCaseEvent::system(case_id, "LLM1_STRUCTURED_SUMMARY_OK"))
            .await?;

        if !self.llm2_enabled {
            self.enqueue_post_room2_widget(case_id).await?;
            return Ok(());
        }

        self.require_transition(case_id, CaseStatus::LlmStruct, CaseStatus::LlmSuggest).await?;

        let agency_record_number = record_result
            .agency_record_number
            .clone()
            .ok_or_else(|| ServiceError::retriable("llm2", "agency_record_number missing after extraction"))?;

        let llm2_prompts = self.load_prompt_pair(prompt_names::LLM2_SYSTEM, prompt_names::LLM2_USER).await?;
        let llm2_input = Llm2Input {
            case_id,
            agency_record_number: agency_record_number.clone(),
            structured_data: llm1_output.structured_data.clone(),
            summary_text: llm1_output.summary_text.clone(),
            precheck_facts: llm1_output.precheck_facts,
        };
        let llm2_raw = self
            .llm
            .call_llm2(&llm2_prompts.system_content, &llm2_prompts.user_content, &llm2_input)
            .await
            .map_err(|e| ServiceError::retriable("llm2", e))?;

        if llm2_raw.case_id != case_id {
            return Err(ServiceError::retriable("llm2", "LLM2 case_id mismatch"));
        }
        if llm2_raw.agency_record_number != agency_record_number {
            return Err(ServiceError::retriable("llm2", "LLM2 agency_record_number mismatch"));
        }

        let reconciled = reconciliation::reconcile(&llm1_output.precheck_facts, &llm2_raw);
        let suggested_action_json = serde_json::json!({
            "suggestion": reconciled.suggestion,
            "labs_ok": reconciled.labs_ok,
            "ecg_ok": reconciled.ecg_ok,
            "excluded_request": reconciled.excluded_request,
            "policy_alignment": reconciled.policy_alignment,
            "support_recommendation": reconciled.support_recommendation,
            "contradictions": reconciled.contradictions,
        });

        self.storage.save_llm2_output(case_id, &suggested_action_json).await?;
        self.storage
            .record_llm_interaction(
                case_id,
                "llm2",
                &serde_json::json!({
                    "agency_record_number": agency_record_number,
                    "structured_data": llm1_output.structured_data,
                }),
                &suggested_action_json,
                &llm2_prompts.as_ref(),
                &self.model_name,
            )
            .await?;
        self.storage.append_case_event(&NewCaseEvent::system(case_id, "LLM2_SUGGESTION_OK")).await?;

        if !reconciled.contradictions.is_empty() {
            self.storage
                .append_case_event(
                    &NewCaseEvent::system(case_id, "LLM_CONTRADICTION_DETECTED").with_payload(
                        serde_json::json!({ "contradictions": reconciled.contradictions }),
                    ),
                )
                .await?;
        }

        self.enqueue_post_room2_widget(case_id).await?;

        Ok(())
    }

    /// Hands the case off to the Room-2 widget poster once LLM1 (and, if
    /// enabled, LLM2) have finished. The case is left in `LLM_SUGGEST` by
    /// the last `require_transition` above; `post_room2_widget` is the
    /// handler that moves it on to `WAIT_DOCTOR`.
    async fn enqueue_post_room2_widget(&self, case_id: Uuid) -> Result<(), ServiceError> {
        self.storage
            .enqueue_job(&NewJob {
                case_id: Some(case_id),
                job_type: job_types::POST_ROOM2_WIDGET.to_owned(),
                payload_json: serde_json::json!({}),
                run_at: Utc::now(),
                max_attempts: default_max_attempts(),
            })
            .await?;
        self.storage
            .append_case_event(
                &NewCaseEvent::system(case_id, "JOB_ENQUEUED_NEXT_STEP")
                    .with_payload(serde_json::json!({ "job_type": job_types::POST_ROOM2_WIDGET })),
            )
            .await?;
        Ok(())
    }

    /// A CAS transition that's expected to succeed within this single
    /// handler invocation; a `false` here means another worker raced us
    /// onto the same job, which we surface as retriable rather than
    /// silently pressing on with a stale case status.
    async fn require_transition(
        &self,
        case_id: Uuid,
        from: CaseStatus,
        to: CaseStatus,
    ) -> Result<(), ServiceError> {
        if self.storage.transition_status(case_id, from, to).await? {
            Ok(())
        } else {
            Err(ServiceError::retriable(
                "transition",
                format!("case {case_id} not in expected status {from:?} for transition to {to:?}"),
            ))
        }
    }

    async fn load_prompt_pair(
        &self,
        system_name: &str,
        user_name: &str,
    ) -> Result<LoadedPromptPair, ServiceError> {
        let system = self
            .storage
            .get_active_prompt(system_name)
            .await?
            .ok_or_else(|| ServiceError::NotConfigured(format!("no active prompt template: {system_name}")))?;
        let user = self
            .storage
            .get_active_prompt(user_name)
            .await?
            .ok_or_else(|| ServiceError::NotConfigured(format!("no active prompt template: {user_name}")))?;
        Ok(LoadedPromptPair {
            system_content: system.content,
            system_ref: triage_core::prompt::PromptVersionRef { name: system.name, version: system.version },
            user_content: user.content,
            user_ref: triage_core::prompt::PromptVersionRef { name: user.name, version: user.version },
        })
    }
}

struct LoadedPromptPair {
    system_content: String,
    system_ref: triage_core::prompt::PromptVersionRef,
    user_content: String,
    user_ref: triage_core::prompt::PromptVersionRef,
}

impl LoadedPromptPair {
    fn as_ref(&self) -> PromptPairRef {
        PromptPairRef {
            system: triage_core::prompt::PromptVersionRef {
                name: self.system_ref.name.clone(),
                version: self.system_ref.version,
            },
            user: triage_core::prompt::PromptVersionRef {
                name: self.user_ref.name.clone(),
                version: self.user_ref.version,
            },
        }
    }
}
