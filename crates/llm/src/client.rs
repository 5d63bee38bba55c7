//! Provider-backed `LlmPort`: an OpenAI-compatible chat completions client
//! with bounded retry on transient failures.

use std::time::Duration;

use async_trait::async_trait;

use crate::ai_types::{ChatRequest, ChatResponse, Llm1ResponseJson, Llm2ResponseJson, Message, ResponseFormat};
use crate::error::LlmError;
use crate::port::LlmPort;
use crate::types::{Llm1Input, Llm1Output, Llm2Input, Llm2RawOutput};

/// Maximum number of attempts (including the first) for one chat completion
/// call before giving up with `LlmError::RetriesExhausted`.
const MAX_ATTEMPTS: u32 = 4;

/// Client for the vendor chat completions API.
#[derive(Debug, Clone)]
pub struct ProviderLlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model_llm1: String,
    model_llm2: String,
}

impl ProviderLlmClient {
    #[must_use]
    pub fn new(api_key: String, base_url: String, model_llm1: String, model_llm2: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            base_url,
            model_llm1,
            model_llm2,
        }
    }

    async fn chat_completion(&self, model: &str, system: &str, user: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: model.to_owned(),
            messages: vec![
                Message { role: "system".to_owned(), content: system.to_owned() },
                Message { role: "user".to_owned(), content: user.to_owned() },
            ],
            response_format: ResponseFormat { format_type: "json_object".to_owned() },
        };

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_chat_completion(&request).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay_ms = 100u64.saturating_mul(1u64 << (attempt - 1));
                    tracing::warn!(attempt, error = %e, "transient LLM call failure, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    last_error = Some(e);
                },
                Err(e) => return Err(e),
            }
        }
        Err(LlmError::RetriesExhausted(Box::new(
            last_error.unwrap_or(LlmError::EmptyResponse),
        )))
    }

    async fn try_chat_completion(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::HttpStatus { code: status.as_u16(), body });
        }

        let body_text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body_text)
            .map_err(|e| LlmError::JsonParse { context: "chat completion envelope".to_owned(), source: e })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?
            .message
            .content;
        Ok(content)
    }
}

#[async_trait]
impl LlmPort for ProviderLlmClient {
    async fn call_llm1(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        input: &Llm1Input,
    ) -> Result<Llm1Output, LlmError> {
        let user = format!("{user_prompt}\n\n---\nReport text:\n{}", input.extracted_text);
        let content = self.chat_completion(&self.model_llm1, system_prompt, &user).await?;
        let parsed: Llm1ResponseJson = serde_json::from_str(&content)
            .map_err(|e| LlmError::JsonParse { context: "LLM1 response".to_owned(), source: e })?;
        Ok(Llm1Output {
            structured_data: parsed.structured_data,
            summary_text: parsed.summary_text,
            precheck_facts: parsed.precheck_facts,
        })
    }

    async fn call_llm2(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        input: &Llm2Input,
    ) -> Result<Llm2RawOutput, LlmError> {
        let user = format!(
            "{user_prompt}\n\n---\ncase_id: {}\nagency_record_number: {}\nsummary: {}\nstructured_data: {}\nprecheck_facts: {}",
            input.case_id,
            input.agency_record_number,
            input.summary_text,
            input.structured_data,
            serde_json::to_string(&input.precheck_facts)
                .map_err(|e| LlmError::JsonParse { context: "precheck facts".to_owned(), source: e })?,
        );
        let content = self.chat_completion(&self.model_llm2, system_prompt, &user).await?;
        let parsed: Llm2ResponseJson = serde_json::from_str(&content)
            .map_err(|e| LlmError::JsonParse { context: "LLM2 response".to_owned(), source: e })?;
        Ok(Llm2RawOutput {
            case_id: parsed.case_id,
            agency_record_number: parsed.agency_record_number,
            suggestion: parsed.suggestion,
            policy_alignment: parsed.policy_alignment,
            support_recommendation: parsed.support_recommendation,
        })
    }
}
