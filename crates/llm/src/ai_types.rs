//! Wire shapes for the OpenAI-compatible chat completions endpoint.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub response_format: ResponseFormat,
}

#[derive(Serialize, Clone)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Serialize, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Deserialize)]
pub struct ResponseMessage {
    pub content: String,
}

/// The JSON object LLM1 returns, parsed from the chat completion content.
#[derive(Deserialize)]
pub struct Llm1ResponseJson {
    pub structured_data: serde_json::Value,
    pub summary_text: String,
    pub precheck_facts: crate::types::PrecheckFacts,
}

/// The JSON object LLM2 returns, before reconciliation.
#[derive(Deserialize)]
pub struct Llm2ResponseJson {
    pub case_id: uuid::Uuid,
    pub agency_record_number: String,
    pub suggestion: triage_core::DoctorDecision,
    pub policy_alignment: String,
    pub support_recommendation: triage_core::SupportFlag,
}
