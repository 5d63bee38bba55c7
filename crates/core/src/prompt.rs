//! Prompt templates: versioned, with exactly one active version per name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One version of a named prompt template.
///
/// `(name, version)` is unique; a partial-unique index on `name WHERE
/// is_active` enforces exactly one active version per name at the
/// database layer, not just in application code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub prompt_id: Uuid,
    pub name: String,
    pub version: i32,
    pub content: String,
    pub is_active: bool,
    pub updated_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Canonical prompt names the LLM orchestration glue looks up by.
pub mod names {
    pub const LLM1_SYSTEM: &str = "llm1_system";
    pub const LLM1_USER: &str = "llm1_user";
    pub const LLM2_SYSTEM: &str = "llm2_system";
    pub const LLM2_USER: &str = "llm2_user";

    pub const ALL: &[&str] = &[LLM1_SYSTEM, LLM1_USER, LLM2_SYSTEM, LLM2_USER];
}

/// A prompt template's identity as captured into an audit/transcript row
/// at the moment it was used, so later edits to the active version never
/// retroactively change what a historical LLM call is attributed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersionRef {
    pub name: String,
    pub version: i32,
}
