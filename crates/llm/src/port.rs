//! The LLM port: the only abstraction boundary the orchestration glue sees.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{Llm1Input, Llm1Output, Llm2Input, Llm2RawOutput};

/// Prompt text rendered by the caller (prompt rendering is deliberately a
/// port concern, not this crate's) paired with the structured input.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn call_llm1(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        input: &Llm1Input,
    ) -> Result<Llm1Output, LlmError>;

    async fn call_llm2(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        input: &Llm2Input,
    ) -> Result<Llm2RawOutput, LlmError>;
}
