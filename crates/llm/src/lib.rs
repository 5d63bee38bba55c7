//! LLM orchestration glue: the `LlmPort` boundary, two adapters (a
//! provider-backed vendor client and a deterministic stand-in), and the
//! deterministic policy reconciliation that turns LLM2's raw suggestion
//! into the payload actually persisted and posted downstream.

pub mod ai_types;
pub mod client;
pub mod deterministic;
pub mod error;
pub mod port;
pub mod reconciliation;
pub mod types;

pub use client::ProviderLlmClient;
pub use deterministic::DeterministicLlmClient;
pub use error::LlmError;
pub use port::LlmPort;
