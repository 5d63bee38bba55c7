//! Typed error enum for the service layer.
//!
//! Unifies storage and LLM failures into a single error type, enabling
//! callers to match on specific failure modes instead of downcasting opaque
//! `anyhow::Error` boxes.

use triage_llm::LlmError;
use triage_storage::StorageError;

use thiserror::Error;

/// Service-layer error unifying storage and LLM failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage operation failed (DB, not found, duplicate, etc.).
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// LLM API call failed.
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    /// A port call (chat send, PDF download/extract, redaction) failed.
    #[error("port: {0}")]
    Port(String),

    /// Caller provided invalid input (bad invariant, malformed reply body).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Required backend is not configured (e.g. LLM2 disabled, no poster room).
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Serialization/deserialization failed in the service layer.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Build a retriable handler failure in the `"{cause}: {details}"` shape
    /// the dead-letter finalizer later splits back apart for the Room-1
    /// failure final-reply payload.
    pub fn retriable(cause: &str, details: impl std::fmt::Display) -> Self {
        Self::Port(format!("{cause}: {details}"))
    }

    /// Whether this error is likely transient (worth retrying by the worker).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Llm(e) => e.is_transient(),
            Self::Port(_) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_duplicate())
    }
}
