//! Typed error enum for the core crate.

use thiserror::Error;

/// Errors originating from core domain type parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Failed to parse a case status string.
    #[error("invalid case status: {0}")]
    InvalidCaseStatus(String),
    /// Failed to parse a job status string.
    #[error("invalid job status: {0}")]
    InvalidJobStatus(String),
    /// Failed to parse a message kind string.
    #[error("invalid message kind: {0}")]
    InvalidMessageKind(String),
    /// Failed to parse a doctor decision string.
    #[error("invalid doctor decision: {0}")]
    InvalidDoctorDecision(String),
    /// Failed to parse a support-flag string.
    #[error("invalid support flag: {0}")]
    InvalidSupportFlag(String),
    /// Failed to parse an appointment status string.
    #[error("invalid appointment status: {0}")]
    InvalidAppointmentStatus(String),
    /// Failed to parse a reaction-checkpoint stage string.
    #[error("invalid reaction checkpoint stage: {0}")]
    InvalidCheckpointStage(String),
    /// Failed to parse a reaction-checkpoint outcome string.
    #[error("invalid reaction checkpoint outcome: {0}")]
    InvalidCheckpointOutcome(String),
    /// Failed to parse a user role string.
    #[error("invalid user role: {0}")]
    InvalidRole(String),
    /// Failed to parse an account-status string.
    #[error("invalid account status: {0}")]
    InvalidAccountStatus(String),
    /// Doctor decision violated the deny-implies-no-support invariant.
    #[error("decision=deny requires support_flag=none, got {0}")]
    DenyWithSupport(String),
    /// Failed to parse a case-event actor-type string.
    #[error("invalid actor type: {0}")]
    InvalidActorType(String),
}
