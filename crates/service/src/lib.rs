//! Service layer: the orchestration glue between the ingress poller/HTTP
//! handlers and the storage/llm crates. One module per handler, each a thin
//! struct holding `Arc`-injected dependencies with async methods returning
//! `Result<_, ServiceError>`.

#![allow(clippy::missing_errors_doc, reason = "Errors are self-explanatory from Result types")]
#![allow(missing_debug_implementations, reason = "Internal types")]

pub mod cleanup_service;
pub mod config;
pub mod doctor_decision_service;
pub mod error;
pub mod ingress_poller;
pub mod intake_service;
pub mod job_failure_service;
pub mod job_types;
pub mod matrix_transport;
pub mod pdf_extractor;
pub mod ports;
pub mod post_room2_widget_service;
pub mod prior_case_lookup;
pub mod process_pdf_service;
pub mod reaction_service;
pub mod record_number;
pub mod recovery_service;
pub mod room1_final_reply_service;
pub mod room3_reply_service;
pub mod room3_request_service;
pub mod templates;
pub mod worker_runtime;

pub use cleanup_service::CleanupService;
pub use config::{BootstrapAdmin, ConfigError, EngineConfig, LlmRuntimeMode, RoomIds};
pub use doctor_decision_service::{DoctorDecisionPayload, DoctorDecisionService};
pub use error::ServiceError;
pub use ingress_poller::IngressPoller;
pub use intake_service::IntakeService;
pub use job_failure_service::JobFailureService;
pub use post_room2_widget_service::PostRoom2WidgetService;
pub use process_pdf_service::ProcessPdfService;
pub use reaction_service::ReactionService;
pub use recovery_service::RecoveryService;
pub use room1_final_reply_service::Room1FinalReplyService;
pub use room3_reply_service::Room3ReplyService;
pub use room3_request_service::Room3RequestService;
pub use worker_runtime::{JobHandlers, WorkerRuntime};
