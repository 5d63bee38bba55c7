//! Shared wiring: every binary entrypoint (`serve`, `poller`, `worker`)
//! builds the same set of repositories/ports/services from one
//! `EngineConfig`; this module is the single place that assembly happens
//! so the three commands can't drift out of sync with each other.

use std::sync::Arc;

use anyhow::{Context, Result};

use triage_llm::{DeterministicLlmClient, LlmPort, ProviderLlmClient};
use triage_service::config::{EngineConfig, LlmRuntimeMode};
use triage_service::matrix_transport::MatrixChatTransport;
use triage_service::pdf_extractor::PdfExtractPdfExtractor;
use triage_service::ports::{
    ChatTransport, PasswordHasher, Sha256PasswordHasher, Sha256TokenService, TokenService,
    TransportMembershipAuthorizer,
};
use triage_service::{
    CleanupService, DoctorDecisionService, IngressPoller, IntakeService, JobFailureService,
    JobHandlers, PostRoom2WidgetService, ProcessPdfService, ReactionService, RecoveryService,
    Room1FinalReplyService, Room3ReplyService, Room3RequestService, WorkerRuntime,
};
use triage_storage::PgStorage;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Every piece a binary entrypoint might need, already wired against one
/// `PgStorage` pool and one chat transport.
pub struct Runtime {
    pub storage: Arc<PgStorage>,
    pub config: EngineConfig,
    pub chat: Arc<MatrixChatTransport>,
    pub token_service: Arc<dyn TokenService>,
    pub intake: Arc<IntakeService>,
    pub doctor_decision: Arc<DoctorDecisionService>,
    pub room3_request: Arc<Room3RequestService>,
    pub room3_reply: Arc<Room3ReplyService>,
    pub reaction: Arc<ReactionService>,
    pub process_pdf: Arc<ProcessPdfService>,
    pub post_room2_widget: Arc<PostRoom2WidgetService>,
    pub room1_final_reply: Arc<Room1FinalReplyService>,
    pub cleanup: Arc<CleanupService>,
    pub job_failure: Arc<JobFailureService>,
    pub recovery: Arc<RecoveryService>,
}

impl Runtime {
    /// Connect, migrate, bootstrap the admin account if configured, and
    /// wire every service. Safe to call from more than one process at
    /// once: migrations are idempotent and the bootstrap-admin insert
    /// tolerates a concurrent duplicate email.
    pub async fn bootstrap(config: EngineConfig) -> Result<Self> {
        let storage = Arc::new(PgStorage::connect(&config.database_url).await.context("connecting to database")?);
        storage.migrate().await.context("running migrations")?;
        bootstrap_admin(&storage, &config).await?;

        let chat = Arc::new(MatrixChatTransport::new(
            config.matrix_homeserver_url.clone(),
            config.matrix_access_token.clone(),
            config.matrix_bot_user_id.clone(),
        ));
        let membership = Arc::new(TransportMembershipAuthorizer::new(chat.clone()));
        let token_service: Arc<dyn TokenService> = Arc::new(Sha256TokenService::new());

        let llm: Arc<dyn LlmPort> = match config.llm_runtime_mode {
            LlmRuntimeMode::Deterministic => Arc::new(DeterministicLlmClient::new()),
            LlmRuntimeMode::Provider => Arc::new(ProviderLlmClient::new(
                config.openai_api_key.clone().unwrap_or_default(),
                OPENAI_BASE_URL.to_owned(),
                config.openai_model_llm1.clone(),
                config.openai_model_llm2.clone(),
            )),
        };
        let model_name = match config.llm_runtime_mode {
            LlmRuntimeMode::Deterministic => "deterministic".to_owned(),
            LlmRuntimeMode::Provider => config.openai_model_llm1.clone(),
        };
        let llm2_enabled = true;

        let intake = Arc::new(IntakeService::new(storage.clone(), chat.clone(), config.rooms.clone()));
        let doctor_decision = Arc::new(DoctorDecisionService::new(
            storage.clone(),
            Some(chat.clone() as Arc<dyn ChatTransport>),
            membership,
            config.rooms.clone(),
        ));
        let room3_request = Arc::new(Room3RequestService::new(storage.clone(), chat.clone(), config.rooms.clone()));
        let room3_reply = Arc::new(Room3ReplyService::new(storage.clone(), chat.clone(), config.rooms.clone()));
        let reaction = Arc::new(ReactionService::new(storage.clone()));
        let process_pdf = Arc::new(ProcessPdfService::new(
            storage.clone(),
            chat.clone(),
            Arc::new(PdfExtractPdfExtractor::new()),
            llm,
            llm2_enabled,
            model_name,
        ));
        let post_room2_widget =
            Arc::new(PostRoom2WidgetService::new(storage.clone(), chat.clone(), config.rooms.clone()));
        let room1_final_reply =
            Arc::new(Room1FinalReplyService::new(storage.clone(), chat.clone(), config.rooms.clone()));
        let cleanup = Arc::new(CleanupService::new(storage.clone(), chat.clone()));
        let job_failure = Arc::new(JobFailureService::new(storage.clone()));
        let recovery = Arc::new(RecoveryService::new(storage.clone()));

        Ok(Self {
            storage,
            config,
            chat,
            token_service,
            intake,
            doctor_decision,
            room3_request,
            room3_reply,
            reaction,
            process_pdf,
            post_room2_widget,
            room1_final_reply,
            cleanup,
            job_failure,
            recovery,
        })
    }

    #[must_use]
    pub fn ingress_poller(&self) -> IngressPoller {
        IngressPoller::new(
            self.storage.clone(),
            self.chat.clone(),
            self.config.rooms.clone(),
            self.intake.clone(),
            self.doctor_decision.clone(),
            self.room3_reply.clone(),
            self.reaction.clone(),
            self.config.matrix_sync_timeout_ms,
        )
    }

    #[must_use]
    pub fn worker_runtime(&self, worker_id: String) -> WorkerRuntime {
        let handlers = JobHandlers {
            process_pdf: self.process_pdf.clone(),
            post_room2_widget: self.post_room2_widget.clone(),
            post_room3_request: self.room3_request.clone(),
            room1_final_reply: self.room1_final_reply.clone(),
            execute_cleanup: self.cleanup.clone(),
        };
        WorkerRuntime::new(
            self.storage.clone(),
            handlers,
            self.job_failure.clone(),
            worker_id,
            self.config.worker_claim_limit,
        )
    }
}

/// Create the one-time bootstrap admin if configured and no admin exists
/// yet. Tolerates a concurrent creation from another process racing this
/// one: the `users.email` unique constraint turns the loser's insert into
/// a duplicate error, which is not a startup failure.
async fn bootstrap_admin(storage: &PgStorage, config: &EngineConfig) -> Result<()> {
    let Some(admin) = &config.bootstrap_admin else { return Ok(()) };
    if storage.any_user_exists().await.context("checking for existing users")? {
        return Ok(());
    }

    let hasher = Sha256PasswordHasher::new();
    let password_hash = hasher.hash(&admin.password).map_err(|e| anyhow::anyhow!("hashing bootstrap admin password: {e}"))?;

    match storage.create_user(&admin.email, &password_hash, triage_core::Role::Admin).await {
        Ok(user) => {
            tracing::info!(user_id = %user.user_id, email = %admin.email, "bootstrap admin created");
            Ok(())
        },
        Err(e) if e.is_duplicate() => {
            tracing::info!(email = %admin.email, "bootstrap admin already created by a concurrent process");
            Ok(())
        },
        Err(e) => Err(e).context("creating bootstrap admin"),
    }
}
