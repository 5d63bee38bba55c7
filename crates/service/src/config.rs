//! Shared, cheaply-cloned configuration handed to every service at
//! construction time. Room identifiers are plain strings (chat-fabric room
//! IDs), not a typed enum, because the engine never branches on anything
//! about a room beyond "is this Room 1/2/3".
//!
//! `EngineConfig::from_env` is the single place the environment contract
//! is read; every binary entrypoint (poller, serve, worker, migrate)
//! builds one `EngineConfig` at startup and hands the relevant slices
//! down into service/port constructors.

use thiserror::Error;

use triage_core::env_config::env_parse_with_default;

/// The three fixed chat rooms the engine coordinates across.
#[derive(Debug, Clone)]
pub struct RoomIds {
    pub room1_id: String,
    pub room2_id: String,
    pub room3_id: String,
}

/// Which `LlmPort` implementation the binary wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRuntimeMode {
    /// Rule-based stand-in; no network calls. Default when no vendor key
    /// is configured.
    Deterministic,
    /// OpenAI-compatible chat completions vendor.
    Provider,
}

impl std::str::FromStr for LlmRuntimeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deterministic" => Ok(Self::Deterministic),
            "provider" => Ok(Self::Provider),
            other => Err(ConfigError::InvalidLlmRuntimeMode(other.to_owned())),
        }
    }
}

/// Configuration error raised while assembling `EngineConfig` from the
/// process environment. Every variant here is a fatal startup error — the
/// binary should log it and exit non-zero, never fall back to a guess.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequiredVar(&'static str),

    #[error("invalid LLM_RUNTIME_MODE: {0} (expected \"deterministic\" or \"provider\")")]
    InvalidLlmRuntimeMode(String),

    #[error("provider LLM runtime mode requires OPENAI_API_KEY")]
    MissingProviderApiKey,

    #[error(
        "bootstrap admin misconfigured: {0} (exactly one of BOOTSTRAP_ADMIN_PASSWORD / \
         BOOTSTRAP_ADMIN_PASSWORD_FILE must be set when BOOTSTRAP_ADMIN_EMAIL is set)"
    )]
    BootstrapAdminMisconfigured(String),

    #[error("failed to read BOOTSTRAP_ADMIN_PASSWORD_FILE at {path}: {source}")]
    BootstrapPasswordFileUnreadable { path: String, source: std::io::Error },
}

/// The full process configuration, assembled once at binary startup from
/// the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub rooms: RoomIds,

    pub matrix_homeserver_url: String,
    pub matrix_bot_user_id: String,
    pub matrix_access_token: String,

    pub webhook_public_url: String,
    pub webhook_hmac_secret: String,

    pub database_url: String,

    pub llm_runtime_mode: LlmRuntimeMode,
    pub openai_api_key: Option<String>,
    pub openai_model_llm1: String,
    pub openai_model_llm2: String,

    pub matrix_sync_timeout_ms: u64,
    pub matrix_poll_interval_seconds: u64,
    pub worker_poll_interval_seconds: u64,
    pub worker_claim_limit: i64,

    /// Resolved bootstrap admin password, already read from either
    /// `BOOTSTRAP_ADMIN_PASSWORD` or the file named by
    /// `BOOTSTRAP_ADMIN_PASSWORD_FILE`. `None` iff `BOOTSTRAP_ADMIN_EMAIL`
    /// was unset (no bootstrap requested).
    pub bootstrap_admin: Option<BootstrapAdmin>,

    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl EngineConfig {
    /// Read and validate the full environment contract. Fails fast on the
    /// first missing required variable or invariant violation — this is a
    /// fatal-at-startup config error, never a warn-and-default (§4.8,
    /// "setting both or neither is a fatal configuration error").
    pub fn from_env() -> Result<Self, ConfigError> {
        let rooms = RoomIds {
            room1_id: required_var("ROOM1_ID")?,
            room2_id: required_var("ROOM2_ID")?,
            room3_id: required_var("ROOM3_ID")?,
        };

        let matrix_homeserver_url = required_var("MATRIX_HOMESERVER_URL")?;
        let matrix_bot_user_id = required_var("MATRIX_BOT_USER_ID")?;
        let matrix_access_token = required_var("MATRIX_ACCESS_TOKEN")?;

        let webhook_public_url = required_var("WEBHOOK_PUBLIC_URL")?;
        let webhook_hmac_secret = required_var("WEBHOOK_HMAC_SECRET")?;

        let database_url = required_var("DATABASE_URL")?;

        let llm_runtime_mode = match std::env::var("LLM_RUNTIME_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => LlmRuntimeMode::Deterministic,
        };
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        if llm_runtime_mode == LlmRuntimeMode::Provider && openai_api_key.is_none() {
            return Err(ConfigError::MissingProviderApiKey);
        }
        let openai_model_llm1 =
            std::env::var("OPENAI_MODEL_LLM1").unwrap_or_else(|_| "gpt-4o-mini".to_owned());
        let openai_model_llm2 =
            std::env::var("OPENAI_MODEL_LLM2").unwrap_or_else(|_| "gpt-4o-mini".to_owned());

        let matrix_sync_timeout_ms = env_parse_with_default(
            "MATRIX_SYNC_TIMEOUT_MS",
            triage_core::DEFAULT_MATRIX_SYNC_TIMEOUT_MS,
        );
        let matrix_poll_interval_seconds = env_parse_with_default(
            "MATRIX_POLL_INTERVAL_SECONDS",
            triage_core::DEFAULT_MATRIX_POLL_INTERVAL_SECONDS,
        );
        let worker_poll_interval_seconds = env_parse_with_default(
            "WORKER_POLL_INTERVAL_SECONDS",
            triage_core::DEFAULT_WORKER_POLL_INTERVAL_SECONDS,
        );
        let worker_claim_limit =
            env_parse_with_default("WORKER_CLAIM_LIMIT", triage_core::DEFAULT_CLAIM_LIMIT);

        let bootstrap_admin = resolve_bootstrap_admin()?;

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        Ok(Self {
            rooms,
            matrix_homeserver_url,
            matrix_bot_user_id,
            matrix_access_token,
            webhook_public_url,
            webhook_hmac_secret,
            database_url,
            llm_runtime_mode,
            openai_api_key,
            openai_model_llm1,
            openai_model_llm2,
            matrix_sync_timeout_ms,
            matrix_poll_interval_seconds,
            worker_poll_interval_seconds,
            worker_claim_limit,
            bootstrap_admin,
            log_level,
        })
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingRequiredVar(name))
}

fn resolve_bootstrap_admin() -> Result<Option<BootstrapAdmin>, ConfigError> {
    let Ok(email) = std::env::var("BOOTSTRAP_ADMIN_EMAIL") else {
        return Ok(None);
    };

    let password_var = std::env::var("BOOTSTRAP_ADMIN_PASSWORD").ok();
    let password_file_var = std::env::var("BOOTSTRAP_ADMIN_PASSWORD_FILE").ok();

    let password = match (password_var, password_file_var) {
        (Some(p), None) => p,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::BootstrapPasswordFileUnreadable { path, source })?
            .trim_end()
            .to_owned(),
        (None, None) => {
            return Err(ConfigError::BootstrapAdminMisconfigured("neither variable is set".to_owned()))
        },
        (Some(_), Some(_)) => {
            return Err(ConfigError::BootstrapAdminMisconfigured("both variables are set".to_owned()))
        },
    };

    Ok(Some(BootstrapAdmin { email, password }))
}
