//! Shared constants for the triage case orchestration engine.

/// PostgreSQL connection pool: maximum connections.
pub const PG_POOL_MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL connection pool: acquire timeout in seconds.
pub const PG_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL connection pool: idle timeout in seconds.
pub const PG_POOL_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default number of jobs a single worker claims per poll.
pub const DEFAULT_CLAIM_LIMIT: i64 = 10;

/// Default number of attempts before a job is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Default worker poll interval when no jobs were claimed.
pub const DEFAULT_WORKER_POLL_INTERVAL_SECONDS: u64 = 5;

/// Default chat ingress poll interval between `sync` calls.
pub const DEFAULT_MATRIX_POLL_INTERVAL_SECONDS: u64 = 2;

/// Default long-poll timeout passed to the chat transport's `sync` call.
pub const DEFAULT_MATRIX_SYNC_TIMEOUT_MS: u64 = 30_000;

/// Window, in days, within which a prior denial counts as "recent" for
/// the prior-case lookup shown alongside a new Room-2 widget.
pub const PRIOR_CASE_DENIAL_WINDOW_DAYS: i64 = 7;

/// Default page size for the monitoring case list.
pub const DEFAULT_MONITORING_PAGE_SIZE: i64 = 10;

/// Upper bound on the monitoring page size a caller may request.
pub const MAX_MONITORING_PAGE_SIZE: i64 = 100;

/// Base delay, in seconds, for the exponential job retry back-off.
pub const RETRY_BASE_DELAY_SECONDS: u64 = 5;

/// Upper bound, in seconds, on the computed job retry delay.
pub const RETRY_MAX_DELAY_SECONDS: u64 = 900;

/// Fallback placeholder used when a decision/appointment reason is blank.
pub const REASON_NOT_INFORMED: &str = "não informado";
