//! PostgreSQL repository layer for the triage case orchestration engine.
//!
//! Every contended mutation here is a single `UPDATE ... WHERE` statement
//! whose predicate includes the expected source state: callers inspect
//! `rows_affected()` rather than re-reading and retrying. This crate never
//! loops a read-then-write across two statements for anything the state
//! machine depends on.

pub mod case_repository;
pub mod error;
pub mod event_repository;
pub mod job_repository;
pub mod message_repository;
pub mod monitoring_repository;
pub mod pg_migrations;
pub mod prompt_repository;
pub mod reaction_repository;
pub mod transcript_repository;
pub mod user_repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub use error::StorageError;
pub use pg_migrations::run_pg_migrations;

/// Shared PostgreSQL-backed storage handle. Every repository module is an
/// `impl` block on this one struct, split by concern, so all repositories
/// share one connection pool.
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect using `triage_core::constants` pool sizing, matching the
    /// teacher crate's pool configuration approach.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(triage_core::PG_POOL_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(triage_core::PG_POOL_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(Duration::from_secs(triage_core::PG_POOL_IDLE_TIMEOUT_SECS))
            .connect(database_url)
            .await
            .map_err(StorageError::from)?;
        Ok(Self { pool })
    }

    /// Construct directly from an already-built pool (used by tests that
    /// share a pool across repositories).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        run_pg_migrations(&self.pool).await
    }
}
