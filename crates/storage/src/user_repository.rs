//! Users, bearer tokens, and the append-only auth event log.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::{AccountStatus, AuthEvent, AuthToken, Role, User};

use crate::error::StorageError;
use crate::PgStorage;

#[derive(FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    account_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, StorageError> {
        Ok(Self {
            user_id: row.user_id,
            email: row.email,
            password_hash: row.password_hash,
            role: Role::from_str(&row.role)
                .map_err(|e| StorageError::DataCorruption { context: "user role".to_owned(), source: Box::new(e) })?,
            account_status: AccountStatus::from_str(&row.account_status).map_err(|e| {
                StorageError::DataCorruption { context: "account_status".to_owned(), source: Box::new(e) }
            })?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = "user_id, email, password_hash, role, account_status, created_at, updated_at";

#[derive(FromRow)]
struct AuthTokenRow {
    token_id: Uuid,
    user_id: Uuid,
    token_hash: String,
    expires_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<AuthTokenRow> for AuthToken {
    fn from(row: AuthTokenRow) -> Self {
        Self {
            token_id: row.token_id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct AuthEventRow {
    event_id: i64,
    user_id: Option<Uuid>,
    event_type: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    payload_json: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<AuthEventRow> for AuthEvent {
    fn from(row: AuthEventRow) -> Self {
        Self {
            event_id: row.event_id,
            user_id: row.user_id,
            event_type: row.event_type,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            payload_json: row.payload_json,
            created_at: row.created_at,
        }
    }
}

impl PgStorage {
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (user_id, email, password_hash, role, account_status) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(role.as_db_str())
        .bind(AccountStatus::Active.as_db_str())
        .fetch_one(self.pool())
        .await?;
        User::try_from(row)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"))
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(User::try_from).transpose()
    }

    /// Whether any user account exists yet, used to gate the one-time
    /// bootstrap admin-creation path: a bootstrap admin is only ever
    /// created when the `users` table is still empty.
    pub async fn any_user_exists(&self) -> Result<bool, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM users").fetch_one(self.pool()).await?;
        Ok(count > 0)
    }

    pub async fn set_account_status(
        &self,
        user_id: Uuid,
        status: AccountStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE users SET account_status = $1, updated_at = now() WHERE user_id = $2")
            .bind(status.as_db_str())
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_auth_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<AuthToken, StorageError> {
        let row = sqlx::query_as::<_, AuthTokenRow>(
            "INSERT INTO auth_tokens (token_id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING token_id, user_id, token_hash, expires_at, revoked_at, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into())
    }

    pub async fn find_auth_token_by_hash(&self, token_hash: &str) -> Result<Option<AuthToken>, StorageError> {
        let row = sqlx::query_as::<_, AuthTokenRow>(
            "SELECT token_id, user_id, token_hash, expires_at, revoked_at, created_at \
             FROM auth_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn revoke_auth_token(&self, token_id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE auth_tokens SET revoked_at = now() WHERE token_id = $1 AND revoked_at IS NULL",
        )
        .bind(token_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Append an auth audit row. `user_id` may be `None` for a failed
    /// login against an unknown email.
    pub async fn append_auth_event(
        &self,
        user_id: Option<Uuid>,
        event_type: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        payload_json: &serde_json::Value,
    ) -> Result<AuthEvent, StorageError> {
        let row = sqlx::query_as::<_, AuthEventRow>(
            "INSERT INTO auth_events (user_id, event_type, ip_address, user_agent, payload_json) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING event_id, user_id, event_type, ip_address, user_agent, payload_json, created_at",
        )
        .bind(user_id)
        .bind(event_type)
        .bind(ip_address)
        .bind(user_agent)
        .bind(payload_json)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into())
    }
}
