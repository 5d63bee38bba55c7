//! Versioned prompt templates with exactly one active version per name.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use triage_core::PromptTemplate;

use crate::error::StorageError;
use crate::PgStorage;

#[derive(FromRow)]
struct PromptTemplateRow {
    prompt_id: Uuid,
    name: String,
    version: i32,
    content: String,
    is_active: bool,
    updated_by_user_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PromptTemplateRow> for PromptTemplate {
    fn from(row: PromptTemplateRow) -> Self {
        Self {
            prompt_id: row.prompt_id,
            name: row.name,
            version: row.version,
            content: row.content,
            is_active: row.is_active,
            updated_by_user_id: row.updated_by_user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PROMPT_COLUMNS: &str =
    "prompt_id, name, version, content, is_active, updated_by_user_id, created_at, updated_at";

impl PgStorage {
    /// Insert a new version of a named template, left inactive. Fails with
    /// `StorageError::Duplicate` if `(name, version)` already exists.
    pub async fn insert_prompt_version(
        &self,
        name: &str,
        version: i32,
        content: &str,
        updated_by_user_id: Uuid,
    ) -> Result<PromptTemplate, StorageError> {
        let row = sqlx::query_as::<_, PromptTemplateRow>(&format!(
            "INSERT INTO prompt_templates (prompt_id, name, version, content, is_active, updated_by_user_id) \
             VALUES ($1, $2, $3, $4, false, $5) \
             RETURNING {PROMPT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(version)
        .bind(content)
        .bind(updated_by_user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into())
    }

    /// Activate one version of a template, deactivating whichever version
    /// was previously active for that name. Two statements inside one
    /// transaction, protected at the database layer by the partial unique
    /// index on `(name) WHERE is_active`: if a concurrent activation races
    /// this one, one of the two transactions aborts on the index rather
    /// than leaving two active rows.
    pub async fn activate_prompt_version(
        &self,
        name: &str,
        version: i32,
        updated_by_user_id: Uuid,
    ) -> Result<PromptTemplate, StorageError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("UPDATE prompt_templates SET is_active = false, updated_at = now() WHERE name = $1 AND is_active")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, PromptTemplateRow>(&format!(
            "UPDATE prompt_templates SET is_active = true, updated_by_user_id = $1, updated_at = now() \
             WHERE name = $2 AND version = $3 \
             RETURNING {PROMPT_COLUMNS}"
        ))
        .bind(updated_by_user_id)
        .bind(name)
        .bind(version)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    pub async fn get_active_prompt(&self, name: &str) -> Result<Option<PromptTemplate>, StorageError> {
        let row = sqlx::query_as::<_, PromptTemplateRow>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompt_templates WHERE name = $1 AND is_active"
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_prompt_versions(&self, name: &str) -> Result<Vec<PromptTemplate>, StorageError> {
        let rows = sqlx::query_as::<_, PromptTemplateRow>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompt_templates WHERE name = $1 ORDER BY version DESC"
        ))
        .bind(name)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
