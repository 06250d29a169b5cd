//! User tag override repository
//!
//! Transient per-user overlay rows written when a request is submitted and
//! removed when it resolves. Writes only happen inside request transactions,
//! so they are exposed as `_tx` helpers; the trait covers the read side.

use crate::db::DynDatabasePool;
use crate::models::{DocumentId, UserTagOverride};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};
use std::sync::Arc;

/// Override overlay repository trait
#[async_trait]
pub trait OverlayRepository: Send + Sync {
    /// A user's overrides on one document
    async fn list_for_user_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> Result<Vec<UserTagOverride>>;

    /// A user's overrides across all documents, newest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserTagOverride>>;

    /// Number of overrides, for any user, matching a key and direction
    async fn count_for_key(
        &self,
        document_id: DocumentId,
        tag_name: &str,
        tag_category: &str,
        is_added: bool,
    ) -> Result<i64>;
}

/// SQLx-based overlay repository implementation
pub struct SqlxOverlayRepository {
    pool: DynDatabasePool,
}

impl SqlxOverlayRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OverlayRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl OverlayRepository for SqlxOverlayRepository {
    async fn list_for_user_document(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> Result<Vec<UserTagOverride>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, document_id, tag_name, tag_category, is_added, created_at
            FROM user_tag_overrides
            WHERE user_id = ? AND document_id = ?
            ORDER BY tag_category, tag_name
            "#,
        )
        .bind(user_id)
        .bind(document_id.get())
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list user overrides for document")?;

        Ok(rows.iter().map(row_to_override).collect())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<UserTagOverride>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, document_id, tag_name, tag_category, is_added, created_at
            FROM user_tag_overrides
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list user overrides")?;

        Ok(rows.iter().map(row_to_override).collect())
    }

    async fn count_for_key(
        &self,
        document_id: DocumentId,
        tag_name: &str,
        tag_category: &str,
        is_added: bool,
    ) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM user_tag_overrides
            WHERE document_id = ? AND tag_name = ? AND tag_category = ? AND is_added = ?
            "#,
        )
        .bind(document_id.get())
        .bind(tag_name)
        .bind(tag_category)
        .bind(is_added)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to count overrides")
    }
}

/// Write (or overwrite) a user's override for a tag within a transaction
pub(crate) async fn upsert_override_tx(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    document_id: DocumentId,
    tag_name: &str,
    tag_category: &str,
    is_added: bool,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_tag_overrides
            (user_id, document_id, tag_name, tag_category, is_added, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, document_id, tag_name, tag_category)
        DO UPDATE SET is_added = excluded.is_added, created_at = excluded.created_at
        "#,
    )
    .bind(user_id)
    .bind(document_id.get())
    .bind(tag_name)
    .bind(tag_category)
    .bind(is_added)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .context("Failed to write user override")?;

    Ok(())
}

/// Delete every user's override for a key and direction within a transaction
pub(crate) async fn delete_overrides_for_key_tx(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: DocumentId,
    tag_name: &str,
    tag_category: &str,
    is_added: bool,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_tag_overrides
        WHERE document_id = ? AND tag_name = ? AND tag_category = ? AND is_added = ?
        "#,
    )
    .bind(document_id.get())
    .bind(tag_name)
    .bind(tag_category)
    .bind(is_added)
    .execute(&mut **tx)
    .await
    .context("Failed to clear overrides")?;

    Ok(result.rows_affected())
}

fn row_to_override(row: &sqlx::sqlite::SqliteRow) -> UserTagOverride {
    UserTagOverride {
        user_id: row.get("user_id"),
        document_id: DocumentId::new(row.get("document_id")),
        tag_name: row.get("tag_name"),
        tag_category: row.get("tag_category"),
        is_added: row.get("is_added"),
        created_at: row.get("created_at"),
    }
}
