//! Document tag repository
//!
//! The authoritative tag store. Rows are keyed by
//! (document_id, tag_name, tag_category); inserting an existing key or
//! deleting a missing one is a no-op reported through the returned flag.
//!
//! The `_tx` helpers let request resolution and rule replay change tags inside
//! their own transactions.

use crate::db::DynDatabasePool;
use crate::models::{DocumentId, DocumentTag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

/// Document tag repository trait
#[async_trait]
pub trait DocumentTagRepository: Send + Sync {
    /// Insert a tag row. Returns `false` if it was already present.
    async fn insert(&self, document_id: DocumentId, tag_name: &str, tag_category: &str)
        -> Result<bool>;

    /// Delete a tag row. Returns `false` if it was absent.
    async fn delete(&self, document_id: DocumentId, tag_name: &str, tag_category: &str)
        -> Result<bool>;

    /// Find a tag row by key
    async fn find(
        &self,
        document_id: DocumentId,
        tag_name: &str,
        tag_category: &str,
    ) -> Result<Option<DocumentTag>>;

    /// List a document's tags ordered by category then name
    async fn list_for_document(&self, document_id: DocumentId) -> Result<Vec<DocumentTag>>;

    /// Drop every tag of a document, as bulk regeneration does
    async fn clear_document(&self, document_id: DocumentId) -> Result<u64>;
}

/// SQLx-based document tag repository implementation
pub struct SqlxDocumentTagRepository {
    pool: DynDatabasePool,
}

impl SqlxDocumentTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn DocumentTagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl DocumentTagRepository for SqlxDocumentTagRepository {
    async fn insert(
        &self,
        document_id: DocumentId,
        tag_name: &str,
        tag_category: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.sqlite().begin().await?;
        let inserted = insert_tag_tx(&mut tx, document_id, tag_name, tag_category).await?;
        tx.commit().await.context("Failed to commit tag insert")?;
        Ok(inserted)
    }

    async fn delete(
        &self,
        document_id: DocumentId,
        tag_name: &str,
        tag_category: &str,
    ) -> Result<bool> {
        let mut tx = self.pool.sqlite().begin().await?;
        let deleted = delete_tag_tx(&mut tx, document_id, tag_name, tag_category).await?;
        tx.commit().await.context("Failed to commit tag delete")?;
        Ok(deleted)
    }

    async fn find(
        &self,
        document_id: DocumentId,
        tag_name: &str,
        tag_category: &str,
    ) -> Result<Option<DocumentTag>> {
        find_tag_sqlite(self.pool.sqlite(), document_id, tag_name, tag_category).await
    }

    async fn list_for_document(&self, document_id: DocumentId) -> Result<Vec<DocumentTag>> {
        list_tags_for_document_sqlite(self.pool.sqlite(), document_id).await
    }

    async fn clear_document(&self, document_id: DocumentId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document_tags WHERE document_id = ?")
            .bind(document_id.get())
            .execute(self.pool.sqlite())
            .await
            .context("Failed to clear document tags")?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_tag_sqlite(
    pool: &SqlitePool,
    document_id: DocumentId,
    tag_name: &str,
    tag_category: &str,
) -> Result<Option<DocumentTag>> {
    let row = sqlx::query(
        r#"
        SELECT id, document_id, tag_name, tag_category
        FROM document_tags
        WHERE document_id = ? AND tag_name = ? AND tag_category = ?
        "#,
    )
    .bind(document_id.get())
    .bind(tag_name)
    .bind(tag_category)
    .fetch_optional(pool)
    .await
    .context("Failed to find document tag")?;

    Ok(row.as_ref().map(row_to_document_tag))
}

async fn list_tags_for_document_sqlite(
    pool: &SqlitePool,
    document_id: DocumentId,
) -> Result<Vec<DocumentTag>> {
    let rows = sqlx::query(
        r#"
        SELECT id, document_id, tag_name, tag_category
        FROM document_tags
        WHERE document_id = ?
        ORDER BY tag_category, tag_name
        "#,
    )
    .bind(document_id.get())
    .fetch_all(pool)
    .await
    .context("Failed to list document tags")?;

    Ok(rows.iter().map(row_to_document_tag).collect())
}

/// Insert a tag row within a transaction. Returns `false` if it already existed.
pub(crate) async fn insert_tag_tx(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: DocumentId,
    tag_name: &str,
    tag_category: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO document_tags (document_id, tag_name, tag_category)
        VALUES (?, ?, ?)
        ON CONFLICT(document_id, tag_name, tag_category) DO NOTHING
        "#,
    )
    .bind(document_id.get())
    .bind(tag_name)
    .bind(tag_category)
    .execute(&mut **tx)
    .await
    .context("Failed to insert document tag")?;

    Ok(result.rows_affected() > 0)
}

/// Delete a tag row within a transaction. Returns `false` if it was absent.
pub(crate) async fn delete_tag_tx(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: DocumentId,
    tag_name: &str,
    tag_category: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM document_tags WHERE document_id = ? AND tag_name = ? AND tag_category = ?",
    )
    .bind(document_id.get())
    .bind(tag_name)
    .bind(tag_category)
    .execute(&mut **tx)
    .await
    .context("Failed to delete document tag")?;

    Ok(result.rows_affected() > 0)
}

fn row_to_document_tag(row: &sqlx::sqlite::SqliteRow) -> DocumentTag {
    DocumentTag {
        id: row.get("id"),
        document_id: DocumentId::new(row.get("document_id")),
        tag_name: row.get("tag_name"),
        tag_category: row.get("tag_category"),
    }
}
