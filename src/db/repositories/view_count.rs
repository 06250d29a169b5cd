//! Document view count repository
//!
//! Popularity signal read by the threshold evaluator.

use crate::db::DynDatabasePool;
use crate::models::{DocumentId, ViewCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait ViewCountRepository: Send + Sync {
    /// Stored counters, `None` when the document was never viewed
    async fn get(&self, document_id: DocumentId) -> Result<Option<ViewCount>>;

    /// Current view count, 0 when the document was never viewed
    async fn view_count(&self, document_id: DocumentId) -> Result<i64>;

    /// Record one view and return the new count. The first view also
    /// counts as the first unique view.
    async fn increment(&self, document_id: DocumentId) -> Result<i64>;
}

/// SQLx-based view count repository implementation
pub struct SqlxViewCountRepository {
    pool: DynDatabasePool,
}

impl SqlxViewCountRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ViewCountRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ViewCountRepository for SqlxViewCountRepository {
    async fn get(&self, document_id: DocumentId) -> Result<Option<ViewCount>> {
        let row = sqlx::query(
            r#"
            SELECT document_id, view_count, unique_view_count, last_viewed
            FROM document_view_counts
            WHERE document_id = ?
            "#,
        )
        .bind(document_id.get())
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get view count")?;

        Ok(row.map(|row| ViewCount {
            document_id: DocumentId::new(row.get("document_id")),
            view_count: row.get("view_count"),
            unique_view_count: row.get("unique_view_count"),
            last_viewed: row.get("last_viewed"),
        }))
    }

    async fn view_count(&self, document_id: DocumentId) -> Result<i64> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT view_count FROM document_view_counts WHERE document_id = ?")
                .bind(document_id.get())
                .fetch_optional(self.pool.sqlite())
                .await
                .context("Failed to get view count")?;
        Ok(count.unwrap_or(0))
    }

    async fn increment(&self, document_id: DocumentId) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            INSERT INTO document_view_counts (document_id, view_count, unique_view_count, last_viewed)
            VALUES (?, 1, 1, ?)
            ON CONFLICT(document_id) DO UPDATE SET
                view_count = view_count + 1,
                last_viewed = excluded.last_viewed
            RETURNING view_count
            "#,
        )
        .bind(document_id.get())
        .bind(Utc::now())
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to record document view")
    }
}
