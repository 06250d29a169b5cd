//! Document repository
//!
//! Identity resolver for the external corpus. Documents are looked up by
//! internal row id for request handling and by `ExternalDocId` for rule replay.

use crate::db::DynDatabasePool;
use crate::models::{Document, DocumentId, ExternalDocId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

/// Document repository trait
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Register a document under its durable external id
    async fn create(&self, external_id: &ExternalDocId, name: &str) -> Result<Document>;

    /// Get document by internal id
    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>>;

    /// Resolve an external id to the document currently carrying it
    async fn find_by_external_id(&self, external_id: &ExternalDocId) -> Result<Option<Document>>;
}

/// SQLx-based document repository implementation
pub struct SqlxDocumentRepository {
    pool: DynDatabasePool,
}

impl SqlxDocumentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn DocumentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl DocumentRepository for SqlxDocumentRepository {
    async fn create(&self, external_id: &ExternalDocId, name: &str) -> Result<Document> {
        create_document(self.pool.sqlite(), external_id, name).await
    }

    async fn get_by_id(&self, id: DocumentId) -> Result<Option<Document>> {
        get_document_by_id(self.pool.sqlite(), id).await
    }

    async fn find_by_external_id(&self, external_id: &ExternalDocId) -> Result<Option<Document>> {
        find_document_by_external_id(self.pool.sqlite(), external_id).await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const DOCUMENT_COLUMNS: &str = "id, external_id, name, created_at";

async fn create_document(
    pool: &SqlitePool,
    external_id: &ExternalDocId,
    name: &str,
) -> Result<Document> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO documents (external_id, name, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(external_id.as_str())
    .bind(name)
    .bind(now)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to create document {}", external_id))?;

    Ok(Document {
        id: DocumentId::new(result.last_insert_rowid()),
        external_id: external_id.clone(),
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_document_by_id(pool: &SqlitePool, id: DocumentId) -> Result<Option<Document>> {
    let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
        .bind(id.get())
        .fetch_optional(pool)
        .await
        .context("Failed to get document by ID")?;

    row.as_ref().map(row_to_document).transpose()
}

async fn find_document_by_external_id(
    pool: &SqlitePool,
    external_id: &ExternalDocId,
) -> Result<Option<Document>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM documents WHERE external_id = ?",
        DOCUMENT_COLUMNS
    ))
    .bind(external_id.as_str())
    .fetch_optional(pool)
    .await
    .context("Failed to resolve external document id")?;

    row.as_ref().map(row_to_document).transpose()
}

/// Get a document by internal id within a transaction.
pub(crate) async fn get_document_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: DocumentId,
) -> Result<Option<Document>> {
    let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to get document by ID")?;

    row.as_ref().map(row_to_document).transpose()
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    Ok(Document {
        id: DocumentId::new(row.get("id")),
        external_id: ExternalDocId::new(row.get::<String, _>("external_id")),
        name: row.get("name"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxDocumentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxDocumentRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_create_and_get_document() {
        let (_pool, repo) = setup_test_repo().await;
        let ext = ExternalDocId::new("1AbC");

        let created = repo.create(&ext, "naruto-vol1.pdf").await.unwrap();
        assert!(created.id.get() > 0);

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.external_id, ext);
        assert_eq!(found.name, "naruto-vol1.pdf");
    }

    #[tokio::test]
    async fn test_find_by_external_id() {
        let (_pool, repo) = setup_test_repo().await;
        let ext = ExternalDocId::new("drive-42");
        let created = repo.create(&ext, "doc.pdf").await.unwrap();

        let found = repo.find_by_external_id(&ext).await.unwrap();
        assert_eq!(found.map(|d| d.id), Some(created.id));

        let missing = repo
            .find_by_external_id(&ExternalDocId::new("nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_external_id_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        let ext = ExternalDocId::new("same");
        repo.create(&ext, "a.pdf").await.unwrap();
        assert!(repo.create(&ext, "b.pdf").await.is_err());
    }

    #[tokio::test]
    async fn test_replaced_row_resolves_to_new_id() {
        let (pool, repo) = setup_test_repo().await;
        let ext = ExternalDocId::new("stable");

        // the corpus pipeline drops and re-inserts rows on regeneration
        let first = repo.create(&ext, "doc.pdf").await.unwrap();
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(first.id.get())
            .execute(pool.sqlite())
            .await
            .unwrap();
        let second = repo.create(&ext, "doc.pdf").await.unwrap();

        assert_ne!(first.id, second.id);
        let resolved = repo.find_by_external_id(&ext).await.unwrap().unwrap();
        assert_eq!(resolved.id, second.id);
    }
}
