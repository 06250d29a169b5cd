//! Popularity tracker

use crate::db::repositories::{DocumentRepository, ViewCountRepository};
use crate::models::{DocumentId, ViewCount};
use anyhow::Context;
use std::sync::Arc;

use super::error::GovernanceError;

/// Popularity tracker service
pub struct PopularityService {
    views: Arc<dyn ViewCountRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl PopularityService {
    pub fn new(views: Arc<dyn ViewCountRepository>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self { views, documents }
    }

    /// Record one view of a document and return its new view count
    pub async fn track_view(&self, document_id: DocumentId) -> Result<i64, GovernanceError> {
        self.require_document(document_id).await?;

        let count = self.views.increment(document_id).await?;
        tracing::debug!(%document_id, view_count = count, "View tracked");
        Ok(count)
    }

    /// Current view count, 0 for a never-viewed document
    pub async fn view_count(&self, document_id: DocumentId) -> Result<i64, GovernanceError> {
        Ok(self.views.view_count(document_id).await?)
    }

    /// Stored counters for a document, `None` if it was never viewed
    pub async fn stats(
        &self,
        document_id: DocumentId,
    ) -> Result<Option<ViewCount>, GovernanceError> {
        self.require_document(document_id).await?;
        Ok(self.views.get(document_id).await?)
    }

    async fn require_document(&self, document_id: DocumentId) -> Result<(), GovernanceError> {
        match self
            .documents
            .get_by_id(document_id)
            .await
            .context("Failed to load document")?
        {
            Some(_) => Ok(()),
            None => Err(GovernanceError::NotFound(format!(
                "Document {} not found",
                document_id
            ))),
        }
    }
}
