//! Override overlay service
//!
//! Effective tags for a user are the authoritative tags plus the tags the
//! user added, minus the tags the user removed, through requests that are
//! still pending.

use crate::db::repositories::{DocumentRepository, DocumentTagRepository, OverlayRepository};
use crate::models::{DocumentId, EffectiveTag, TagLabel, UserTagOverride};
use anyhow::Context;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::{require_non_blank, GovernanceError};

/// Override overlay service
pub struct OverlayService {
    overlay: Arc<dyn OverlayRepository>,
    documents: Arc<dyn DocumentRepository>,
    tags: Arc<dyn DocumentTagRepository>,
}

impl OverlayService {
    pub fn new(
        overlay: Arc<dyn OverlayRepository>,
        documents: Arc<dyn DocumentRepository>,
        tags: Arc<dyn DocumentTagRepository>,
    ) -> Self {
        Self {
            overlay,
            documents,
            tags,
        }
    }

    /// Tags of `document_id` as `user_id` sees them, sorted by category then name
    pub async fn get_effective_tags(
        &self,
        user_id: &str,
        document_id: DocumentId,
    ) -> Result<Vec<EffectiveTag>, GovernanceError> {
        require_non_blank(user_id, "user_id")?;
        self.documents
            .get_by_id(document_id)
            .await
            .context("Failed to load document")?
            .ok_or_else(|| {
                GovernanceError::NotFound(format!("Document {} not found", document_id))
            })?;

        let authoritative = self.tags.list_for_document(document_id).await?;
        let overrides = self
            .overlay
            .list_for_user_document(user_id.trim(), document_id)
            .await?;

        // value: whether the tag comes from the overlay
        let mut effective: BTreeMap<TagLabel, bool> = authoritative
            .into_iter()
            .map(|tag| {
                (
                    TagLabel {
                        category: tag.tag_category,
                        name: tag.tag_name,
                    },
                    false,
                )
            })
            .collect();

        for o in overrides {
            let label = TagLabel {
                category: o.tag_category,
                name: o.tag_name,
            };
            if o.is_added {
                effective.entry(label).or_insert(true);
            } else {
                effective.remove(&label);
            }
        }

        Ok(effective
            .into_iter()
            .map(|(label, from_overlay)| EffectiveTag {
                tag_name: label.name,
                tag_category: label.category,
                from_overlay,
            })
            .collect())
    }

    /// Every overlay row the user currently holds, newest first
    pub async fn get_user_overrides(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserTagOverride>, GovernanceError> {
        require_non_blank(user_id, "user_id")?;
        Ok(self.overlay.list_for_user(user_id.trim()).await?)
    }
}
