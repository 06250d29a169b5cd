//! Approved rule ledger service
//!
//! Rules are appended by request resolution or created by hand. A manual
//! rule takes effect on the next replay.

use crate::db::repositories::{DocumentRepository, RuleRepository};
use crate::models::{
    ApprovalSource, ApprovedTagRule, CreateManualRuleInput, NewRule, TagLabel,
};
use anyhow::Context;
use std::sync::Arc;

use super::error::{require_non_blank, GovernanceError};

/// Approved rule ledger service
pub struct RuleService {
    rules: Arc<dyn RuleRepository>,
    documents: Arc<dyn DocumentRepository>,
}

impl RuleService {
    pub fn new(rules: Arc<dyn RuleRepository>, documents: Arc<dyn DocumentRepository>) -> Self {
        Self { rules, documents }
    }

    /// Record a rule by hand.
    ///
    /// # Errors
    /// - `InvalidInput` for blank fields
    /// - `NotFound` if no document carries the external id
    /// - `Conflict` if an active rule with the same key and type exists
    pub async fn create_manual_rule(
        &self,
        input: CreateManualRuleInput,
        approved_by: &str,
    ) -> Result<ApprovedTagRule, GovernanceError> {
        require_non_blank(approved_by, "approved_by")?;
        require_non_blank(input.external_doc_id.as_str(), "external_doc_id")?;
        let label = TagLabel::parse(&input.tag_name, &input.tag_category).ok_or_else(|| {
            GovernanceError::InvalidInput("Tag name and category cannot be empty".to_string())
        })?;

        let document = self
            .documents
            .find_by_external_id(&input.external_doc_id)
            .await
            .context("Failed to resolve document")?
            .ok_or_else(|| {
                GovernanceError::NotFound(format!(
                    "No document with external id {}",
                    input.external_doc_id
                ))
            })?;

        if self
            .rules
            .find_active(
                &input.external_doc_id,
                &label.name,
                &label.category,
                input.rule_type,
            )
            .await?
            .is_some()
        {
            return Err(GovernanceError::Conflict(format!(
                "An active {} rule for {}/{} on {} already exists",
                input.rule_type.as_str(),
                label.category,
                label.name,
                input.external_doc_id
            )));
        }

        let rule = self
            .rules
            .append(&NewRule {
                external_doc_id: input.external_doc_id,
                document_name: document.name,
                tag_name: label.name,
                tag_category: label.category,
                rule_type: input.rule_type,
                approval_source: ApprovalSource::ManualOverride,
                approved_by: approved_by.trim().to_string(),
                source_request_id: None,
                votes_in_favor: 0.0,
                total_votes: 0.0,
                notes: input
                    .notes
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
                applied: false,
            })
            .await?;

        tracing::info!(
            rule_id = rule.id,
            external_doc_id = %rule.external_doc_id,
            approved_by = %rule.approved_by,
            "Manual {} rule created for {}/{}",
            rule.rule_type.as_str(),
            rule.tag_category,
            rule.tag_name
        );
        Ok(rule)
    }

    /// Flip a rule's active flag and return the updated rule
    pub async fn toggle_rule(&self, id: i64) -> Result<ApprovedTagRule, GovernanceError> {
        let rule = self.require_rule(id).await?;
        self.rules.set_active(id, !rule.is_active).await?;

        tracing::info!(rule_id = id, is_active = !rule.is_active, "Rule toggled");
        Ok(ApprovedTagRule {
            is_active: !rule.is_active,
            ..rule
        })
    }

    /// Permanently remove a rule
    pub async fn delete_rule(&self, id: i64) -> Result<(), GovernanceError> {
        if !self.rules.delete(id).await? {
            return Err(GovernanceError::NotFound(format!("Rule {} not found", id)));
        }
        tracing::info!(rule_id = id, "Rule deleted");
        Ok(())
    }

    /// Rules newest first
    pub async fn list_rules(
        &self,
        active_only: bool,
    ) -> Result<Vec<ApprovedTagRule>, GovernanceError> {
        Ok(self.rules.list(active_only).await?)
    }

    pub async fn get_rule(&self, id: i64) -> Result<ApprovedTagRule, GovernanceError> {
        self.require_rule(id).await
    }

    async fn require_rule(&self, id: i64) -> Result<ApprovedTagRule, GovernanceError> {
        self.rules
            .get(id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(format!("Rule {} not found", id)))
    }
}
