//! Rule replay service
//!
//! After an external job regenerates the tag set, active approved rules are
//! re-applied so community and admin decisions are not lost. Rules reference
//! documents by external id and are resolved to the current document row on
//! every replay.

use crate::db::repositories::{DocumentRepository, DocumentTagRepository, RuleRepository};
use crate::models::{ApprovedTagRule, Document, ExternalDocId, RuleType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::error::GovernanceError;

/// Replay options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayOptions {
    /// Only replay rules of this tag category
    pub category: Option<String>,
    /// Report what would change without writing
    pub dry_run: bool,
}

/// A rule that could not be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule_id: i64,
    pub error: String,
}

/// Summary of one replay
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub rules_considered: usize,
    pub additions_applied: usize,
    pub removals_applied: usize,
    /// Rules whose external id no longer resolves to a document
    pub documents_not_found: usize,
    /// Older rules shadowed by a newer rule on the same tag
    pub rules_superseded: usize,
    /// Rules the corpus already satisfied
    pub unchanged: usize,
    pub applied_rule_ids: Vec<i64>,
    pub failures: Vec<RuleFailure>,
    pub dry_run: bool,
}

/// Rule replay service
pub struct ReplayService {
    rules: Arc<dyn RuleRepository>,
    documents: Arc<dyn DocumentRepository>,
    tags: Arc<dyn DocumentTagRepository>,
}

impl ReplayService {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        documents: Arc<dyn DocumentRepository>,
        tags: Arc<dyn DocumentTagRepository>,
    ) -> Self {
        Self {
            rules,
            documents,
            tags,
        }
    }

    /// Re-apply every active rule.
    ///
    /// A rule counts as applied only when it changed the document's tags, so
    /// running this twice in a row applies nothing the second time.
    pub async fn apply_approved_rules(
        &self,
        options: &ReplayOptions,
    ) -> Result<ReplayReport, GovernanceError> {
        let category = options
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let rules = self.rules.list_active_for_replay(category).await?;
        let (authoritative, superseded) = newest_per_tag(rules);

        tracing::info!(
            rules = authoritative.len() + superseded,
            superseded,
            category = category.unwrap_or("*"),
            dry_run = options.dry_run,
            "Replaying approved rules"
        );

        let mut report = ReplayReport {
            rules_considered: authoritative.len() + superseded,
            rules_superseded: superseded,
            dry_run: options.dry_run,
            ..ReplayReport::default()
        };
        let mut resolved: HashMap<ExternalDocId, Option<Document>> = HashMap::new();

        for rule in &authoritative {
            let document = match resolved.get(&rule.external_doc_id) {
                Some(document) => document.clone(),
                None => match self.documents.find_by_external_id(&rule.external_doc_id).await {
                    Ok(document) => {
                        resolved.insert(rule.external_doc_id.clone(), document.clone());
                        document
                    }
                    Err(e) => {
                        record_failure(&mut report, rule, e);
                        continue;
                    }
                },
            };

            let Some(document) = document else {
                tracing::warn!(
                    rule_id = rule.id,
                    external_doc_id = %rule.external_doc_id,
                    "Document for rule not found"
                );
                report.documents_not_found += 1;
                continue;
            };

            let changed = if options.dry_run {
                self.would_change(rule, &document).await
            } else {
                self.rules.apply(rule, document.id).await
            };

            match changed {
                Ok(true) => {
                    match rule.rule_type {
                        RuleType::Add => report.additions_applied += 1,
                        RuleType::Remove => report.removals_applied += 1,
                    }
                    report.applied_rule_ids.push(rule.id);
                    tracing::debug!(
                        rule_id = rule.id,
                        document_id = %document.id,
                        "{} {}/{}",
                        rule.rule_type.as_str(),
                        rule.tag_category,
                        rule.tag_name
                    );
                }
                Ok(false) => report.unchanged += 1,
                Err(e) => record_failure(&mut report, rule, e),
            }
        }

        tracing::info!(
            additions = report.additions_applied,
            removals = report.removals_applied,
            unchanged = report.unchanged,
            documents_not_found = report.documents_not_found,
            failures = report.failures.len(),
            "Rule replay finished"
        );
        Ok(report)
    }

    async fn would_change(&self, rule: &ApprovedTagRule, document: &Document) -> anyhow::Result<bool> {
        let present = self
            .tags
            .find(document.id, &rule.tag_name, &rule.tag_category)
            .await?
            .is_some();
        Ok(match rule.rule_type {
            RuleType::Add => !present,
            RuleType::Remove => present,
        })
    }
}

/// Keep the newest rule for each (document, tag) and count the rest.
///
/// Input is oldest first; the returned rules keep that order.
fn newest_per_tag(rules: Vec<ApprovedTagRule>) -> (Vec<ApprovedTagRule>, usize) {
    let mut seen = HashSet::new();
    let mut superseded = 0;
    let mut newest = Vec::with_capacity(rules.len());

    for rule in rules.into_iter().rev() {
        let key = (
            rule.external_doc_id.clone(),
            rule.tag_name.clone(),
            rule.tag_category.clone(),
        );
        if seen.insert(key) {
            newest.push(rule);
        } else {
            superseded += 1;
        }
    }

    newest.reverse();
    (newest, superseded)
}

fn record_failure(report: &mut ReplayReport, rule: &ApprovedTagRule, error: anyhow::Error) {
    tracing::warn!(rule_id = rule.id, "Failed to apply rule: {:#}", error);
    report.failures.push(RuleFailure {
        rule_id: rule.id,
        error: format!("{:#}", error),
    });
}
