//! Approved tag rule repository
//!
//! Append-only ledger of accepted tag decisions. Rows are only removed by an
//! explicit admin delete; everything else flips `is_active` or bumps the
//! application counters.

use crate::db::repositories::document_tag::{delete_tag_tx, insert_tag_tx};
use crate::db::DynDatabasePool;
use crate::models::{ApprovalSource, ApprovedTagRule, DocumentId, ExternalDocId, NewRule, RuleType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

/// Approved rule repository trait
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Append a rule to the ledger
    async fn append(&self, rule: &NewRule) -> Result<ApprovedTagRule>;

    /// Get rule by ID
    async fn get(&self, id: i64) -> Result<Option<ApprovedTagRule>>;

    /// List rules newest first
    async fn list(&self, active_only: bool) -> Result<Vec<ApprovedTagRule>>;

    /// Active rules oldest first, optionally limited to one category
    async fn list_active_for_replay(&self, category: Option<&str>) -> Result<Vec<ApprovedTagRule>>;

    /// Find an active rule with the same key
    async fn find_active(
        &self,
        external_doc_id: &ExternalDocId,
        tag_name: &str,
        tag_category: &str,
        rule_type: RuleType,
    ) -> Result<Option<ApprovedTagRule>>;

    /// Set the active flag. Returns `false` if the rule does not exist.
    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool>;

    /// Permanently delete a rule. Returns `false` if it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Apply a rule to a document's tags.
    ///
    /// Returns `true` if the tag set changed, in which case the rule's
    /// application counters are bumped in the same transaction.
    async fn apply(&self, rule: &ApprovedTagRule, document_id: DocumentId) -> Result<bool>;
}

/// SQLx-based rule repository implementation
pub struct SqlxRuleRepository {
    pool: DynDatabasePool,
}

impl SqlxRuleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RuleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RuleRepository for SqlxRuleRepository {
    async fn append(&self, rule: &NewRule) -> Result<ApprovedTagRule> {
        let mut tx = self.pool.sqlite().begin().await?;
        let created = append_rule_tx(&mut tx, rule).await?;
        tx.commit().await.context("Failed to commit rule")?;
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<ApprovedTagRule>> {
        get_rule_sqlite(self.pool.sqlite(), id).await
    }

    async fn list(&self, active_only: bool) -> Result<Vec<ApprovedTagRule>> {
        let sql = format!(
            "SELECT {} FROM approved_tag_rules {} ORDER BY created_at DESC, id DESC",
            RULE_COLUMNS,
            if active_only { "WHERE is_active = 1" } else { "" }
        );
        let rows = sqlx::query(&sql)
            .fetch_all(self.pool.sqlite())
            .await
            .context("Failed to list rules")?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn list_active_for_replay(&self, category: Option<&str>) -> Result<Vec<ApprovedTagRule>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM approved_tag_rules
            WHERE is_active = 1 AND (? IS NULL OR tag_category = ?)
            ORDER BY created_at, id
            "#,
            RULE_COLUMNS
        ))
        .bind(category)
        .bind(category)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list active rules")?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn find_active(
        &self,
        external_doc_id: &ExternalDocId,
        tag_name: &str,
        tag_category: &str,
        rule_type: RuleType,
    ) -> Result<Option<ApprovedTagRule>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM approved_tag_rules
            WHERE external_doc_id = ? AND tag_name = ? AND tag_category = ?
              AND rule_type = ? AND is_active = 1
            ORDER BY id DESC
            LIMIT 1
            "#,
            RULE_COLUMNS
        ))
        .bind(external_doc_id.as_str())
        .bind(tag_name)
        .bind(tag_category)
        .bind(rule_type.as_str())
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to look up active rule")?;

        row.as_ref().map(row_to_rule).transpose()
    }

    async fn set_active(&self, id: i64, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE approved_tag_rules SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update rule")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM approved_tag_rules WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete rule")?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply(&self, rule: &ApprovedTagRule, document_id: DocumentId) -> Result<bool> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin rule application")?;

        let changed = match rule.rule_type {
            RuleType::Add => {
                insert_tag_tx(&mut tx, document_id, &rule.tag_name, &rule.tag_category).await?
            }
            RuleType::Remove => {
                delete_tag_tx(&mut tx, document_id, &rule.tag_name, &rule.tag_category).await?
            }
        };

        if changed {
            sqlx::query(
                r#"
                UPDATE approved_tag_rules
                SET times_applied = times_applied + 1, last_applied_at = ?
                WHERE id = ?
                "#,
            )
            .bind(Utc::now())
            .bind(rule.id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to record application of rule {}", rule.id))?;
        }

        tx.commit().await.context("Failed to commit rule application")?;
        Ok(changed)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const RULE_COLUMNS: &str = r#"id, external_doc_id, document_name, tag_name, tag_category,
    rule_type, approval_source, approved_by, source_request_id, votes_in_favor,
    total_votes, is_active, created_at, last_applied_at, times_applied, notes"#;

async fn get_rule_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<ApprovedTagRule>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM approved_tag_rules WHERE id = ?",
        RULE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get rule by ID")?;

    row.as_ref().map(row_to_rule).transpose()
}

/// Append a rule within a transaction.
///
/// Rules recorded with `applied` set start with one application at creation
/// time; all others start at zero.
pub(crate) async fn append_rule_tx(
    tx: &mut Transaction<'_, Sqlite>,
    rule: &NewRule,
) -> Result<ApprovedTagRule> {
    let now = Utc::now();
    let (times_applied, last_applied_at) = if rule.applied {
        (1_i64, Some(now))
    } else {
        (0_i64, None)
    };

    let result = sqlx::query(
        r#"
        INSERT INTO approved_tag_rules (
            external_doc_id, document_name, tag_name, tag_category, rule_type,
            approval_source, approved_by, source_request_id, votes_in_favor,
            total_votes, is_active, created_at, last_applied_at, times_applied, notes
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)
        "#,
    )
    .bind(rule.external_doc_id.as_str())
    .bind(&rule.document_name)
    .bind(&rule.tag_name)
    .bind(&rule.tag_category)
    .bind(rule.rule_type.as_str())
    .bind(rule.approval_source.as_str())
    .bind(&rule.approved_by)
    .bind(rule.source_request_id)
    .bind(rule.votes_in_favor)
    .bind(rule.total_votes)
    .bind(now)
    .bind(last_applied_at)
    .bind(times_applied)
    .bind(&rule.notes)
    .execute(&mut **tx)
    .await
    .context("Failed to append approved rule")?;

    Ok(ApprovedTagRule {
        id: result.last_insert_rowid(),
        external_doc_id: rule.external_doc_id.clone(),
        document_name: rule.document_name.clone(),
        tag_name: rule.tag_name.clone(),
        tag_category: rule.tag_category.clone(),
        rule_type: rule.rule_type,
        approval_source: rule.approval_source,
        approved_by: rule.approved_by.clone(),
        source_request_id: rule.source_request_id,
        votes_in_favor: rule.votes_in_favor,
        total_votes: rule.total_votes,
        is_active: true,
        created_at: now,
        last_applied_at,
        times_applied,
        notes: rule.notes.clone(),
    })
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovedTagRule> {
    let rule_type_str: String = row.get("rule_type");
    let rule_type = RuleType::from_str(&rule_type_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid rule type: {}", rule_type_str))?;
    let source_str: String = row.get("approval_source");
    let approval_source = ApprovalSource::from_str(&source_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid approval source: {}", source_str))?;

    Ok(ApprovedTagRule {
        id: row.get("id"),
        external_doc_id: ExternalDocId::new(row.get::<String, _>("external_doc_id")),
        document_name: row.get("document_name"),
        tag_name: row.get("tag_name"),
        tag_category: row.get("tag_category"),
        rule_type,
        approval_source,
        approved_by: row.get("approved_by"),
        source_request_id: row.get("source_request_id"),
        votes_in_favor: row.get("votes_in_favor"),
        total_votes: row.get("total_votes"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        last_applied_at: row.get("last_applied_at"),
        times_applied: row.get("times_applied"),
        notes: row.get("notes"),
    })
}
