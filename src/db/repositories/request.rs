//! Tag request repository
//!
//! Suggestions and removal requests share one lifecycle:
//! - submission writes the request, the submitter's overlay row and the
//!   submitter's favor vote in a single transaction
//! - resolution flips the status (guarded by `status = 'Pending'`), changes
//!   the authoritative tag row, clears the overlay for every user and appends
//!   the approved rule, again in a single transaction
//! - an acceptance only commits if the votes it was decided on are still the
//!   votes on record
//!
//! Duplicate Pending requests are stopped by partial unique indexes, so
//! `INSERT OR IGNORE` doubles as the idempotency check.

use crate::db::repositories::document::get_document_tx;
use crate::db::repositories::document_tag::{delete_tag_tx, insert_tag_tx};
use crate::db::repositories::overlay::{delete_overrides_for_key_tx, upsert_override_tx};
use crate::db::repositories::rule::append_rule_tx;
use crate::db::repositories::vote::{tally_tx, upsert_vote_tx};
use crate::db::DynDatabasePool;
use crate::models::{
    ApprovedTagRule, CreateRequestInput, DocumentId, NewRule, PendingRemoval, PendingSuggestion,
    RemovalStatus, Resolution, RuleType, Submission, SuggestionStatus, TagRemovalRequest,
    TagSuggestion, VoteTally, VoteTarget,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

/// Result of resolving a request
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The request reached a terminal status; accepted requests carry their rule
    Resolved { rule: Option<ApprovedTagRule> },
    NotFound,
    /// Another actor resolved the request first
    AlreadyResolved,
    /// Votes moved after the acceptance was decided. Nothing was written;
    /// carries the tally the decision should be re-made on.
    VotesChanged(VoteTally),
}

/// Tag request repository trait
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Submit a suggestion, or return the Pending one with the same key
    async fn create_suggestion(&self, input: &CreateRequestInput) -> Result<Submission>;

    /// Submit a removal request for an existing tag row, or return the
    /// Pending one with the same key
    async fn create_removal(
        &self,
        input: &CreateRequestInput,
        document_tag_id: i64,
    ) -> Result<Submission>;

    async fn get_suggestion(&self, id: i64) -> Result<Option<TagSuggestion>>;

    async fn get_removal(&self, id: i64) -> Result<Option<TagRemovalRequest>>;

    /// Pending suggestions with tallies, most voted first
    async fn list_pending_suggestions(
        &self,
        document_id: Option<DocumentId>,
    ) -> Result<Vec<PendingSuggestion>>;

    /// Pending removal requests with tallies, most voted first
    async fn list_pending_removals(
        &self,
        document_id: Option<DocumentId>,
    ) -> Result<Vec<PendingRemoval>>;

    async fn resolve_suggestion(&self, id: i64, resolution: &Resolution) -> Result<ResolveOutcome>;

    async fn resolve_removal(&self, id: i64, resolution: &Resolution) -> Result<ResolveOutcome>;
}

/// SQLx-based request repository implementation
pub struct SqlxRequestRepository {
    pool: DynDatabasePool,
}

impl SqlxRequestRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RequestRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RequestRepository for SqlxRequestRepository {
    async fn create_suggestion(&self, input: &CreateRequestInput) -> Result<Submission> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin suggestion transaction")?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tag_suggestions
                (document_id, tag_name, tag_category, suggested_by, created_at, status)
            VALUES (?, ?, ?, ?, ?, 'Pending')
            "#,
        )
        .bind(input.document_id.get())
        .bind(&input.tag_name)
        .bind(&input.tag_category)
        .bind(&input.user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to create tag suggestion")?;

        if result.rows_affected() == 0 {
            let existing = find_pending_id_tx(&mut tx, "tag_suggestions", input).await?;
            return Ok(Submission::Existing(existing));
        }

        let id = result.last_insert_rowid();
        record_submission_tx(&mut tx, input, VoteTarget::Suggestion(id), true).await?;
        tx.commit().await.context("Failed to commit tag suggestion")?;

        Ok(Submission::Created(id))
    }

    async fn create_removal(
        &self,
        input: &CreateRequestInput,
        document_tag_id: i64,
    ) -> Result<Submission> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin removal transaction")?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tag_removal_requests
                (document_id, document_tag_id, tag_name, tag_category, requested_by, created_at, status)
            VALUES (?, ?, ?, ?, ?, ?, 'Pending')
            "#,
        )
        .bind(input.document_id.get())
        .bind(document_tag_id)
        .bind(&input.tag_name)
        .bind(&input.tag_category)
        .bind(&input.user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to create tag removal request")?;

        if result.rows_affected() == 0 {
            let existing = find_pending_id_tx(&mut tx, "tag_removal_requests", input).await?;
            return Ok(Submission::Existing(existing));
        }

        let id = result.last_insert_rowid();
        record_submission_tx(&mut tx, input, VoteTarget::Removal(id), false).await?;
        tx.commit().await.context("Failed to commit tag removal request")?;

        Ok(Submission::Created(id))
    }

    async fn get_suggestion(&self, id: i64) -> Result<Option<TagSuggestion>> {
        get_suggestion_sqlite(self.pool.sqlite(), id).await
    }

    async fn get_removal(&self, id: i64) -> Result<Option<TagRemovalRequest>> {
        get_removal_sqlite(self.pool.sqlite(), id).await
    }

    async fn list_pending_suggestions(
        &self,
        document_id: Option<DocumentId>,
    ) -> Result<Vec<PendingSuggestion>> {
        let document_id = document_id.map(DocumentId::get);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {columns}, d.name AS document_name, {tally}
            FROM tag_suggestions r
            JOIN documents d ON d.id = r.document_id
            LEFT JOIN ({votes}) v ON v.target_id = r.id
            WHERE r.status = 'Pending' AND (? IS NULL OR r.document_id = ?)
            ORDER BY vote_count DESC, r.created_at, r.id
            "#,
            columns = SUGGESTION_COLUMNS,
            tally = TALLY_COLUMNS,
            votes = votes_by_target("suggestion_id"),
        ))
        .bind(document_id)
        .bind(document_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list pending suggestions")?;

        rows.iter()
            .map(|row| -> Result<PendingSuggestion> {
                Ok(PendingSuggestion {
                    suggestion: row_to_suggestion(row)?,
                    document_name: row.get("document_name"),
                    tally: row_to_tally(row),
                })
            })
            .collect()
    }

    async fn list_pending_removals(
        &self,
        document_id: Option<DocumentId>,
    ) -> Result<Vec<PendingRemoval>> {
        let document_id = document_id.map(DocumentId::get);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {columns}, d.name AS document_name, {tally}
            FROM tag_removal_requests r
            JOIN documents d ON d.id = r.document_id
            LEFT JOIN ({votes}) v ON v.target_id = r.id
            WHERE r.status = 'Pending' AND (? IS NULL OR r.document_id = ?)
            ORDER BY vote_count DESC, r.created_at, r.id
            "#,
            columns = REMOVAL_COLUMNS,
            tally = TALLY_COLUMNS,
            votes = votes_by_target("removal_request_id"),
        ))
        .bind(document_id)
        .bind(document_id)
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list pending removal requests")?;

        rows.iter()
            .map(|row| -> Result<PendingRemoval> {
                Ok(PendingRemoval {
                    request: row_to_removal(row)?,
                    document_name: row.get("document_name"),
                    tally: row_to_tally(row),
                })
            })
            .collect()
    }

    async fn resolve_suggestion(&self, id: i64, resolution: &Resolution) -> Result<ResolveOutcome> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin resolution")?;

        let now = Utc::now();
        let (status, applied_at, resolved_by, reason) = match resolution {
            Resolution::Accept { decision, .. } => (
                SuggestionStatus::Applied,
                Some(now),
                decision.approver.as_str(),
                None,
            ),
            Resolution::Reject { actor, reason } => (
                SuggestionStatus::Rejected,
                None,
                actor.as_str(),
                reason.as_deref(),
            ),
        };

        // Update before any read; the transaction must hold the write lock first
        let updated = sqlx::query(
            r#"
            UPDATE tag_suggestions
            SET status = ?, applied_at = ?, resolved_by = ?, rejection_reason = ?
            WHERE id = ? AND status = 'Pending'
            "#,
        )
        .bind(status.as_str())
        .bind(applied_at)
        .bind(resolved_by)
        .bind(reason)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update suggestion status")?;

        if updated.rows_affected() == 0 {
            return unresolved_outcome_tx(&mut tx, "tag_suggestions", id).await;
        }

        let target = VoteTarget::Suggestion(id);
        if let Some(current) = changed_votes_tx(&mut tx, target, resolution).await? {
            return Ok(ResolveOutcome::VotesChanged(current));
        }

        let suggestion = get_suggestion_tx(&mut tx, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Suggestion {} vanished during resolution", id))?;

        let document_id = suggestion.document_id;
        delete_overrides_for_key_tx(
            &mut tx,
            document_id,
            &suggestion.tag_name,
            &suggestion.tag_category,
            true,
        )
        .await?;

        let rule = match resolution {
            Resolution::Accept {
                decision,
                category_override,
            } => {
                let category = category_override
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .unwrap_or(&suggestion.tag_category);

                insert_tag_tx(&mut tx, document_id, &suggestion.tag_name, category).await?;
                if category != suggestion.tag_category {
                    delete_overrides_for_key_tx(
                        &mut tx,
                        document_id,
                        &suggestion.tag_name,
                        category,
                        true,
                    )
                    .await?;
                }

                let document = get_document_tx(&mut tx, document_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Document {} not found", document_id))?;

                let rule = NewRule {
                    external_doc_id: document.external_id,
                    document_name: document.name,
                    tag_name: suggestion.tag_name.clone(),
                    tag_category: category.to_string(),
                    rule_type: RuleType::Add,
                    approval_source: decision.source,
                    approved_by: decision.approver.clone(),
                    source_request_id: Some(id),
                    votes_in_favor: decision.votes.favor_weight,
                    total_votes: decision.votes.total_weight(),
                    notes: None,
                    applied: true,
                };
                Some(append_rule_tx(&mut tx, &rule).await?)
            }
            Resolution::Reject { .. } => None,
        };

        tx.commit().await.context("Failed to commit resolution")?;
        Ok(ResolveOutcome::Resolved { rule })
    }

    async fn resolve_removal(&self, id: i64, resolution: &Resolution) -> Result<ResolveOutcome> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin resolution")?;

        let now = Utc::now();
        let (status, removed_at, resolved_by, reason) = match resolution {
            Resolution::Accept { decision, .. } => (
                RemovalStatus::Removed,
                Some(now),
                decision.approver.as_str(),
                None,
            ),
            Resolution::Reject { actor, reason } => (
                RemovalStatus::Rejected,
                None,
                actor.as_str(),
                reason.as_deref(),
            ),
        };

        // The tag reference is cleared once the tag is gone
        let updated = sqlx::query(
            r#"
            UPDATE tag_removal_requests
            SET status = ?, removed_at = ?, resolved_by = ?, rejection_reason = ?,
                document_tag_id = CASE WHEN ? THEN NULL ELSE document_tag_id END
            WHERE id = ? AND status = 'Pending'
            "#,
        )
        .bind(status.as_str())
        .bind(removed_at)
        .bind(resolved_by)
        .bind(reason)
        .bind(status == RemovalStatus::Removed)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update removal request status")?;

        if updated.rows_affected() == 0 {
            return unresolved_outcome_tx(&mut tx, "tag_removal_requests", id).await;
        }

        let target = VoteTarget::Removal(id);
        if let Some(current) = changed_votes_tx(&mut tx, target, resolution).await? {
            return Ok(ResolveOutcome::VotesChanged(current));
        }

        let request = get_removal_tx(&mut tx, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Removal request {} vanished during resolution", id))?;

        let document_id = request.document_id;
        delete_overrides_for_key_tx(
            &mut tx,
            document_id,
            &request.tag_name,
            &request.tag_category,
            false,
        )
        .await?;

        let rule = match resolution {
            Resolution::Accept { decision, .. } => {
                delete_tag_tx(&mut tx, document_id, &request.tag_name, &request.tag_category)
                    .await?;

                let document = get_document_tx(&mut tx, document_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Document {} not found", document_id))?;

                let rule = NewRule {
                    external_doc_id: document.external_id,
                    document_name: document.name,
                    tag_name: request.tag_name.clone(),
                    tag_category: request.tag_category.clone(),
                    rule_type: RuleType::Remove,
                    approval_source: decision.source,
                    approved_by: decision.approver.clone(),
                    source_request_id: Some(id),
                    votes_in_favor: decision.votes.favor_weight,
                    total_votes: decision.votes.total_weight(),
                    notes: None,
                    applied: true,
                };
                Some(append_rule_tx(&mut tx, &rule).await?)
            }
            Resolution::Reject { .. } => None,
        };

        tx.commit().await.context("Failed to commit resolution")?;
        Ok(ResolveOutcome::Resolved { rule })
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const SUGGESTION_COLUMNS: &str = r#"r.id, r.document_id, r.tag_name, r.tag_category,
    r.suggested_by, r.created_at, r.status, r.applied_at, r.resolved_by, r.rejection_reason"#;

const REMOVAL_COLUMNS: &str = r#"r.id, r.document_id, r.document_tag_id, r.tag_name,
    r.tag_category, r.requested_by, r.created_at, r.status, r.removed_at, r.resolved_by,
    r.rejection_reason"#;

const TALLY_COLUMNS: &str = r#"
    CAST(COALESCE(v.favor_weight, 0.0) AS REAL) AS favor_weight,
    CAST(COALESCE(v.against_weight, 0.0) AS REAL) AS against_weight,
    COALESCE(v.vote_count, 0) AS vote_count"#;

/// Per-target weighted sums over `tag_votes`, keyed as `target_id`
fn votes_by_target(column: &str) -> String {
    format!(
        r#"
        SELECT {column} AS target_id,
               SUM(CASE WHEN in_favor = 1 THEN weight ELSE 0.0 END) AS favor_weight,
               SUM(CASE WHEN in_favor = 0 THEN weight ELSE 0.0 END) AS against_weight,
               COUNT(*) AS vote_count
        FROM tag_votes
        WHERE {column} IS NOT NULL
        GROUP BY {column}
        "#,
        column = column
    )
}

/// Write the submitter's overlay row and favor vote
async fn record_submission_tx(
    tx: &mut Transaction<'_, Sqlite>,
    input: &CreateRequestInput,
    target: VoteTarget,
    is_added: bool,
) -> Result<()> {
    upsert_override_tx(
        tx,
        &input.user_id,
        input.document_id,
        &input.tag_name,
        &input.tag_category,
        is_added,
    )
    .await?;

    if !upsert_vote_tx(tx, target, &input.user_id, true).await? {
        anyhow::bail!("{} is not pending right after submission", target);
    }
    Ok(())
}

/// Classify a resolution whose guarded update matched no row
async fn unresolved_outcome_tx(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    id: i64,
) -> Result<ResolveOutcome> {
    let exists: Option<i64> =
        sqlx::query_scalar(&format!("SELECT 1 FROM {} WHERE id = ?", table))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to look up request")?;

    Ok(match exists {
        Some(_) => ResolveOutcome::AlreadyResolved,
        None => ResolveOutcome::NotFound,
    })
}

/// The current tally when an acceptance was decided on different votes
async fn changed_votes_tx(
    tx: &mut Transaction<'_, Sqlite>,
    target: VoteTarget,
    resolution: &Resolution,
) -> Result<Option<VoteTally>> {
    let decision = match resolution {
        Resolution::Accept { decision, .. } => decision,
        Resolution::Reject { .. } => return Ok(None),
    };

    let current = tally_tx(tx, target).await?;
    Ok((!current.matches(&decision.votes)).then_some(current))
}

async fn find_pending_id_tx(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    input: &CreateRequestInput,
) -> Result<i64> {
    let id: Option<i64> = sqlx::query_scalar(&format!(
        r#"
        SELECT id FROM {}
        WHERE document_id = ? AND tag_name = ? AND tag_category = ? AND status = 'Pending'
        "#,
        table
    ))
    .bind(input.document_id.get())
    .bind(&input.tag_name)
    .bind(&input.tag_category)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to look up pending request")?;

    id.ok_or_else(|| {
        anyhow::anyhow!(
            "Request for {}/{} on document {} was ignored but no pending request exists",
            input.tag_category,
            input.tag_name,
            input.document_id
        )
    })
}

async fn get_suggestion_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<TagSuggestion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tag_suggestions r WHERE r.id = ?",
        SUGGESTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get suggestion by ID")?;

    row.as_ref().map(row_to_suggestion).transpose()
}

async fn get_suggestion_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> Result<Option<TagSuggestion>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tag_suggestions r WHERE r.id = ?",
        SUGGESTION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to get suggestion by ID")?;

    row.as_ref().map(row_to_suggestion).transpose()
}

async fn get_removal_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<TagRemovalRequest>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tag_removal_requests r WHERE r.id = ?",
        REMOVAL_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get removal request by ID")?;

    row.as_ref().map(row_to_removal).transpose()
}

async fn get_removal_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> Result<Option<TagRemovalRequest>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tag_removal_requests r WHERE r.id = ?",
        REMOVAL_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("Failed to get removal request by ID")?;

    row.as_ref().map(row_to_removal).transpose()
}

fn row_to_suggestion(row: &sqlx::sqlite::SqliteRow) -> Result<TagSuggestion> {
    let status_str: String = row.get("status");
    let status = SuggestionStatus::from_str(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid suggestion status: {}", status_str))?;

    Ok(TagSuggestion {
        id: row.get("id"),
        document_id: DocumentId::new(row.get("document_id")),
        tag_name: row.get("tag_name"),
        tag_category: row.get("tag_category"),
        suggested_by: row.get("suggested_by"),
        created_at: row.get("created_at"),
        status,
        applied_at: row.get("applied_at"),
        resolved_by: row.get("resolved_by"),
        rejection_reason: row.get("rejection_reason"),
    })
}

fn row_to_removal(row: &sqlx::sqlite::SqliteRow) -> Result<TagRemovalRequest> {
    let status_str: String = row.get("status");
    let status = RemovalStatus::from_str(&status_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid removal status: {}", status_str))?;

    Ok(TagRemovalRequest {
        id: row.get("id"),
        document_id: DocumentId::new(row.get("document_id")),
        document_tag_id: row.get("document_tag_id"),
        tag_name: row.get("tag_name"),
        tag_category: row.get("tag_category"),
        requested_by: row.get("requested_by"),
        created_at: row.get("created_at"),
        status,
        removed_at: row.get("removed_at"),
        resolved_by: row.get("resolved_by"),
        rejection_reason: row.get("rejection_reason"),
    })
}

fn row_to_tally(row: &sqlx::sqlite::SqliteRow) -> VoteTally {
    VoteTally::new(
        row.get("favor_weight"),
        row.get("against_weight"),
        row.get("vote_count"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        DocumentRepository, DocumentTagRepository, OverlayRepository, RuleRepository,
        SqlxDocumentRepository, SqlxDocumentTagRepository, SqlxOverlayRepository,
        SqlxRuleRepository, SqlxVoteRepository, VoteRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{ApprovalSource, Decision, ExternalDocId};

    struct Fixture {
        pool: DynDatabasePool,
        repo: SqlxRequestRepository,
        doc: DocumentId,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let doc = SqlxDocumentRepository::new(pool.clone())
            .create(&ExternalDocId::new("ext-7"), "doc7.pdf")
            .await
            .expect("Failed to create document");
        Fixture {
            repo: SqlxRequestRepository::new(pool.clone()),
            pool,
            doc: doc.id,
        }
    }

    fn input(doc: DocumentId, tag: &str, user: &str) -> CreateRequestInput {
        CreateRequestInput {
            document_id: doc,
            tag_name: tag.to_string(),
            tag_category: "Series".to_string(),
            user_id: user.to_string(),
        }
    }

    fn accept(votes: VoteTally) -> Resolution {
        Resolution::Accept {
            decision: Decision::community("system", votes),
            category_override: None,
        }
    }

    #[tokio::test]
    async fn test_create_suggestion_writes_overlay_and_vote() {
        let f = setup().await;

        let submission = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap();
        assert!(submission.is_created());

        let votes = SqlxVoteRepository::new(f.pool.clone())
            .list_for_target(VoteTarget::Suggestion(submission.id()))
            .await
            .unwrap();
        assert_eq!(votes.len(), 1);
        assert!(votes[0].in_favor);
        assert_eq!(votes[0].user_id, "alice");

        let overrides = SqlxOverlayRepository::new(f.pool.clone())
            .list_for_user_document("alice", f.doc)
            .await
            .unwrap();
        assert_eq!(overrides.len(), 1);
        assert!(overrides[0].is_added);
    }

    #[tokio::test]
    async fn test_duplicate_submission_returns_existing() {
        let f = setup().await;

        let first = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap();
        let second = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "bob"))
            .await
            .unwrap();

        assert_eq!(second, Submission::Existing(first.id()));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tag_suggestions")
            .fetch_one(f.pool.sqlite())
            .await
            .unwrap();
        assert_eq!(count, 1);
        // The duplicate submitter gets neither an overlay row nor a vote
        let bob_overrides = SqlxOverlayRepository::new(f.pool.clone())
            .list_for_user("bob")
            .await
            .unwrap();
        assert!(bob_overrides.is_empty());
    }

    #[tokio::test]
    async fn test_pending_list_orders_by_vote_count() {
        let f = setup().await;
        let votes = SqlxVoteRepository::new(f.pool.clone());

        let quiet = f.repo.create_suggestion(&input(f.doc, "A", "u1")).await.unwrap();
        let busy = f.repo.create_suggestion(&input(f.doc, "B", "u1")).await.unwrap();
        votes
            .upsert(VoteTarget::Suggestion(busy.id()), "u2", true)
            .await
            .unwrap();
        votes
            .upsert(VoteTarget::Suggestion(busy.id()), "u3", false)
            .await
            .unwrap();

        let pending = f.repo.list_pending_suggestions(None).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].suggestion.id, busy.id());
        assert_eq!(pending[0].tally, VoteTally::new(2.0, 1.0, 3));
        assert_eq!(pending[0].document_name, "doc7.pdf");
        assert_eq!(pending[1].suggestion.id, quiet.id());
    }

    #[tokio::test]
    async fn test_pending_list_filters_by_document() {
        let f = setup().await;
        let other = SqlxDocumentRepository::new(f.pool.clone())
            .create(&ExternalDocId::new("ext-8"), "doc8.pdf")
            .await
            .unwrap();

        f.repo.create_suggestion(&input(f.doc, "A", "u1")).await.unwrap();
        f.repo.create_suggestion(&input(other.id, "B", "u1")).await.unwrap();

        let pending = f.repo.list_pending_suggestions(Some(other.id)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].suggestion.tag_name, "B");
    }

    #[tokio::test]
    async fn test_accept_suggestion() {
        let f = setup().await;
        let id = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap()
            .id();

        let outcome = f
            .repo
            .resolve_suggestion(id, &accept(VoteTally::new(1.0, 0.0, 1)))
            .await
            .unwrap();

        let rule = match outcome {
            ResolveOutcome::Resolved { rule: Some(rule) } => rule,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(rule.rule_type, RuleType::Add);
        assert_eq!(rule.approval_source, ApprovalSource::CommunityVote);
        assert_eq!(rule.external_doc_id, ExternalDocId::new("ext-7"));
        assert_eq!(rule.votes_in_favor, 1.0);
        assert_eq!(rule.total_votes, 1.0);
        assert_eq!(rule.times_applied, 1);

        let suggestion = f.repo.get_suggestion(id).await.unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Applied);
        assert!(suggestion.applied_at.is_some());

        let tags = SqlxDocumentTagRepository::new(f.pool.clone());
        assert!(tags.find(f.doc, "Naruto", "Series").await.unwrap().is_some());

        let overlay = SqlxOverlayRepository::new(f.pool.clone());
        assert_eq!(
            overlay.count_for_key(f.doc, "Naruto", "Series", true).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_accept_with_category_override() {
        let f = setup().await;
        let id = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap()
            .id();

        let resolution = Resolution::Accept {
            decision: Decision::admin("root", VoteTally::new(1.0, 0.0, 1)),
            category_override: Some("Franchise".to_string()),
        };
        f.repo.resolve_suggestion(id, &resolution).await.unwrap();

        let tags = SqlxDocumentTagRepository::new(f.pool.clone());
        assert!(tags.find(f.doc, "Naruto", "Franchise").await.unwrap().is_some());
        assert!(tags.find(f.doc, "Naruto", "Series").await.unwrap().is_none());

        let rules = SqlxRuleRepository::new(f.pool.clone()).list(false).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].tag_category, "Franchise");
        assert_eq!(rules[0].approval_source, ApprovalSource::AdminApproval);

        let overlay = SqlxOverlayRepository::new(f.pool.clone());
        assert_eq!(
            overlay.count_for_key(f.doc, "Naruto", "Series", true).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_reject_suggestion_appends_no_rule() {
        let f = setup().await;
        let id = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap()
            .id();

        let outcome = f
            .repo
            .resolve_suggestion(
                id,
                &Resolution::Reject {
                    actor: "root".to_string(),
                    reason: Some("wrong series".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Resolved { rule: None });

        let suggestion = f.repo.get_suggestion(id).await.unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Rejected);
        assert_eq!(suggestion.rejection_reason.as_deref(), Some("wrong series"));
        assert_eq!(suggestion.resolved_by.as_deref(), Some("root"));

        assert!(SqlxRuleRepository::new(f.pool.clone())
            .list(false)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_resolve_twice_reports_already_resolved() {
        let f = setup().await;
        let id = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap()
            .id();

        f.repo
            .resolve_suggestion(id, &accept(VoteTally::new(1.0, 0.0, 1)))
            .await
            .unwrap();
        let second = f
            .repo
            .resolve_suggestion(id, &accept(VoteTally::new(1.0, 0.0, 1)))
            .await
            .unwrap();
        assert_eq!(second, ResolveOutcome::AlreadyResolved);

        let rules = SqlxRuleRepository::new(f.pool.clone()).list(false).await.unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_on_stale_votes_writes_nothing() {
        let f = setup().await;
        let id = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap()
            .id();
        SqlxVoteRepository::new(f.pool.clone())
            .upsert(VoteTarget::Suggestion(id), "bob", false)
            .await
            .unwrap();

        // decided before bob's vote landed
        let outcome = f
            .repo
            .resolve_suggestion(id, &accept(VoteTally::new(1.0, 0.0, 1)))
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::VotesChanged(VoteTally::new(1.0, 1.0, 2)));

        let suggestion = f.repo.get_suggestion(id).await.unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
        assert!(suggestion.resolved_by.is_none());
        assert!(SqlxDocumentTagRepository::new(f.pool.clone())
            .find(f.doc, "Naruto", "Series")
            .await
            .unwrap()
            .is_none());
        assert!(SqlxRuleRepository::new(f.pool.clone())
            .list(false)
            .await
            .unwrap()
            .is_empty());
        let overlay = SqlxOverlayRepository::new(f.pool.clone());
        assert_eq!(
            overlay.count_for_key(f.doc, "Naruto", "Series", true).await.unwrap(),
            1
        );

        // re-deciding on the current votes goes through
        let outcome = f
            .repo
            .resolve_suggestion(id, &accept(VoteTally::new(1.0, 1.0, 2)))
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Resolved { rule: Some(_) }));
    }

    #[tokio::test]
    async fn test_reject_ignores_vote_changes() {
        let f = setup().await;
        let tags = SqlxDocumentTagRepository::new(f.pool.clone());
        tags.insert(f.doc, "Naruto", "Series").await.unwrap();
        let tag = tags.find(f.doc, "Naruto", "Series").await.unwrap().unwrap();
        let id = f
            .repo
            .create_removal(&input(f.doc, "Naruto", "alice"), tag.id)
            .await
            .unwrap()
            .id();
        SqlxVoteRepository::new(f.pool.clone())
            .upsert(VoteTarget::Removal(id), "bob", true)
            .await
            .unwrap();

        let outcome = f
            .repo
            .resolve_removal(
                id,
                &Resolution::Reject {
                    actor: "root".to_string(),
                    reason: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::Resolved { rule: None });
    }

    #[tokio::test]
    async fn test_resolve_missing_request() {
        let f = setup().await;
        let outcome = f
            .repo
            .resolve_removal(99, &accept(VoteTally::default()))
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_accept_removal_clears_tag_and_reference() {
        let f = setup().await;
        let tags = SqlxDocumentTagRepository::new(f.pool.clone());
        tags.insert(f.doc, "Filler", "Series").await.unwrap();
        let tag = tags.find(f.doc, "Filler", "Series").await.unwrap().unwrap();

        let id = f
            .repo
            .create_removal(&input(f.doc, "Filler", "alice"), tag.id)
            .await
            .unwrap()
            .id();
        let overlay = SqlxOverlayRepository::new(f.pool.clone());
        assert_eq!(
            overlay.count_for_key(f.doc, "Filler", "Series", false).await.unwrap(),
            1
        );

        let outcome = f
            .repo
            .resolve_removal(id, &accept(VoteTally::new(1.0, 0.0, 1)))
            .await
            .unwrap();
        match outcome {
            ResolveOutcome::Resolved { rule: Some(rule) } => {
                assert_eq!(rule.rule_type, RuleType::Remove)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert!(tags.find(f.doc, "Filler", "Series").await.unwrap().is_none());
        let request = f.repo.get_removal(id).await.unwrap().unwrap();
        assert_eq!(request.status, RemovalStatus::Removed);
        assert!(request.document_tag_id.is_none());
        assert!(request.removed_at.is_some());
        assert_eq!(
            overlay.count_for_key(f.doc, "Filler", "Series", false).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_reject_removal_keeps_tag() {
        let f = setup().await;
        let tags = SqlxDocumentTagRepository::new(f.pool.clone());
        tags.insert(f.doc, "Naruto", "Series").await.unwrap();
        let tag = tags.find(f.doc, "Naruto", "Series").await.unwrap().unwrap();

        let id = f
            .repo
            .create_removal(&input(f.doc, "Naruto", "alice"), tag.id)
            .await
            .unwrap()
            .id();
        f.repo
            .resolve_removal(
                id,
                &Resolution::Reject {
                    actor: "root".to_string(),
                    reason: None,
                },
            )
            .await
            .unwrap();

        assert!(tags.find(f.doc, "Naruto", "Series").await.unwrap().is_some());
        let request = f.repo.get_removal(id).await.unwrap().unwrap();
        assert_eq!(request.status, RemovalStatus::Rejected);
        assert_eq!(request.document_tag_id, Some(tag.id));
    }

    #[tokio::test]
    async fn test_new_request_allowed_after_resolution() {
        let f = setup().await;
        let first = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "alice"))
            .await
            .unwrap();
        f.repo
            .resolve_suggestion(
                first.id(),
                &Resolution::Reject {
                    actor: "root".to_string(),
                    reason: None,
                },
            )
            .await
            .unwrap();

        let second = f
            .repo
            .create_suggestion(&input(f.doc, "Naruto", "bob"))
            .await
            .unwrap();
        assert!(second.is_created());
        assert_ne!(second.id(), first.id());
    }
}
