//! Vote repository
//!
//! One vote row per (user, target). Casting again overwrites the row in place
//! through `INSERT ... ON CONFLICT DO UPDATE`, so concurrent casts from the same
//! user settle on the last write. The insert is guarded by the target's
//! Pending status, which makes it the first statement of every vote
//! transaction.

use crate::db::DynDatabasePool;
use crate::models::{Vote, VoteTally, VoteTarget, DEFAULT_VOTE_WEIGHT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};
use std::sync::Arc;

/// Outcome of a vote upsert
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VoteUpsert {
    /// The vote was stored; carries the tally after the write
    Recorded(VoteTally),
    /// No request with that id
    TargetNotFound,
    /// The request is no longer Pending
    TargetResolved,
}

/// Vote repository trait
#[async_trait]
pub trait VoteRepository: Send + Sync {
    /// Insert or overwrite a user's vote on a pending target
    async fn upsert(&self, target: VoteTarget, user_id: &str, in_favor: bool)
        -> Result<VoteUpsert>;

    /// Weighted tally for a target
    async fn tally(&self, target: VoteTarget) -> Result<VoteTally>;

    /// All votes on a target, oldest first
    async fn list_for_target(&self, target: VoteTarget) -> Result<Vec<Vote>>;
}

/// SQLx-based vote repository implementation
pub struct SqlxVoteRepository {
    pool: DynDatabasePool,
}

impl SqlxVoteRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VoteRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VoteRepository for SqlxVoteRepository {
    async fn upsert(
        &self,
        target: VoteTarget,
        user_id: &str,
        in_favor: bool,
    ) -> Result<VoteUpsert> {
        let mut tx = self
            .pool
            .sqlite()
            .begin()
            .await
            .context("Failed to begin vote transaction")?;

        // Write first: SQLite will not wait to upgrade a read lock, so a
        // transaction that reads before writing fails under contention.
        if !upsert_vote_tx(&mut tx, target, user_id, in_favor).await? {
            let (table, _) = target_columns(target);
            let status: Option<String> =
                sqlx::query_scalar(&format!("SELECT status FROM {} WHERE id = ?", table))
                    .bind(target.id())
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to load vote target")?;

            return Ok(match status {
                None => VoteUpsert::TargetNotFound,
                Some(_) => VoteUpsert::TargetResolved,
            });
        }

        let tally = tally_tx(&mut tx, target).await?;

        tx.commit().await.context("Failed to commit vote")?;
        Ok(VoteUpsert::Recorded(tally))
    }

    async fn tally(&self, target: VoteTarget) -> Result<VoteTally> {
        let (_, column) = target_columns(target);
        let row = sqlx::query(&format!("{} WHERE {} = ?", TALLY_SELECT, column))
            .bind(target.id())
            .fetch_one(self.pool.sqlite())
            .await
            .with_context(|| format!("Failed to tally votes for {}", target))?;

        Ok(row_to_tally(&row))
    }

    async fn list_for_target(&self, target: VoteTarget) -> Result<Vec<Vote>> {
        let (_, column) = target_columns(target);
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, user_id, in_favor, weight, created_at
            FROM tag_votes
            WHERE {} = ?
            ORDER BY created_at, id
            "#,
            column
        ))
        .bind(target.id())
        .fetch_all(self.pool.sqlite())
        .await
        .context("Failed to list votes")?;

        Ok(rows
            .iter()
            .map(|row| Vote {
                id: row.get("id"),
                target,
                user_id: row.get("user_id"),
                in_favor: row.get("in_favor"),
                weight: row.get("weight"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

/// Weighted sums and row count over `tag_votes`
const TALLY_SELECT: &str = r#"
    SELECT
        CAST(COALESCE(SUM(CASE WHEN in_favor = 1 THEN weight ELSE 0.0 END), 0.0) AS REAL) AS favor_weight,
        CAST(COALESCE(SUM(CASE WHEN in_favor = 0 THEN weight ELSE 0.0 END), 0.0) AS REAL) AS against_weight,
        COUNT(*) AS vote_count
    FROM tag_votes
"#;

/// Request table and vote foreign-key column for a target
fn target_columns(target: VoteTarget) -> (&'static str, &'static str) {
    match target {
        VoteTarget::Suggestion(_) => ("tag_suggestions", "suggestion_id"),
        VoteTarget::Removal(_) => ("tag_removal_requests", "removal_request_id"),
    }
}

/// Insert or overwrite a vote within a transaction.
///
/// The write only happens while the target is Pending. Returns `false` when
/// nothing was written because the target is missing or resolved.
pub(crate) async fn upsert_vote_tx(
    tx: &mut Transaction<'_, Sqlite>,
    target: VoteTarget,
    user_id: &str,
    in_favor: bool,
) -> Result<bool> {
    let (table, column) = target_columns(target);
    let sql = format!(
        r#"
        INSERT INTO tag_votes ({column}, user_id, in_favor, weight, created_at)
        SELECT ?, ?, ?, ?, ?
        WHERE EXISTS (SELECT 1 FROM {table} WHERE id = ? AND status = 'Pending')
        ON CONFLICT(user_id, {column}) DO UPDATE SET
            in_favor = excluded.in_favor,
            weight = excluded.weight,
            created_at = excluded.created_at
        "#,
        column = column,
        table = table
    );

    let result = sqlx::query(&sql)
        .bind(target.id())
        .bind(user_id)
        .bind(in_favor)
        .bind(DEFAULT_VOTE_WEIGHT)
        .bind(Utc::now())
        .bind(target.id())
        .execute(&mut **tx)
        .await
        .with_context(|| format!("Failed to record vote on {}", target))?;

    Ok(result.rows_affected() > 0)
}

/// Weighted tally for a target within a transaction
pub(crate) async fn tally_tx(
    tx: &mut Transaction<'_, Sqlite>,
    target: VoteTarget,
) -> Result<VoteTally> {
    let (_, column) = target_columns(target);
    let row = sqlx::query(&format!("{} WHERE {} = ?", TALLY_SELECT, column))
        .bind(target.id())
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("Failed to tally votes for {}", target))?;

    Ok(row_to_tally(&row))
}

fn row_to_tally(row: &sqlx::sqlite::SqliteRow) -> VoteTally {
    VoteTally::new(
        row.get("favor_weight"),
        row.get("against_weight"),
        row.get("vote_count"),
    )
}
