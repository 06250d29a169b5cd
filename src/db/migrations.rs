//! Database migrations module
//!
//! Code-based migrations for the tag governance store. All migrations are
//! embedded in the binary as SQL strings and tracked in a `_migrations` table.
//!
//! # Usage
//!
//! ```ignore
//! use tagvote::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! The `documents` and `document_tags` tables mirror the external tag corpus.
//! Everything else belongs to the governance engine.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::DynDatabasePool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements to apply
    pub up_sql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_documents_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_document_tags_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS document_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                tag_name TEXT NOT NULL,
                tag_category TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_document_tags_unique
                ON document_tags(document_id, tag_name, tag_category);
        "#,
    },
    Migration {
        version: 3,
        name: "create_tag_suggestions_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS tag_suggestions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                tag_name TEXT NOT NULL,
                tag_category TEXT NOT NULL,
                suggested_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending'
                    CHECK (status IN ('Pending', 'Applied', 'Rejected')),
                applied_at TEXT,
                resolved_by TEXT,
                rejection_reason TEXT,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_tag_suggestions_status ON tag_suggestions(status);
            CREATE INDEX IF NOT EXISTS idx_tag_suggestions_document ON tag_suggestions(document_id);
            -- At most one open suggestion per document tag
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_suggestions_one_pending
                ON tag_suggestions(document_id, tag_name, tag_category)
                WHERE status = 'Pending';
        "#,
    },
    Migration {
        version: 4,
        name: "create_tag_removal_requests_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS tag_removal_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                document_tag_id INTEGER,
                tag_name TEXT NOT NULL,
                tag_category TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'Pending'
                    CHECK (status IN ('Pending', 'Removed', 'Rejected')),
                removed_at TEXT,
                resolved_by TEXT,
                rejection_reason TEXT,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
                FOREIGN KEY (document_tag_id) REFERENCES document_tags(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tag_removal_requests_status ON tag_removal_requests(status);
            CREATE INDEX IF NOT EXISTS idx_tag_removal_requests_document ON tag_removal_requests(document_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_removal_requests_one_pending
                ON tag_removal_requests(document_id, tag_name, tag_category)
                WHERE status = 'Pending';
        "#,
    },
    Migration {
        version: 5,
        name: "create_tag_votes_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS tag_votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                suggestion_id INTEGER,
                removal_request_id INTEGER,
                user_id TEXT NOT NULL,
                in_favor INTEGER NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0 CHECK (weight >= 0),
                created_at TEXT NOT NULL,
                CHECK ((suggestion_id IS NULL) <> (removal_request_id IS NULL)),
                FOREIGN KEY (suggestion_id) REFERENCES tag_suggestions(id) ON DELETE CASCADE,
                FOREIGN KEY (removal_request_id) REFERENCES tag_removal_requests(id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_votes_user_suggestion
                ON tag_votes(user_id, suggestion_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tag_votes_user_removal
                ON tag_votes(user_id, removal_request_id);
            CREATE INDEX IF NOT EXISTS idx_tag_votes_suggestion ON tag_votes(suggestion_id);
            CREATE INDEX IF NOT EXISTS idx_tag_votes_removal ON tag_votes(removal_request_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_user_tag_overrides_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS user_tag_overrides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                document_id INTEGER NOT NULL,
                tag_name TEXT NOT NULL,
                tag_category TEXT NOT NULL,
                is_added INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_user_tag_overrides_unique
                ON user_tag_overrides(user_id, document_id, tag_name, tag_category);
            CREATE INDEX IF NOT EXISTS idx_user_tag_overrides_document
                ON user_tag_overrides(document_id, tag_name, tag_category);
        "#,
    },
    Migration {
        version: 7,
        name: "create_voting_config_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS voting_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                min_votes INTEGER NOT NULL,
                required_agreement_pct REAL NOT NULL,
                scale_by_popularity INTEGER NOT NULL,
                popularity_scale_factor REAL NOT NULL,
                max_votes_required INTEGER NOT NULL,
                decay_start_days INTEGER NOT NULL,
                decay_rate_per_day REAL NOT NULL,
                auto_apply_enabled INTEGER NOT NULL,
                last_modified TEXT NOT NULL,
                modified_by TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 8,
        name: "create_document_view_counts_table",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS document_view_counts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL UNIQUE,
                view_count INTEGER NOT NULL DEFAULT 0,
                unique_view_count INTEGER NOT NULL DEFAULT 0,
                last_viewed TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 9,
        name: "create_approved_tag_rules_table",
        up_sql: r#"
            -- Keyed by external id so rules outlive document row replacement
            CREATE TABLE IF NOT EXISTS approved_tag_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_doc_id TEXT NOT NULL,
                document_name TEXT NOT NULL,
                tag_name TEXT NOT NULL,
                tag_category TEXT NOT NULL,
                rule_type TEXT NOT NULL CHECK (rule_type IN ('Add', 'Remove')),
                approval_source TEXT NOT NULL
                    CHECK (approval_source IN ('CommunityVote', 'AdminApproval', 'ManualOverride')),
                approved_by TEXT NOT NULL,
                source_request_id INTEGER,
                votes_in_favor REAL NOT NULL DEFAULT 0,
                total_votes REAL NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_applied_at TEXT,
                times_applied INTEGER NOT NULL DEFAULT 0,
                notes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_approved_tag_rules_external
                ON approved_tag_rules(external_doc_id);
            CREATE INDEX IF NOT EXISTS idx_approved_tag_rules_key
                ON approved_tag_rules(external_doc_id, tag_name, tag_category, rule_type);
            CREATE INDEX IF NOT EXISTS idx_approved_tag_rules_active
                ON approved_tag_rules(is_active);
        "#,
    },
];

/// Run all pending migrations
///
/// # Returns
///
/// Number of migrations applied
///
/// # Errors
///
/// Returns an error if any migration fails to apply
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool.sqlite()).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool.sqlite(), migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL
        )
        "#,
    )
    .await?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }

    Ok(records)
}

/// Apply a single migration and record it, atomically
async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin migration")?;

    for statement in split_sql_statements(migration.up_sql) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

    tx.commit().await.context("Failed to commit migration")?;
    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut current_start = 0;
    let mut in_statement = false;

    for (i, c) in sql.char_indices() {
        match c {
            ';' => {
                if in_statement {
                    let stmt = sql[current_start..i].trim();
                    if !stmt.is_empty() && !is_comment_only(stmt) {
                        statements.push(stmt);
                    }
                    in_statement = false;
                }
                current_start = i + 1;
            }
            _ if !c.is_whitespace() && !in_statement => {
                current_start = i;
                in_statement = true;
            }
            _ => {}
        }
    }

    if in_statement {
        let stmt = sql[current_start..].trim();
        if !stmt.is_empty() && !is_comment_only(stmt) {
            statements.push(stmt);
        }
    }

    statements
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool.sqlite()).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}
