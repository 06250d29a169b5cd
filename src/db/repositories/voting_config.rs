//! Voting configuration repository
//!
//! Stores the single `VotingConfig` row (id = 1) with its audit fields.

use crate::db::DynDatabasePool;
use crate::models::{StoredVotingConfig, VotingConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait VotingConfigRepository: Send + Sync {
    /// Get the stored configuration, if it has been written
    async fn get(&self) -> Result<Option<StoredVotingConfig>>;

    /// Insert or replace the stored configuration
    async fn save(&self, config: &VotingConfig, modified_by: &str) -> Result<StoredVotingConfig>;
}

/// SQLx-based voting config repository implementation
pub struct SqlxVotingConfigRepository {
    pool: DynDatabasePool,
}

impl SqlxVotingConfigRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn VotingConfigRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl VotingConfigRepository for SqlxVotingConfigRepository {
    async fn get(&self) -> Result<Option<StoredVotingConfig>> {
        let row = sqlx::query(
            r#"
            SELECT min_votes, required_agreement_pct, scale_by_popularity,
                   popularity_scale_factor, max_votes_required, decay_start_days,
                   decay_rate_per_day, auto_apply_enabled, last_modified, modified_by
            FROM voting_config
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to load voting config")?;

        Ok(row.map(|row| StoredVotingConfig {
            config: VotingConfig {
                min_votes: row.get("min_votes"),
                required_agreement_pct: row.get("required_agreement_pct"),
                scale_by_popularity: row.get("scale_by_popularity"),
                popularity_scale_factor: row.get("popularity_scale_factor"),
                max_votes_required: row.get("max_votes_required"),
                decay_start_days: row.get("decay_start_days"),
                decay_rate_per_day: row.get("decay_rate_per_day"),
                auto_apply_enabled: row.get("auto_apply_enabled"),
            },
            last_modified: row.get("last_modified"),
            modified_by: row.get("modified_by"),
        }))
    }

    async fn save(&self, config: &VotingConfig, modified_by: &str) -> Result<StoredVotingConfig> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO voting_config (
                id, min_votes, required_agreement_pct, scale_by_popularity,
                popularity_scale_factor, max_votes_required, decay_start_days,
                decay_rate_per_day, auto_apply_enabled, last_modified, modified_by
            )
            VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                min_votes = excluded.min_votes,
                required_agreement_pct = excluded.required_agreement_pct,
                scale_by_popularity = excluded.scale_by_popularity,
                popularity_scale_factor = excluded.popularity_scale_factor,
                max_votes_required = excluded.max_votes_required,
                decay_start_days = excluded.decay_start_days,
                decay_rate_per_day = excluded.decay_rate_per_day,
                auto_apply_enabled = excluded.auto_apply_enabled,
                last_modified = excluded.last_modified,
                modified_by = excluded.modified_by
            "#,
        )
        .bind(config.min_votes)
        .bind(config.required_agreement_pct)
        .bind(config.scale_by_popularity)
        .bind(config.popularity_scale_factor)
        .bind(config.max_votes_required)
        .bind(config.decay_start_days)
        .bind(config.decay_rate_per_day)
        .bind(config.auto_apply_enabled)
        .bind(now)
        .bind(modified_by)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to save voting config")?;

        Ok(StoredVotingConfig {
            config: config.clone(),
            last_modified: now,
            modified_by: modified_by.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxVotingConfigRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxVotingConfigRepository::new(pool)
    }

    #[tokio::test]
    async fn test_empty_store() {
        let repo = setup_test_repo().await;
        assert!(repo.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_overwrite() {
        let repo = setup_test_repo().await;

        repo.save(&VotingConfig::default(), "system").await.unwrap();
        let updated = VotingConfig {
            min_votes: 5,
            auto_apply_enabled: false,
            ..VotingConfig::default()
        };
        repo.save(&updated, "root").await.unwrap();

        let stored = repo.get().await.unwrap().unwrap();
        assert_eq!(stored.config, updated);
        assert_eq!(stored.modified_by, "root");
    }
}
