//! Voting configuration service
//!
//! The stored configuration is a singleton. On first read it is seeded from
//! the defaults given in `config.yml`.

use crate::db::repositories::VotingConfigRepository;
use crate::models::{StoredVotingConfig, VotingConfig};
use std::sync::Arc;

use super::error::{require_non_blank, GovernanceError};

/// Name recorded when the service writes the seed row
const SEED_AUTHOR: &str = "system";

/// Voting configuration service
pub struct VotingConfigService {
    repo: Arc<dyn VotingConfigRepository>,
    defaults: VotingConfig,
}

impl VotingConfigService {
    pub fn new(repo: Arc<dyn VotingConfigRepository>, defaults: VotingConfig) -> Self {
        Self { repo, defaults }
    }

    /// Get the stored configuration, writing the defaults if none exists
    pub async fn get(&self) -> Result<StoredVotingConfig, GovernanceError> {
        if let Some(stored) = self.repo.get().await? {
            return Ok(stored);
        }

        tracing::info!("No voting config stored, seeding defaults");
        Ok(self.repo.save(&self.defaults, SEED_AUTHOR).await?)
    }

    /// Just the configuration value, for evaluators
    pub async fn current(&self) -> Result<VotingConfig, GovernanceError> {
        Ok(self.get().await?.config)
    }

    /// Replace the stored configuration
    pub async fn update(
        &self,
        config: VotingConfig,
        modified_by: &str,
    ) -> Result<StoredVotingConfig, GovernanceError> {
        require_non_blank(modified_by, "modified_by")?;
        config.validate().map_err(GovernanceError::InvalidInput)?;

        let stored = self.repo.save(&config, modified_by.trim()).await?;
        tracing::info!(
            modified_by = %stored.modified_by,
            min_votes = config.min_votes,
            required_agreement_pct = config.required_agreement_pct,
            auto_apply_enabled = config.auto_apply_enabled,
            "Voting config updated"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxVotingConfigRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service(defaults: VotingConfig) -> VotingConfigService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        VotingConfigService::new(SqlxVotingConfigRepository::boxed(pool), defaults)
    }

    #[tokio::test]
    async fn test_get_seeds_defaults() {
        let defaults = VotingConfig {
            min_votes: 12,
            ..VotingConfig::default()
        };
        let service = setup_test_service(defaults.clone()).await;

        let stored = service.get().await.unwrap();
        assert_eq!(stored.config, defaults);
        assert_eq!(stored.modified_by, "system");
    }

    #[tokio::test]
    async fn test_update_replaces_stored_config() {
        let service = setup_test_service(VotingConfig::default()).await;
        service.get().await.unwrap();

        let config = VotingConfig {
            min_votes: 5,
            auto_apply_enabled: false,
            ..VotingConfig::default()
        };
        let stored = service.update(config.clone(), " root ").await.unwrap();
        assert_eq!(stored.modified_by, "root");

        assert_eq!(service.current().await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config() {
        let service = setup_test_service(VotingConfig::default()).await;

        let config = VotingConfig {
            min_votes: 0,
            ..VotingConfig::default()
        };
        let err = service.update(config, "root").await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidInput(_)));

        let config = VotingConfig {
            required_agreement_pct: 120.0,
            ..VotingConfig::default()
        };
        let err = service.update(config, "root").await.unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidInput(_)));

        // nothing was written
        assert_eq!(service.current().await.unwrap(), VotingConfig::default());
    }

    #[tokio::test]
    async fn test_update_requires_author() {
        let service = setup_test_service(VotingConfig::default()).await;
        let err = service
            .update(VotingConfig::default(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::InvalidInput(_)));
    }
}
