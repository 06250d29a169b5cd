//! Configuration management
//!
//! This module handles loading and parsing configuration for tagvote.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::models::VotingConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Voting defaults, used to seed the stored voting configuration
    #[serde(default)]
    pub voting: VotingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL (`:memory:` for an in-memory database)
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/tagvote.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - TAGVOTE_DATABASE_URL
    /// - TAGVOTE_DATABASE_MAX_CONNECTIONS
    /// - TAGVOTE_VOTING_MIN_VOTES
    /// - TAGVOTE_VOTING_REQUIRED_AGREEMENT_PCT
    /// - TAGVOTE_VOTING_SCALE_BY_POPULARITY
    /// - TAGVOTE_VOTING_POPULARITY_SCALE_FACTOR
    /// - TAGVOTE_VOTING_MAX_VOTES_REQUIRED
    /// - TAGVOTE_VOTING_AUTO_APPLY_ENABLED
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the voting defaults unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        self.voting
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("voting: {}", e)))
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TAGVOTE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(n) = env_parse::<u32>("TAGVOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = n;
        }

        if let Some(n) = env_parse::<i64>("TAGVOTE_VOTING_MIN_VOTES") {
            self.voting.min_votes = n;
        }
        if let Some(pct) = env_parse::<f64>("TAGVOTE_VOTING_REQUIRED_AGREEMENT_PCT") {
            self.voting.required_agreement_pct = pct;
        }
        if let Some(flag) = env_parse::<bool>("TAGVOTE_VOTING_SCALE_BY_POPULARITY") {
            self.voting.scale_by_popularity = flag;
        }
        if let Some(factor) = env_parse::<f64>("TAGVOTE_VOTING_POPULARITY_SCALE_FACTOR") {
            self.voting.popularity_scale_factor = factor;
        }
        if let Some(n) = env_parse::<i64>("TAGVOTE_VOTING_MAX_VOTES_REQUIRED") {
            self.voting.max_votes_required = n;
        }
        if let Some(flag) = env_parse::<bool>("TAGVOTE_VOTING_AUTO_APPLY_ENABLED") {
            self.voting.auto_apply_enabled = flag;
        }
    }
}

/// Read and parse an environment variable, ignoring unparsable values
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
