//! Voting configuration
//!
//! `VotingConfig` is a plain value object. It is read once at the start of an
//! evaluation and passed down explicitly; nothing holds it in global state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Thresholds and switches for community voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Minimum total vote weight required
    #[serde(default = "default_min_votes")]
    pub min_votes: i64,
    /// Percentage (0-100) of the weight that must be in favor
    #[serde(default = "default_required_agreement_pct")]
    pub required_agreement_pct: f64,
    /// Raise the minimum for frequently viewed documents
    #[serde(default = "default_scale_by_popularity")]
    pub scale_by_popularity: bool,
    /// Required votes per view when scaling (0.05 = 5% of views)
    #[serde(default = "default_popularity_scale_factor")]
    pub popularity_scale_factor: f64,
    /// Ceiling for the scaled requirement
    #[serde(default = "default_max_votes_required")]
    pub max_votes_required: i64,
    /// Reserved: days before a vote would start to lose weight
    #[serde(default = "default_decay_start_days")]
    pub decay_start_days: i64,
    /// Reserved: weight lost per day after the decay start
    #[serde(default = "default_decay_rate_per_day")]
    pub decay_rate_per_day: f64,
    /// Whether the sweep may resolve requests
    #[serde(default = "default_auto_apply_enabled")]
    pub auto_apply_enabled: bool,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            min_votes: default_min_votes(),
            required_agreement_pct: default_required_agreement_pct(),
            scale_by_popularity: default_scale_by_popularity(),
            popularity_scale_factor: default_popularity_scale_factor(),
            max_votes_required: default_max_votes_required(),
            decay_start_days: default_decay_start_days(),
            decay_rate_per_day: default_decay_rate_per_day(),
            auto_apply_enabled: default_auto_apply_enabled(),
        }
    }
}

fn default_min_votes() -> i64 {
    50
}

fn default_required_agreement_pct() -> f64 {
    70.0
}

fn default_scale_by_popularity() -> bool {
    true
}

fn default_popularity_scale_factor() -> f64 {
    0.05
}

fn default_max_votes_required() -> i64 {
    200
}

fn default_decay_start_days() -> i64 {
    90
}

fn default_decay_rate_per_day() -> f64 {
    0.01
}

fn default_auto_apply_enabled() -> bool {
    true
}

impl VotingConfig {
    /// Check the configuration for values the evaluator cannot work with.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_votes < 1 {
            return Err("min_votes must be at least 1".to_string());
        }
        if self.max_votes_required < self.min_votes {
            return Err("max_votes_required must not be lower than min_votes".to_string());
        }
        if !(0.0..=100.0).contains(&self.required_agreement_pct) {
            return Err("required_agreement_pct must be between 0 and 100".to_string());
        }
        if !self.popularity_scale_factor.is_finite() || self.popularity_scale_factor < 0.0 {
            return Err("popularity_scale_factor must be a non-negative number".to_string());
        }
        if self.decay_start_days < 0 {
            return Err("decay_start_days must not be negative".to_string());
        }
        if !self.decay_rate_per_day.is_finite() || self.decay_rate_per_day < 0.0 {
            return Err("decay_rate_per_day must be a non-negative number".to_string());
        }
        Ok(())
    }
}

/// The persisted singleton with its audit fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVotingConfig {
    #[serde(flatten)]
    pub config: VotingConfig,
    pub last_modified: DateTime<Utc>,
    pub modified_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VotingConfig::default();
        assert_eq!(config.min_votes, 50);
        assert_eq!(config.required_agreement_pct, 70.0);
        assert!(config.scale_by_popularity);
        assert_eq!(config.popularity_scale_factor, 0.05);
        assert_eq!(config.max_votes_required, 200);
        assert_eq!(config.decay_start_days, 90);
        assert_eq!(config.decay_rate_per_day, 0.01);
        assert!(config.auto_apply_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: VotingConfig = serde_yaml::from_str("min_votes: 5\n").unwrap();
        assert_eq!(config.min_votes, 5);
        assert_eq!(config.max_votes_required, 200);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = VotingConfig {
            min_votes: 10,
            max_votes_required: 5,
            ..VotingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_agreement() {
        let config = VotingConfig {
            required_agreement_pct: 120.0,
            ..VotingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_factor() {
        let config = VotingConfig {
            popularity_scale_factor: -0.5,
            ..VotingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_minimum() {
        let config = VotingConfig {
            min_votes: 0,
            ..VotingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
