//! Threshold evaluator
//!
//! Pure functions deciding whether a request has enough weighted support.
//! The required total weight grows with document popularity when
//! `scale_by_popularity` is on, bounded by `min_votes` and
//! `max_votes_required`.

use serde::{Deserialize, Serialize};

use crate::models::{VoteTally, VotingConfig};

/// Outcome of evaluating one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdCheck {
    pub required_votes: i64,
    pub total_weight: f64,
    pub agreement_pct: f64,
    pub meets_threshold: bool,
}

/// Total vote weight a request needs for a document with `view_count` views.
///
/// The scaled value is truncated before clamping. The upper bound is applied
/// first, so a config with `min_votes > max_votes_required` yields `min_votes`.
pub fn required_votes(config: &VotingConfig, view_count: i64) -> i64 {
    if config.scale_by_popularity && view_count > 0 {
        let scaled = (view_count as f64 * config.popularity_scale_factor) as i64;
        scaled.min(config.max_votes_required).max(config.min_votes)
    } else {
        config.min_votes
    }
}

/// Evaluate a tally against the config
pub fn evaluate(config: &VotingConfig, tally: &VoteTally, view_count: i64) -> ThresholdCheck {
    let required = required_votes(config, view_count);
    let total_weight = tally.total_weight();
    let agreement_pct = tally.agreement_pct();

    ThresholdCheck {
        required_votes: required,
        total_weight,
        agreement_pct,
        meets_threshold: total_weight >= required as f64
            && agreement_pct >= config.required_agreement_pct,
    }
}
