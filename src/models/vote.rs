//! Vote model
//!
//! A vote always targets exactly one request. The target is a tagged union
//! rather than two nullable ids, so "both" and "neither" cannot be expressed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight given to a freshly cast (or recast) vote
pub const DEFAULT_VOTE_WEIGHT: f64 = 1.0;

/// The request a vote is cast on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum VoteTarget {
    /// A tag suggestion
    Suggestion(i64),
    /// A tag removal request
    Removal(i64),
}

impl VoteTarget {
    /// Id of the targeted request
    pub fn id(&self) -> i64 {
        match self {
            VoteTarget::Suggestion(id) | VoteTarget::Removal(id) => *id,
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteTarget::Suggestion(id) => write!(f, "suggestion #{}", id),
            VoteTarget::Removal(id) => write!(f, "removal #{}", id),
        }
    }
}

/// Vote entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: i64,
    pub target: VoteTarget,
    pub user_id: String,
    pub in_favor: bool,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

/// Weighted aggregate of the votes on one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    /// Sum of weights of votes in favor
    pub favor_weight: f64,
    /// Sum of weights of votes against
    pub against_weight: f64,
    /// Number of vote rows (informational only, never used for thresholds)
    pub vote_count: i64,
}

impl VoteTally {
    pub fn new(favor_weight: f64, against_weight: f64, vote_count: i64) -> Self {
        Self {
            favor_weight,
            against_weight,
            vote_count,
        }
    }

    /// Total weight of all votes
    pub fn total_weight(&self) -> f64 {
        self.favor_weight + self.against_weight
    }

    /// Same votes, allowing for float summation error in the weights
    pub fn matches(&self, other: &VoteTally) -> bool {
        const EPSILON: f64 = 1e-9;
        self.vote_count == other.vote_count
            && (self.favor_weight - other.favor_weight).abs() < EPSILON
            && (self.against_weight - other.against_weight).abs() < EPSILON
    }

    /// Percentage (0-100) of the total weight that is in favor.
    ///
    /// Zero when there is no weight at all.
    pub fn agreement_pct(&self) -> f64 {
        let total = self.total_weight();
        if total > 0.0 {
            self.favor_weight / total * 100.0
        } else {
            0.0
        }
    }
}

/// Vote statistics returned to a voter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoteStats {
    pub favor_weight: f64,
    pub against_weight: f64,
    pub total_weight: f64,
    pub agreement_pct: f64,
    pub vote_count: i64,
}

impl From<VoteTally> for VoteStats {
    fn from(tally: VoteTally) -> Self {
        Self {
            favor_weight: tally.favor_weight,
            against_weight: tally.against_weight,
            total_weight: tally.total_weight(),
            agreement_pct: tally.agreement_pct(),
            vote_count: tally.vote_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_matches() {
        let tally = VoteTally::new(0.1 + 0.2, 1.0, 3);
        assert!(tally.matches(&VoteTally::new(0.3, 1.0, 3)));
        assert!(!tally.matches(&VoteTally::new(0.3, 1.0, 4)));
        assert!(!tally.matches(&VoteTally::new(1.3, 0.0, 3)));
    }

    #[test]
    fn test_tally_agreement() {
        let tally = VoteTally::new(40.0, 10.0, 50);
        assert_eq!(tally.total_weight(), 50.0);
        assert!((tally.agreement_pct() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_tally_has_zero_agreement() {
        let tally = VoteTally::default();
        assert_eq!(tally.total_weight(), 0.0);
        assert_eq!(tally.agreement_pct(), 0.0);
    }

    #[test]
    fn test_stats_from_tally() {
        let stats = VoteStats::from(VoteTally::new(30.0, 25.0, 55));
        assert_eq!(stats.total_weight, 55.0);
        assert!((stats.agreement_pct - 54.545454).abs() < 1e-4);
    }

    #[test]
    fn test_vote_target_serializes_tagged() {
        let json = serde_json::to_string(&VoteTarget::Removal(3)).unwrap();
        assert_eq!(json, r#"{"kind":"removal","id":3}"#);
        let parsed: VoteTarget = serde_json::from_str(r#"{"kind":"suggestion","id":9}"#).unwrap();
        assert_eq!(parsed, VoteTarget::Suggestion(9));
    }

    #[test]
    fn test_vote_target_display() {
        assert_eq!(VoteTarget::Suggestion(4).to_string(), "suggestion #4");
        assert_eq!(VoteTarget::Removal(4).id(), 4);
    }
}
