//! Approved tag rule model
//!
//! An `ApprovedTagRule` is the durable record of an accepted tag decision.
//! It is keyed by `ExternalDocId` so it can be replayed after the tag corpus
//! has been regenerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExternalDocId, VoteTally};

/// Direction of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    /// Ensure the tag is present
    Add,
    /// Ensure the tag is absent
    Remove,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Add => "Add",
            RuleType::Remove => "Remove",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Add" => Some(RuleType::Add),
            "Remove" => Some(RuleType::Remove),
            _ => None,
        }
    }
}

/// How a rule came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalSource {
    /// A request met the voting threshold during a sweep
    CommunityVote,
    /// An admin approved a request directly
    AdminApproval,
    /// An admin wrote the rule by hand, with no backing request
    ManualOverride,
}

impl ApprovalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalSource::CommunityVote => "CommunityVote",
            ApprovalSource::AdminApproval => "AdminApproval",
            ApprovalSource::ManualOverride => "ManualOverride",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CommunityVote" => Some(ApprovalSource::CommunityVote),
            "AdminApproval" => Some(ApprovalSource::AdminApproval),
            "ManualOverride" => Some(ApprovalSource::ManualOverride),
            _ => None,
        }
    }
}

/// Who accepted a request, and on what evidence.
///
/// Community and admin approvals both produce a `Decision`, so every rule in
/// the ledger carries the same shape regardless of the path that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub source: ApprovalSource,
    pub approver: String,
    /// Tally at the moment of approval
    pub votes: VoteTally,
}

impl Decision {
    pub fn community(approver: impl Into<String>, votes: VoteTally) -> Self {
        Self {
            source: ApprovalSource::CommunityVote,
            approver: approver.into(),
            votes,
        }
    }

    pub fn admin(approver: impl Into<String>, votes: VoteTally) -> Self {
        Self {
            source: ApprovalSource::AdminApproval,
            approver: approver.into(),
            votes,
        }
    }
}

/// Approved tag rule entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovedTagRule {
    pub id: i64,
    pub external_doc_id: ExternalDocId,
    /// Document name when the rule was created, for display only
    pub document_name: String,
    pub tag_name: String,
    pub tag_category: String,
    pub rule_type: RuleType,
    pub approval_source: ApprovalSource,
    pub approved_by: String,
    /// Suggestion or removal request the rule came from
    pub source_request_id: Option<i64>,
    pub votes_in_favor: f64,
    pub total_votes: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub times_applied: i64,
    pub notes: Option<String>,
}

/// Input for a hand-authored rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateManualRuleInput {
    pub external_doc_id: ExternalDocId,
    pub tag_name: String,
    pub tag_category: String,
    pub rule_type: RuleType,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A rule ready to be appended to the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub external_doc_id: ExternalDocId,
    pub document_name: String,
    pub tag_name: String,
    pub tag_category: String,
    pub rule_type: RuleType,
    pub approval_source: ApprovalSource,
    pub approved_by: String,
    pub source_request_id: Option<i64>,
    pub votes_in_favor: f64,
    pub total_votes: f64,
    pub notes: Option<String>,
    /// Whether the change was already applied to the corpus when recorded
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_type_roundtrip() {
        assert_eq!(RuleType::from_str(RuleType::Add.as_str()), Some(RuleType::Add));
        assert_eq!(
            RuleType::from_str(RuleType::Remove.as_str()),
            Some(RuleType::Remove)
        );
        assert_eq!(RuleType::from_str("add"), None);
    }

    #[test]
    fn test_approval_source_roundtrip() {
        for source in [
            ApprovalSource::CommunityVote,
            ApprovalSource::AdminApproval,
            ApprovalSource::ManualOverride,
        ] {
            assert_eq!(ApprovalSource::from_str(source.as_str()), Some(source));
        }
    }

    #[test]
    fn test_decision_constructors() {
        let votes = VoteTally::new(3.0, 1.0, 4);
        let community = Decision::community("alice", votes);
        assert_eq!(community.source, ApprovalSource::CommunityVote);
        let admin = Decision::admin("root", votes);
        assert_eq!(admin.source, ApprovalSource::AdminApproval);
        assert_eq!(admin.votes, votes);
    }
}
