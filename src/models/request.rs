//! Tag request models
//!
//! This module provides:
//! - `TagSuggestion` / `TagRemovalRequest` entities and their status enums
//! - `Submission` describing the result of an (idempotent) submit
//! - `Resolution` describing how a pending request is closed
//! - Pending summaries used by the moderation queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Decision, DocumentId, VoteTally};

/// Suggestion lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SuggestionStatus {
    /// Collecting votes
    #[default]
    Pending,
    /// Tag was added to the document
    Applied,
    /// Suggestion was turned down
    Rejected,
}

impl SuggestionStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "Pending",
            SuggestionStatus::Applied => "Applied",
            SuggestionStatus::Rejected => "Rejected",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(SuggestionStatus::Pending),
            "Applied" => Some(SuggestionStatus::Applied),
            "Rejected" => Some(SuggestionStatus::Rejected),
            _ => None,
        }
    }
}

/// Removal request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RemovalStatus {
    /// Collecting votes
    #[default]
    Pending,
    /// Tag was removed from the document
    Removed,
    /// Request was turned down
    Rejected,
}

impl RemovalStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalStatus::Pending => "Pending",
            RemovalStatus::Removed => "Removed",
            RemovalStatus::Rejected => "Rejected",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(RemovalStatus::Pending),
            "Removed" => Some(RemovalStatus::Removed),
            "Rejected" => Some(RemovalStatus::Rejected),
            _ => None,
        }
    }
}

/// Community proposal to add a tag to a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagSuggestion {
    pub id: i64,
    pub document_id: DocumentId,
    pub tag_name: String,
    pub tag_category: String,
    pub suggested_by: String,
    pub created_at: DateTime<Utc>,
    pub status: SuggestionStatus,
    pub applied_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Community proposal to remove an existing tag from a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagRemovalRequest {
    pub id: i64,
    pub document_id: DocumentId,
    /// Authoritative tag row being targeted; cleared once the tag is removed
    pub document_tag_id: Option<i64>,
    pub tag_name: String,
    pub tag_category: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub status: RemovalStatus,
    pub removed_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

/// Input for creating a suggestion or removal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequestInput {
    pub document_id: DocumentId,
    pub tag_name: String,
    pub tag_category: String,
    pub user_id: String,
}

/// Outcome of submitting a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "id", rename_all = "lowercase")]
pub enum Submission {
    /// A new pending request was created
    Created(i64),
    /// A pending request for the same document and tag already existed
    Existing(i64),
}

impl Submission {
    /// Id of the pending request, new or existing
    pub fn id(&self) -> i64 {
        match self {
            Submission::Created(id) | Submission::Existing(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Submission::Created(_))
    }
}

/// How a pending request is closed
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Apply the change and append a rule to the ledger
    Accept {
        decision: Decision,
        /// Replacement category for the applied tag (admin approval only)
        category_override: Option<String>,
    },
    /// Close without changing the corpus
    Reject {
        actor: String,
        reason: Option<String>,
    },
}

/// A pending suggestion together with its current tally
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingSuggestion {
    #[serde(flatten)]
    pub suggestion: TagSuggestion,
    pub document_name: String,
    pub tally: VoteTally,
}

/// A pending removal request together with its current tally
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRemoval {
    #[serde(flatten)]
    pub request: TagRemovalRequest,
    pub document_name: String,
    pub tally: VoteTally,
}

/// Moderation queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingRequests {
    pub suggestions: Vec<PendingSuggestion>,
    pub removals: Vec<PendingRemoval>,
}

impl PendingRequests {
    pub fn total(&self) -> usize {
        self.suggestions.len() + self.removals.len()
    }
}
