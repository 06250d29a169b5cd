//! Data models
//!
//! This module contains all data structures used by the tag governance engine.
//! Models represent:
//! - Corpus entities owned by external collaborators (Document, DocumentTag, ViewCount)
//! - Governance entities (TagSuggestion, TagRemovalRequest, Vote, ApprovedTagRule, UserTagOverride)
//! - Value objects passed between services (VotingConfig, VoteTally, Decision, Resolution)

mod document;
mod overlay;
mod request;
mod rule;
mod view_count;
mod vote;
mod voting_config;

pub use document::{Document, DocumentId, DocumentTag, ExternalDocId, TagLabel};
pub use overlay::{EffectiveTag, UserTagOverride};
pub use request::{
    CreateRequestInput, PendingRemoval, PendingRequests, PendingSuggestion, RemovalStatus,
    Resolution, Submission, SuggestionStatus, TagRemovalRequest, TagSuggestion,
};
pub use rule::{ApprovalSource, ApprovedTagRule, CreateManualRuleInput, Decision, NewRule, RuleType};
pub use view_count::ViewCount;
pub use vote::{Vote, VoteStats, VoteTally, VoteTarget, DEFAULT_VOTE_WEIGHT};
pub use voting_config::{StoredVotingConfig, VotingConfig};
