//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the storage operations for one entity; the
//! module-level `_tx` helpers let multi-entity operations share a transaction.

pub mod document;
pub mod document_tag;
pub mod overlay;
pub mod request;
pub mod rule;
pub mod view_count;
pub mod vote;
pub mod voting_config;

pub use document::{DocumentRepository, SqlxDocumentRepository};
pub use document_tag::{DocumentTagRepository, SqlxDocumentTagRepository};
pub use overlay::{OverlayRepository, SqlxOverlayRepository};
pub use request::{RequestRepository, ResolveOutcome, SqlxRequestRepository};
pub use rule::{RuleRepository, SqlxRuleRepository};
pub use view_count::{SqlxViewCountRepository, ViewCountRepository};
pub use vote::{SqlxVoteRepository, VoteRepository, VoteUpsert};
pub use voting_config::{SqlxVotingConfigRepository, VotingConfigRepository};
