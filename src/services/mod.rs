//! Services layer - Business logic
//!
//! This module contains the tag governance services.
//! Services are responsible for:
//! - Validating caller input and mapping domain conditions to `GovernanceError`
//! - Coordinating repositories for voting, resolution and replay
//! - Folding per-item failures of batch operations into their reports

pub mod error;
pub mod overlay;
pub mod popularity;
pub mod replay;
pub mod request;
pub mod rule;
pub mod sweep;
pub mod threshold;
pub mod vote;
pub mod voting_config;


pub use error::GovernanceError;
pub use overlay::OverlayService;
pub use popularity::PopularityService;
pub use replay::{ReplayOptions, ReplayReport, ReplayService, RuleFailure};
pub use request::RequestService;
pub use rule::RuleService;
pub use sweep::{ItemFailure, SweepReport, SweepService, COMMUNITY_APPROVER};
pub use threshold::ThresholdCheck;
pub use vote::VoteService;
pub use voting_config::VotingConfigService;

use crate::db::repositories::{
    SqlxDocumentRepository, SqlxDocumentTagRepository, SqlxOverlayRepository,
    SqlxRequestRepository, SqlxRuleRepository, SqlxViewCountRepository, SqlxVoteRepository,
    SqlxVotingConfigRepository,
};
use crate::db::DynDatabasePool;
use crate::models::VotingConfig;
use std::sync::Arc;

/// Every governance service wired to one database
pub struct Governance {
    pub votes: VoteService,
    pub requests: RequestService,
    pub sweep: SweepService,
    pub rules: RuleService,
    pub replay: ReplayService,
    pub overlay: OverlayService,
    pub popularity: PopularityService,
    pub voting_config: Arc<VotingConfigService>,
}

impl Governance {
    /// Build the services. `defaults` seeds the stored voting config the
    /// first time it is read.
    pub fn new(pool: DynDatabasePool, defaults: VotingConfig) -> Self {
        let documents = SqlxDocumentRepository::boxed(pool.clone());
        let tags = SqlxDocumentTagRepository::boxed(pool.clone());
        let requests = SqlxRequestRepository::boxed(pool.clone());
        let votes = SqlxVoteRepository::boxed(pool.clone());
        let rules = SqlxRuleRepository::boxed(pool.clone());
        let views = SqlxViewCountRepository::boxed(pool.clone());
        let voting_config = Arc::new(VotingConfigService::new(
            SqlxVotingConfigRepository::boxed(pool.clone()),
            defaults,
        ));

        Self {
            votes: VoteService::new(votes.clone()),
            requests: RequestService::new(
                requests.clone(),
                documents.clone(),
                tags.clone(),
                votes,
            ),
            sweep: SweepService::new(requests, views.clone(), voting_config.clone()),
            rules: RuleService::new(rules.clone(), documents.clone()),
            replay: ReplayService::new(rules, documents.clone(), tags.clone()),
            overlay: OverlayService::new(
                SqlxOverlayRepository::boxed(pool),
                documents.clone(),
                tags,
            ),
            popularity: PopularityService::new(views, documents),
            voting_config,
        }
    }
}
