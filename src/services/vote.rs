//! Vote service
//!
//! Casting a vote on a Pending request. Users may change their mind: a second
//! cast overwrites the first.

use crate::db::repositories::{VoteRepository, VoteUpsert};
use crate::models::{VoteStats, VoteTarget};
use std::sync::Arc;

use super::error::{require_non_blank, GovernanceError};

/// Vote service
pub struct VoteService {
    repo: Arc<dyn VoteRepository>,
}

impl VoteService {
    pub fn new(repo: Arc<dyn VoteRepository>) -> Self {
        Self { repo }
    }

    /// Record `user_id`'s vote on `target` and return the updated tally.
    ///
    /// # Errors
    /// - `InvalidInput` if the user id is blank
    /// - `NotFound` if the request does not exist
    /// - `AlreadyResolved` if the request is no longer Pending
    pub async fn cast_vote(
        &self,
        target: VoteTarget,
        user_id: &str,
        in_favor: bool,
    ) -> Result<VoteStats, GovernanceError> {
        require_non_blank(user_id, "user_id")?;

        match self.repo.upsert(target, user_id.trim(), in_favor).await? {
            VoteUpsert::Recorded(tally) => {
                tracing::debug!(%target, user_id, in_favor, "Vote recorded");
                Ok(tally.into())
            }
            VoteUpsert::TargetNotFound => Err(GovernanceError::NotFound(format!(
                "{} does not exist",
                target
            ))),
            VoteUpsert::TargetResolved => Err(GovernanceError::AlreadyResolved(format!(
                "{} is no longer accepting votes",
                target
            ))),
        }
    }
}
