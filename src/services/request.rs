//! Request lifecycle service
//!
//! Creates suggestions and removal requests and resolves them by admin
//! action. Community resolution goes through the auto-apply sweep; both paths
//! end in the same repository resolution so they leave identical traces.

use crate::db::repositories::{
    DocumentRepository, DocumentTagRepository, RequestRepository, ResolveOutcome, VoteRepository,
};
use crate::models::{
    ApprovedTagRule, CreateRequestInput, Decision, Document, DocumentId, PendingRequests,
    Resolution, Submission, TagLabel, VoteTarget,
};
use anyhow::Context;
use std::sync::Arc;

use super::error::{require_non_blank, GovernanceError};

/// How many times a resolution is re-decided when votes move underneath it
pub(crate) const RESOLVE_ATTEMPTS: usize = 3;

/// Request lifecycle service
pub struct RequestService {
    requests: Arc<dyn RequestRepository>,
    documents: Arc<dyn DocumentRepository>,
    tags: Arc<dyn DocumentTagRepository>,
    votes: Arc<dyn VoteRepository>,
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        documents: Arc<dyn DocumentRepository>,
        tags: Arc<dyn DocumentTagRepository>,
        votes: Arc<dyn VoteRepository>,
    ) -> Self {
        Self {
            requests,
            documents,
            tags,
            votes,
        }
    }

    /// Propose adding a tag to a document.
    ///
    /// The submitter's favor vote and overlay row are written with the
    /// request. Submitting a key that already has a Pending suggestion
    /// returns that suggestion as `Submission::Existing`.
    ///
    /// # Errors
    /// - `InvalidInput` for a blank user, tag name or category
    /// - `NotFound` if the document does not exist
    /// - `Conflict` if the document already carries the tag
    pub async fn create_suggestion(
        &self,
        input: CreateRequestInput,
    ) -> Result<Submission, GovernanceError> {
        let input = normalize(input)?;
        self.require_document(input.document_id).await?;

        if self
            .tags
            .find(input.document_id, &input.tag_name, &input.tag_category)
            .await
            .context("Failed to check existing tag")?
            .is_some()
        {
            return Err(GovernanceError::Conflict(format!(
                "Document {} already has tag {}/{}",
                input.document_id, input.tag_category, input.tag_name
            )));
        }

        let submission = self.requests.create_suggestion(&input).await?;
        tracing::info!(
            document_id = %input.document_id,
            tag = %format!("{}/{}", input.tag_category, input.tag_name),
            user_id = %input.user_id,
            created = submission.is_created(),
            "Tag suggestion {} submitted",
            submission.id()
        );
        Ok(submission)
    }

    /// Propose removing a tag from a document.
    ///
    /// # Errors
    /// - `InvalidInput` for a blank user, tag name or category
    /// - `NotFound` if the document or the tag on it does not exist
    pub async fn create_removal_request(
        &self,
        input: CreateRequestInput,
    ) -> Result<Submission, GovernanceError> {
        let input = normalize(input)?;
        self.require_document(input.document_id).await?;

        let tag = self
            .tags
            .find(input.document_id, &input.tag_name, &input.tag_category)
            .await
            .context("Failed to look up tag")?
            .ok_or_else(|| {
                GovernanceError::NotFound(format!(
                    "Tag {}/{} is not on document {}",
                    input.tag_category, input.tag_name, input.document_id
                ))
            })?;

        let submission = self.requests.create_removal(&input, tag.id).await?;
        tracing::info!(
            document_id = %input.document_id,
            tag = %format!("{}/{}", input.tag_category, input.tag_name),
            user_id = %input.user_id,
            created = submission.is_created(),
            "Tag removal request {} submitted",
            submission.id()
        );
        Ok(submission)
    }

    /// Approve a suggestion directly, optionally filing the tag under a
    /// different category. Returns the appended rule.
    pub async fn approve_suggestion(
        &self,
        id: i64,
        approver: &str,
        category_override: Option<&str>,
    ) -> Result<ApprovedTagRule, GovernanceError> {
        let category_override = category_override
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self.approve(VoteTarget::Suggestion(id), approver, category_override)
            .await
    }

    /// Reject a suggestion. No rule is recorded.
    pub async fn reject_suggestion(
        &self,
        id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<(), GovernanceError> {
        let resolution = rejection(actor, reason)?;
        let outcome = self.requests.resolve_suggestion(id, &resolution).await?;
        rejected(VoteTarget::Suggestion(id), outcome)
    }

    /// Approve a removal request directly. Returns the appended rule.
    pub async fn approve_removal(
        &self,
        id: i64,
        approver: &str,
    ) -> Result<ApprovedTagRule, GovernanceError> {
        self.approve(VoteTarget::Removal(id), approver, None).await
    }

    /// Reject a removal request. The tag stays; no rule is recorded.
    pub async fn reject_removal(
        &self,
        id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<(), GovernanceError> {
        let resolution = rejection(actor, reason)?;
        let outcome = self.requests.resolve_removal(id, &resolution).await?;
        rejected(VoteTarget::Removal(id), outcome)
    }

    /// Pending requests on one document with their tallies
    pub async fn get_pending_for_document(
        &self,
        document_id: DocumentId,
    ) -> Result<PendingRequests, GovernanceError> {
        self.require_document(document_id).await?;

        Ok(PendingRequests {
            suggestions: self
                .requests
                .list_pending_suggestions(Some(document_id))
                .await?,
            removals: self.requests.list_pending_removals(Some(document_id)).await?,
        })
    }

    /// All pending requests, most voted first
    pub async fn get_all_pending(&self) -> Result<PendingRequests, GovernanceError> {
        Ok(PendingRequests {
            suggestions: self.requests.list_pending_suggestions(None).await?,
            removals: self.requests.list_pending_removals(None).await?,
        })
    }

    /// Resolve `target` as an admin approval. The rule snapshots the tally
    /// at commit time; if votes land in between, the decision is re-made on
    /// the new tally.
    async fn approve(
        &self,
        target: VoteTarget,
        approver: &str,
        category_override: Option<String>,
    ) -> Result<ApprovedTagRule, GovernanceError> {
        require_non_blank(approver, "approver")?;
        let mut votes = self.votes.tally(target).await?;

        for _ in 0..RESOLVE_ATTEMPTS {
            let resolution = Resolution::Accept {
                decision: Decision::admin(approver.trim(), votes),
                category_override: category_override.clone(),
            };
            let outcome = match target {
                VoteTarget::Suggestion(id) => {
                    self.requests.resolve_suggestion(id, &resolution).await?
                }
                VoteTarget::Removal(id) => self.requests.resolve_removal(id, &resolution).await?,
            };

            match outcome {
                ResolveOutcome::VotesChanged(current) => {
                    tracing::debug!(%target, "Votes changed during approval, retrying");
                    votes = current;
                }
                outcome => return accepted_rule(target, outcome),
            }
        }

        Err(GovernanceError::Conflict(format!(
            "Votes on {} kept changing during approval",
            target
        )))
    }

    async fn require_document(&self, id: DocumentId) -> Result<Document, GovernanceError> {
        self.documents
            .get_by_id(id)
            .await
            .context("Failed to load document")?
            .ok_or_else(|| GovernanceError::NotFound(format!("Document {} not found", id)))
    }
}

/// Trim the input and reject blank parts
fn normalize(input: CreateRequestInput) -> Result<CreateRequestInput, GovernanceError> {
    require_non_blank(&input.user_id, "user_id")?;
    let label = TagLabel::parse(&input.tag_name, &input.tag_category).ok_or_else(|| {
        GovernanceError::InvalidInput("Tag name and category cannot be empty".to_string())
    })?;

    Ok(CreateRequestInput {
        document_id: input.document_id,
        tag_name: label.name,
        tag_category: label.category,
        user_id: input.user_id.trim().to_string(),
    })
}

fn rejection(actor: &str, reason: Option<&str>) -> Result<Resolution, GovernanceError> {
    require_non_blank(actor, "actor")?;
    Ok(Resolution::Reject {
        actor: actor.trim().to_string(),
        reason: reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    })
}

fn accepted_rule(
    target: VoteTarget,
    outcome: ResolveOutcome,
) -> Result<ApprovedTagRule, GovernanceError> {
    match outcome {
        ResolveOutcome::Resolved { rule: Some(rule) } => {
            tracing::info!(rule_id = rule.id, "Approved {}", target);
            Ok(rule)
        }
        ResolveOutcome::Resolved { rule: None } => Err(GovernanceError::Internal(
            anyhow::anyhow!("Approval of {} recorded no rule", target),
        )),
        ResolveOutcome::NotFound => Err(GovernanceError::NotFound(format!(
            "{} does not exist",
            target
        ))),
        ResolveOutcome::AlreadyResolved => Err(GovernanceError::AlreadyResolved(format!(
            "{} was already resolved",
            target
        ))),
        ResolveOutcome::VotesChanged(_) => Err(GovernanceError::Conflict(format!(
            "Votes on {} changed during approval",
            target
        ))),
    }
}

fn rejected(target: VoteTarget, outcome: ResolveOutcome) -> Result<(), GovernanceError> {
    match outcome {
        ResolveOutcome::Resolved { .. } => {
            tracing::info!("Rejected {}", target);
            Ok(())
        }
        ResolveOutcome::NotFound => Err(GovernanceError::NotFound(format!(
            "{} does not exist",
            target
        ))),
        ResolveOutcome::AlreadyResolved => Err(GovernanceError::AlreadyResolved(format!(
            "{} was already resolved",
            target
        ))),
        ResolveOutcome::VotesChanged(_) => Err(GovernanceError::Internal(anyhow::anyhow!(
            "Rejection of {} was checked against votes",
            target
        ))),
    }
}
