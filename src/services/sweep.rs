//! Auto-apply sweep
//!
//! Walks every Pending request once, evaluates it against the voting config
//! and resolves the ones with enough support as community decisions. Each
//! request is settled in its own transaction; a failure is recorded in the
//! report and the sweep moves on.

use crate::db::repositories::{RequestRepository, ResolveOutcome, ViewCountRepository};
use crate::models::{Decision, DocumentId, Resolution, VoteTally, VoteTarget, VotingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::error::GovernanceError;
use super::request::RESOLVE_ATTEMPTS;
use super::threshold;
use super::voting_config::VotingConfigService;

/// Approver recorded on rules created by community votes
pub const COMMUNITY_APPROVER: &str = "system";

/// A request the sweep could not settle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub target: VoteTarget,
    pub error: String,
}

/// Summary of one sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// False when auto-apply is switched off; nothing was evaluated
    pub enabled: bool,
    pub suggestions_considered: usize,
    pub removals_considered: usize,
    pub applied_suggestions: usize,
    pub applied_removals: usize,
    /// Evaluated requests that did not meet the threshold, or whose votes
    /// kept moving while the sweep tried to resolve them
    pub still_pending: usize,
    /// Requests resolved by someone else while the sweep was running
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
    pub created_rule_ids: Vec<i64>,
}

/// Auto-apply sweep service
pub struct SweepService {
    requests: Arc<dyn RequestRepository>,
    views: Arc<dyn ViewCountRepository>,
    config: Arc<VotingConfigService>,
}

impl SweepService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        views: Arc<dyn ViewCountRepository>,
        config: Arc<VotingConfigService>,
    ) -> Self {
        Self {
            requests,
            views,
            config,
        }
    }

    /// Run one pass over all Pending requests.
    ///
    /// Only reading the configuration or the pending lists can fail the
    /// sweep as a whole; everything per request lands in the report.
    pub async fn run_auto_apply_sweep(&self) -> Result<SweepReport, GovernanceError> {
        let config = self.config.current().await?;
        if !config.auto_apply_enabled {
            tracing::info!("Auto-apply is disabled, skipping sweep");
            return Ok(SweepReport::default());
        }

        let suggestions = self.requests.list_pending_suggestions(None).await?;
        let removals = self.requests.list_pending_removals(None).await?;
        tracing::info!(
            suggestions = suggestions.len(),
            removals = removals.len(),
            "Starting auto-apply sweep"
        );

        let mut sweep = Sweep {
            config: &config,
            view_counts: HashMap::new(),
            report: SweepReport {
                enabled: true,
                suggestions_considered: suggestions.len(),
                removals_considered: removals.len(),
                ..SweepReport::default()
            },
        };

        for pending in &suggestions {
            let target = VoteTarget::Suggestion(pending.suggestion.id);
            if self
                .settle(&mut sweep, target, pending.suggestion.document_id, pending.tally)
                .await
            {
                sweep.report.applied_suggestions += 1;
            }
        }

        for pending in &removals {
            let target = VoteTarget::Removal(pending.request.id);
            if self
                .settle(&mut sweep, target, pending.request.document_id, pending.tally)
                .await
            {
                sweep.report.applied_removals += 1;
            }
        }

        let report = sweep.report;
        tracing::info!(
            applied_suggestions = report.applied_suggestions,
            applied_removals = report.applied_removals,
            still_pending = report.still_pending,
            skipped = report.skipped,
            failures = report.failures.len(),
            "Auto-apply sweep finished"
        );
        Ok(report)
    }

    /// Evaluate one request and resolve it if it passes. Returns `true` if
    /// this sweep resolved it.
    ///
    /// The resolution only commits on the votes it was evaluated on. When
    /// votes land after the listing, the request is evaluated again on the
    /// current tally.
    async fn settle(
        &self,
        sweep: &mut Sweep<'_>,
        target: VoteTarget,
        document_id: DocumentId,
        mut tally: VoteTally,
    ) -> bool {
        let view_count = match self.view_count(sweep, document_id).await {
            Ok(count) => count,
            Err(e) => {
                sweep.fail(target, e);
                return false;
            }
        };

        for _ in 0..RESOLVE_ATTEMPTS {
            let check = threshold::evaluate(sweep.config, &tally, view_count);
            tracing::debug!(
                %target,
                required = check.required_votes,
                total_weight = check.total_weight,
                agreement_pct = check.agreement_pct,
                passed = check.meets_threshold,
                "Evaluated request"
            );
            if !check.meets_threshold {
                sweep.report.still_pending += 1;
                return false;
            }

            let resolution = Resolution::Accept {
                decision: Decision::community(COMMUNITY_APPROVER, tally),
                category_override: None,
            };
            let outcome = match target {
                VoteTarget::Suggestion(id) => {
                    self.requests.resolve_suggestion(id, &resolution).await
                }
                VoteTarget::Removal(id) => self.requests.resolve_removal(id, &resolution).await,
            };

            match outcome {
                Ok(ResolveOutcome::Resolved { rule }) => {
                    if let Some(rule) = rule {
                        sweep.report.created_rule_ids.push(rule.id);
                    }
                    tracing::info!(%target, "Applied by community vote");
                    return true;
                }
                Ok(ResolveOutcome::VotesChanged(current)) => {
                    tracing::debug!(%target, "Votes changed since listing, re-evaluating");
                    tally = current;
                }
                Ok(ResolveOutcome::AlreadyResolved) | Ok(ResolveOutcome::NotFound) => {
                    tracing::debug!(%target, "Resolved elsewhere during sweep");
                    sweep.report.skipped += 1;
                    return false;
                }
                Err(e) => {
                    sweep.fail(target, e);
                    return false;
                }
            }
        }

        tracing::debug!(%target, "Votes kept changing, leaving for the next sweep");
        sweep.report.still_pending += 1;
        false
    }

    async fn view_count(&self, sweep: &mut Sweep<'_>, document_id: DocumentId) -> anyhow::Result<i64> {
        if let Some(count) = sweep.view_counts.get(&document_id) {
            return Ok(*count);
        }
        let count = self.views.view_count(document_id).await?;
        sweep.view_counts.insert(document_id, count);
        Ok(count)
    }
}

/// State carried through one sweep
struct Sweep<'a> {
    config: &'a VotingConfig,
    view_counts: HashMap<DocumentId, i64>,
    report: SweepReport,
}

impl Sweep<'_> {
    fn fail(&mut self, target: VoteTarget, error: anyhow::Error) {
        tracing::warn!(%target, "Failed to settle request: {:#}", error);
        self.report.failures.push(ItemFailure {
            target,
            error: format!("{:#}", error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        DocumentRepository, DocumentTagRepository, RuleRepository, SqlxDocumentRepository,
        SqlxDocumentTagRepository, SqlxRequestRepository, SqlxRuleRepository,
        SqlxViewCountRepository, SqlxVoteRepository, SqlxVotingConfigRepository, VoteRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{
        ApprovalSource, CreateRequestInput, ExternalDocId, RuleType, SuggestionStatus,
    };
    use crate::services::tests::LateVoter;

    struct Fixture {
        pool: DynDatabasePool,
        service: SweepService,
        doc: DocumentId,
    }

    async fn setup(config: VotingConfig) -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let doc = SqlxDocumentRepository::new(pool.clone())
            .create(&ExternalDocId::new("ext-7"), "doc7.pdf")
            .await
            .unwrap();
        let config_service = Arc::new(VotingConfigService::new(
            SqlxVotingConfigRepository::boxed(pool.clone()),
            config,
        ));
        let service = SweepService::new(
            SqlxRequestRepository::boxed(pool.clone()),
            SqlxViewCountRepository::boxed(pool.clone()),
            config_service,
        );
        Fixture {
            pool,
            service,
            doc: doc.id,
        }
    }

    fn small_quorum() -> VotingConfig {
        VotingConfig {
            min_votes: 3,
            required_agreement_pct: 70.0,
            ..VotingConfig::default()
        }
    }

    async fn suggest(pool: &DynDatabasePool, doc: DocumentId, tag: &str) -> i64 {
        SqlxRequestRepository::new(pool.clone())
            .create_suggestion(&CreateRequestInput {
                document_id: doc,
                tag_name: tag.to_string(),
                tag_category: "Series".to_string(),
                user_id: "alice".to_string(),
            })
            .await
            .unwrap()
            .id()
    }

    async fn vote(pool: &DynDatabasePool, target: VoteTarget, users: &[&str], in_favor: bool) {
        let votes = SqlxVoteRepository::new(pool.clone());
        for user in users {
            votes.upsert(target, user, in_favor).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_passing_suggestion_is_applied() {
        let f = setup(small_quorum()).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert!(report.enabled);
        assert_eq!(report.suggestions_considered, 1);
        assert_eq!(report.applied_suggestions, 1);
        assert_eq!(report.created_rule_ids.len(), 1);
        assert!(report.failures.is_empty());

        let rule = SqlxRuleRepository::new(f.pool.clone())
            .get(report.created_rule_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.approval_source, ApprovalSource::CommunityVote);
        assert_eq!(rule.approved_by, COMMUNITY_APPROVER);
        assert_eq!(rule.rule_type, RuleType::Add);
        assert_eq!(rule.votes_in_favor, 3.0);

        let suggestion = SqlxRequestRepository::new(f.pool.clone())
            .get_suggestion(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Applied);
        assert!(SqlxDocumentTagRepository::new(f.pool)
            .find(f.doc, "Naruto", "Series")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_short_of_threshold_stays_pending() {
        let f = setup(small_quorum()).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob"], true).await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["carol"], false).await;

        // 2 of 3 in favor is below 70%
        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(report.applied_suggestions, 0);
        assert_eq!(report.still_pending, 1);
        assert!(report.created_rule_ids.is_empty());
    }

    #[tokio::test]
    async fn test_passing_removal_is_applied() {
        let f = setup(small_quorum()).await;
        let tags = SqlxDocumentTagRepository::new(f.pool.clone());
        tags.insert(f.doc, "Filler", "Genre").await.unwrap();
        let tag = tags.find(f.doc, "Filler", "Genre").await.unwrap().unwrap();
        let id = SqlxRequestRepository::new(f.pool.clone())
            .create_removal(
                &CreateRequestInput {
                    document_id: f.doc,
                    tag_name: "Filler".to_string(),
                    tag_category: "Genre".to_string(),
                    user_id: "alice".to_string(),
                },
                tag.id,
            )
            .await
            .unwrap()
            .id();
        vote(&f.pool, VoteTarget::Removal(id), &["bob", "carol"], true).await;

        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(report.removals_considered, 1);
        assert_eq!(report.applied_removals, 1);
        assert!(tags.find(f.doc, "Filler", "Genre").await.unwrap().is_none());

        let rules = SqlxRuleRepository::new(f.pool).list(false).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].rule_type, RuleType::Remove);
    }

    #[tokio::test]
    async fn test_popular_document_needs_more_votes() {
        let config = VotingConfig {
            popularity_scale_factor: 0.5,
            max_votes_required: 10,
            ..small_quorum()
        };
        let f = setup(config).await;
        let views = SqlxViewCountRepository::new(f.pool.clone());
        for _ in 0..12 {
            views.increment(f.doc).await.unwrap();
        }
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        // 12 views * 0.5 = 6 required
        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(report.still_pending, 1);

        vote(&f.pool, VoteTarget::Suggestion(id), &["dave", "erin", "frank"], true).await;
        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(report.applied_suggestions, 1);
    }

    #[tokio::test]
    async fn test_disabled_sweep_is_noop() {
        let config = VotingConfig {
            auto_apply_enabled: false,
            ..small_quorum()
        };
        let f = setup(config).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert!(!report.enabled);
        assert_eq!(report.suggestions_considered, 0);
        assert_eq!(
            SqlxRequestRepository::new(f.pool)
                .get_suggestion(id)
                .await
                .unwrap()
                .unwrap()
                .status,
            SuggestionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let f = setup(small_quorum()).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        let first = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(first.applied_suggestions, 1);

        let second = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(second.suggestions_considered, 0);
        assert!(second.created_rule_ids.is_empty());
        assert_eq!(SqlxRuleRepository::new(f.pool).list(false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let f = setup(small_quorum()).await;
        let broken = suggest(&f.pool, f.doc, "Broken").await;
        let good = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(broken), &["bob", "carol"], true).await;
        vote(&f.pool, VoteTarget::Suggestion(good), &["bob", "carol"], true).await;

        // an abort on the first rule append fails only that request's transaction
        f.pool
            .execute(
                r#"
                CREATE TRIGGER reject_broken BEFORE INSERT ON approved_tag_rules
                WHEN NEW.tag_name = 'Broken'
                BEGIN SELECT RAISE(ABORT, 'rule store unavailable'); END
                "#,
            )
            .await
            .unwrap();

        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(report.applied_suggestions, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, VoteTarget::Suggestion(broken));
        assert!(report.failures[0].error.contains("rule store unavailable"));

        // the failed request is untouched and still pending
        let requests = SqlxRequestRepository::new(f.pool.clone());
        let suggestion = requests.get_suggestion(broken).await.unwrap().unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
        assert!(SqlxDocumentTagRepository::new(f.pool)
            .find(f.doc, "Broken", "Series")
            .await
            .unwrap()
            .is_none());
    }

    fn late_voter_sweep(f: &Fixture, late_votes: usize, in_favor: bool) -> SweepService {
        SweepService::new(
            LateVoter::boxed(f.pool.clone(), late_votes, in_favor),
            SqlxViewCountRepository::boxed(f.pool.clone()),
            Arc::new(VotingConfigService::new(
                SqlxVotingConfigRepository::boxed(f.pool.clone()),
                small_quorum(),
            )),
        )
    }

    #[tokio::test]
    async fn test_late_opposition_is_evaluated_before_applying() {
        let f = setup(small_quorum()).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        // the listing sees 3 of 3 in favor; a 4th vote against drops it to 75%,
        // which still passes, and the rule records the 4 votes
        let report = late_voter_sweep(&f, 1, false)
            .run_auto_apply_sweep()
            .await
            .unwrap();
        assert_eq!(report.applied_suggestions, 1);
        let rule = SqlxRuleRepository::new(f.pool.clone())
            .get(report.created_rule_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.votes_in_favor, 3.0);
        assert_eq!(rule.total_votes, 4.0);
    }

    #[tokio::test]
    async fn test_late_votes_can_sink_a_passing_request() {
        let f = setup(small_quorum()).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        // 3 of 5 in favor after two late votes against
        let report = late_voter_sweep(&f, 2, false)
            .run_auto_apply_sweep()
            .await
            .unwrap();
        assert_eq!(report.applied_suggestions, 0);
        assert_eq!(report.still_pending, 1);
        assert!(report.failures.is_empty());
        assert!(report.created_rule_ids.is_empty());

        let suggestion = SqlxRequestRepository::new(f.pool.clone())
            .get_suggestion(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(suggestion.status, SuggestionStatus::Pending);
    }

    #[tokio::test]
    async fn test_votes_that_never_settle_leave_request_pending() {
        let f = setup(small_quorum()).await;
        let id = suggest(&f.pool, f.doc, "Naruto").await;
        vote(&f.pool, VoteTarget::Suggestion(id), &["bob", "carol"], true).await;

        let report = late_voter_sweep(&f, RESOLVE_ATTEMPTS, true)
            .run_auto_apply_sweep()
            .await
            .unwrap();
        assert_eq!(report.applied_suggestions, 0);
        assert_eq!(report.still_pending, 1);
        assert!(report.failures.is_empty());
        assert!(SqlxRuleRepository::new(f.pool).list(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_view_counts_default_to_zero_for_unviewed_documents() {
        let f = setup(small_quorum()).await;
        let other = SqlxDocumentRepository::new(f.pool.clone())
            .create(&ExternalDocId::new("ext-8"), "doc8.pdf")
            .await
            .unwrap();
        let a = suggest(&f.pool, f.doc, "Naruto").await;
        let b = suggest(&f.pool, other.id, "Bleach").await;
        vote(&f.pool, VoteTarget::Suggestion(a), &["bob", "carol"], true).await;
        vote(&f.pool, VoteTarget::Suggestion(b), &["bob", "carol"], true).await;

        let report = f.service.run_auto_apply_sweep().await.unwrap();
        assert_eq!(report.applied_suggestions, 2);
        assert_eq!(report.created_rule_ids.len(), 2);
    }
}
