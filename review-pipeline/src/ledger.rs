use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::{debug, error, info, instrument, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            knowledge_document::{DocumentKind, KnowledgeDocument},
            pending_submission::{
                ApprovalOutcome, ApprovalWrite, EntryType, PendingSubmission, SubmissionPayload,
                SubmissionStatus,
            },
            work_event::WorkEvent,
        },
    },
    utils::config::{ReviewSettings, ReviewSettingsTable},
};

use crate::{
    cards::{approved_card, rejected_card, review_card},
    coins::CoinLedger,
    indexing::{IndexJob, IndexingQueue},
    messaging::{Messenger, ReviewCard},
    promotion::{general_knowledge_document, member_profile_document, KeyedLocks},
};

pub const REASON_COMMUNITY_REJECTED: &str = "community vote rejected";
pub const REASON_EXPIRED_UNDECIDED: &str = "time expired, undecided";
pub const REASON_LOST_MESSAGE: &str = "lost the vote message";
pub const REASON_MESSAGE_DISAPPEARED: &str = "vote message disappeared";

/// Result of a single transition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
    /// The submission had already left `pending`; nothing was written.
    AlreadyDecided(SubmissionStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Unknown message, foreign channel or vanished message.
    Ignored,
    StillOpen { approvals: u32, rejections: u32 },
    Approved,
    Rejected,
    AlreadyDecided(SubmissionStatus),
}

impl From<Decision> for VoteOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => VoteOutcome::Approved,
            Decision::Rejected => VoteOutcome::Rejected,
            Decision::AlreadyDecided(status) => VoteOutcome::AlreadyDecided(status),
        }
    }
}

/// Owns the submission lifecycle: intake, votes, promotion and refunds.
pub struct ReviewLedger {
    pub(crate) db: Arc<SurrealDbClient>,
    pub(crate) messenger: Arc<dyn Messenger>,
    coins: Arc<dyn CoinLedger>,
    indexing: IndexingQueue,
    settings: ReviewSettingsTable,
    member_locks: KeyedLocks,
}

impl ReviewLedger {
    pub fn new(
        db: Arc<SurrealDbClient>,
        messenger: Arc<dyn Messenger>,
        coins: Arc<dyn CoinLedger>,
        indexing: IndexingQueue,
        settings: ReviewSettingsTable,
    ) -> Self {
        Self {
            db,
            messenger,
            coins,
            indexing,
            settings,
            member_locks: KeyedLocks::default(),
        }
    }

    pub fn settings_for(&self, entry_type: EntryType) -> &ReviewSettings {
        self.settings.for_entry_type(entry_type.as_str())
    }

    /// Stores a new pending submission and opens its review.
    #[instrument(skip_all, fields(entry_type = %payload.entry_type(), %proposer_id))]
    pub async fn submit(
        &self,
        payload: SubmissionPayload,
        proposer_id: &str,
        origin_channel_id: &str,
    ) -> Result<PendingSubmission, AppError> {
        let duration =
            ChronoDuration::minutes(self.settings_for(payload.entry_type()).review_duration_minutes);
        let mut submission = PendingSubmission::create_and_add_to_db(
            payload,
            proposer_id.to_string(),
            origin_channel_id.to_string(),
            duration,
            &self.db,
        )
        .await?;
        info!(submission_id = %submission.id, expires_at = %submission.expires_at, "submission stored");

        match self.start_review(&submission.id).await {
            Ok(message_id) => submission.review_message_id = message_id,
            Err(err) => {
                error!(submission_id = %submission.id, error = %err, "could not open review");
            }
        }

        Ok(submission)
    }

    /// Posts the review card and records its message id.
    ///
    /// Returns `None` when the origin channel is gone or the submission was
    /// decided in the meantime.
    pub async fn start_review(&self, submission_id: &str) -> Result<Option<i64>, AppError> {
        let submission = self
            .db
            .get_item::<PendingSubmission>(submission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("submission {submission_id}")))?;
        let settings = self.settings_for(submission.entry_type);
        let reactions = [settings.vote_emoji.clone(), settings.reject_emoji.clone()];

        let message_id = match self
            .messenger
            .post_review(
                &submission.origin_channel_id,
                &review_card(&submission, settings),
                &reactions,
            )
            .await
        {
            Ok(message_id) => message_id,
            Err(AppError::StaleReference(reason)) => {
                warn!(%submission_id, %reason, "origin channel unavailable, review not posted");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        match PendingSubmission::set_review_message_id(&self.db, submission_id, message_id).await? {
            Some(_) => {
                info!(%submission_id, message_id, "review opened");
                Ok(Some(message_id))
            }
            None => {
                warn!(%submission_id, message_id, "submission decided before its review was recorded");
                Ok(None)
            }
        }
    }

    /// Re-evaluates a review after a reaction event using the live raw counts.
    #[instrument(skip_all, fields(%channel_id, message_id))]
    pub async fn handle_vote(
        &self,
        channel_id: &str,
        message_id: i64,
    ) -> Result<VoteOutcome, AppError> {
        let Some(submission) =
            PendingSubmission::get_by_review_message_id(&self.db, message_id).await?
        else {
            return Ok(VoteOutcome::Ignored);
        };
        if submission.origin_channel_id != channel_id {
            debug!(submission_id = %submission.id, "vote from a different channel ignored");
            return Ok(VoteOutcome::Ignored);
        }
        if submission.status.is_terminal() {
            return Ok(VoteOutcome::AlreadyDecided(submission.status));
        }

        let Some(counts) = self.messenger.reaction_counts(channel_id, message_id).await? else {
            warn!(submission_id = %submission.id, "review message vanished, vote ignored");
            return Ok(VoteOutcome::Ignored);
        };

        let settings = self.settings_for(submission.entry_type);
        let approvals = counts.get(&settings.vote_emoji).copied().unwrap_or(0);
        let rejections = counts.get(&settings.reject_emoji).copied().unwrap_or(0);
        debug!(submission_id = %submission.id, approvals, rejections, "vote counted");

        if approvals >= settings.instant_approval_threshold {
            return self.approve(&submission).await.map(VoteOutcome::from);
        }
        if rejections >= settings.rejection_threshold {
            return self
                .reject(&submission, REASON_COMMUNITY_REJECTED)
                .await
                .map(VoteOutcome::from);
        }

        Ok(VoteOutcome::StillOpen {
            approvals,
            rejections,
        })
    }

    /// Promotes the payload and flips the submission to `approved` in one write.
    #[instrument(skip_all, fields(submission_id = %submission.id, entry_type = %submission.entry_type))]
    pub async fn approve(&self, submission: &PendingSubmission) -> Result<Decision, AppError> {
        let mut member_guard = None;

        let (write, document_id) = match &submission.payload {
            SubmissionPayload::GeneralKnowledge(payload) => {
                let document = general_knowledge_document(submission, payload);
                let id = document.id.clone();
                (ApprovalWrite::InsertDocument(document), Some(id))
            }
            SubmissionPayload::CommunityMember(payload) => {
                let id = KnowledgeDocument::id_for_natural_key(
                    DocumentKind::CommunityMember,
                    payload.discord_id.trim(),
                );
                member_guard = Some(self.member_locks.lock(&id).await);
                let document = member_profile_document(submission, payload);
                (ApprovalWrite::ReplaceDocument(document), Some(id))
            }
            SubmissionPayload::WorkEvent(payload) => (
                ApprovalWrite::UpsertWorkEvent(WorkEvent::from_payload(
                    payload,
                    &submission.proposer_id,
                )),
                None,
            ),
        };

        let outcome = PendingSubmission::approve_with(&self.db, submission, write).await;
        drop(member_guard);

        let approved = match outcome? {
            ApprovalOutcome::Approved(approved) => approved,
            ApprovalOutcome::AlreadyDecided(status) => {
                debug!(status = status.as_str(), "approval skipped");
                return Ok(Decision::AlreadyDecided(status));
            }
        };
        info!(document_id = ?document_id, "submission approved");

        if let Some(document_id) = document_id {
            if let Err(err) = self.indexing.enqueue(IndexJob::Index(document_id.clone())) {
                error!(%document_id, error = %err, "could not schedule indexing");
            }
        }
        self.update_card(&approved, &approved_card(&approved)).await;

        Ok(Decision::Approved)
    }

    /// Guarded rejection followed by card update and refund.
    #[instrument(skip_all, fields(submission_id = %submission.id, %reason))]
    pub async fn reject(
        &self,
        submission: &PendingSubmission,
        reason: &str,
    ) -> Result<Decision, AppError> {
        let Some(rejected) =
            PendingSubmission::mark_rejected(&self.db, submission, reason).await?
        else {
            let status = self
                .db
                .get_item::<PendingSubmission>(&submission.id)
                .await?
                .map_or(submission.status, |current| current.status);
            debug!(status = status.as_str(), "rejection skipped");
            return Ok(Decision::AlreadyDecided(status));
        };
        info!("submission rejected");

        self.update_card(&rejected, &rejected_card(&rejected, reason))
            .await;
        self.refund(&rejected).await;

        Ok(Decision::Rejected)
    }

    async fn update_card(&self, submission: &PendingSubmission, card: &ReviewCard) {
        let Some(message_id) = submission.review_message_id.filter(|id| *id > 0) else {
            return;
        };
        if let Err(err) = self
            .messenger
            .edit_review(&submission.origin_channel_id, message_id, card)
            .await
        {
            warn!(submission_id = %submission.id, message_id, error = %err, "could not update review card");
        }
    }

    /// Returns the paid price to the proposer and lets them know.
    /// Failures are logged and left for manual reconciliation.
    async fn refund(&self, submission: &PendingSubmission) {
        let Some(purchase) = submission.payload.purchase_info() else {
            return;
        };
        if purchase.price <= 0 {
            return;
        }

        let item_id = purchase.item_id.as_deref().unwrap_or("none");
        let reason = format!(
            "review rejected refund (review {}, item {item_id})",
            submission.id
        );

        match self
            .coins
            .add_coins(&submission.proposer_id, purchase.price, &reason)
            .await
        {
            Ok(balance) => {
                info!(submission_id = %submission.id, proposer_id = %submission.proposer_id, price = purchase.price, balance, "refund issued");
            }
            Err(err) => {
                error!(submission_id = %submission.id, proposer_id = %submission.proposer_id, price = purchase.price, error = %err, "refund failed");
                return;
            }
        }

        let message = format!(
            "Your submission **{}** did not pass community review. The {} coins you paid have been returned.",
            submission.payload.display_name(),
            purchase.price
        );
        if let Err(err) = self
            .messenger
            .send_dm(&submission.proposer_id, &message)
            .await
        {
            warn!(proposer_id = %submission.proposer_id, error = %err, "refund notice not delivered");
        }
    }
}
