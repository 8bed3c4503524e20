use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use common::{error::AppError, storage::types::pending_submission::PendingSubmission};

use crate::ledger::{
    Decision, ReviewLedger, REASON_EXPIRED_UNDECIDED, REASON_LOST_MESSAGE,
    REASON_MESSAGE_DISAPPEARED,
};

/// Per-pass counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub approved: u32,
    pub rejected: u32,
    pub purged: u32,
    pub failed: u32,
    /// Decided concurrently by a vote event before the sweeper got to it.
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    Decided(Decision),
    Purged,
}

impl ReviewLedger {
    /// Settles every pending submission whose window closed at or before `now`.
    #[instrument(skip_all)]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let expired = PendingSubmission::get_expired(&self.db, now).await?;
        let mut report = SweepReport::default();

        for submission in expired {
            match self.settle_expired(&submission).await {
                Ok(SweepAction::Decided(Decision::Approved)) => report.approved += 1,
                Ok(SweepAction::Decided(Decision::Rejected)) => report.rejected += 1,
                Ok(SweepAction::Decided(Decision::AlreadyDecided(_))) => report.skipped += 1,
                Ok(SweepAction::Purged) => report.purged += 1,
                Err(err) => {
                    report.failed += 1;
                    error!(submission_id = %submission.id, error = %err, "expired submission could not be settled");
                }
            }
        }

        Ok(report)
    }

    async fn settle_expired(&self, submission: &PendingSubmission) -> Result<SweepAction, AppError> {
        let Some(message_id) = submission.review_message_id.filter(|id| *id > 0) else {
            return self
                .reject(submission, REASON_LOST_MESSAGE)
                .await
                .map(SweepAction::Decided);
        };

        let channel_id = submission.origin_channel_id.as_str();
        if !self.messenger.channel_exists(channel_id).await? {
            warn!(submission_id = %submission.id, %channel_id, "origin channel gone, purging submission");
            PendingSubmission::purge(&self.db, &submission.id).await?;
            return Ok(SweepAction::Purged);
        }

        let vote_emoji = self.settings_for(submission.entry_type).vote_emoji.clone();
        let Some(voters) = self
            .messenger
            .reaction_voters(channel_id, message_id, &vote_emoji)
            .await?
        else {
            return self
                .reject(submission, REASON_MESSAGE_DISAPPEARED)
                .await
                .map(SweepAction::Decided);
        };

        let approvals = voters
            .iter()
            .filter(|voter| !voter.bot)
            .map(|voter| voter.user_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let threshold = self.settings_for(submission.entry_type).approval_threshold;

        let decision = if approvals >= threshold as usize {
            self.approve(submission).await?
        } else {
            self.reject(submission, REASON_EXPIRED_UNDECIDED).await?
        };
        Ok(SweepAction::Decided(decision))
    }
}

/// Runs `sweep_expired` forever on a fixed interval.
pub async fn run_sweeper_loop(ledger: Arc<ReviewLedger>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = every.as_secs(), "review sweeper started");

    loop {
        ticker.tick().await;
        match ledger.sweep_expired(Utc::now()).await {
            Ok(report) => info!(
                approved = report.approved,
                rejected = report.rejected,
                purged = report.purged,
                failed = report.failed,
                skipped = report.skipped,
                "sweep pass finished"
            ),
            Err(err) => error!(error = %err, "sweep pass failed"),
        }
    }
}
