//! In-memory collaborators shared by the review tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::pending_submission::{
            CommunityMemberPayload, GeneralKnowledgePayload, PurchaseInfo, SubmissionPayload,
        },
    },
    utils::config::ReviewSettingsTable,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    coins::{CoinLedger, SurrealCoinLedger},
    indexing::{IndexJob, IndexingQueue},
    ledger::ReviewLedger,
    messaging::{Messenger, ReviewCard, Voter},
};

pub const BOT_ID: &str = "bot-1";

#[derive(Default)]
pub struct FakeMessenger {
    next_message_id: AtomicI64,
    pub posts: Mutex<Vec<(String, i64, ReviewCard)>>,
    pub edits: Mutex<Vec<(String, i64, ReviewCard)>>,
    pub dms: Mutex<Vec<(String, String)>>,
    counts: Mutex<HashMap<i64, HashMap<String, u32>>>,
    voters: Mutex<HashMap<i64, Vec<Voter>>>,
    missing_channels: Mutex<HashSet<String>>,
    failing_channels: Mutex<HashSet<String>>,
    dm_blocked: Mutex<bool>,
}

impl FakeMessenger {
    pub fn set_counts(&self, message_id: i64, approvals: u32, rejections: u32) {
        self.counts.lock().expect("counts lock").insert(
            message_id,
            HashMap::from([("✅".to_string(), approvals), ("❌".to_string(), rejections)]),
        );
    }

    /// Replaces the voter list with the bot seed plus `user_ids`.
    pub fn set_voters(&self, message_id: i64, user_ids: &[&str]) {
        let mut voters = vec![Voter {
            user_id: BOT_ID.into(),
            bot: true,
        }];
        voters.extend(user_ids.iter().map(|id| Voter {
            user_id: (*id).into(),
            bot: false,
        }));
        self.voters
            .lock()
            .expect("voters lock")
            .insert(message_id, voters);
    }

    pub fn delete_message(&self, message_id: i64) {
        self.counts.lock().expect("counts lock").remove(&message_id);
        self.voters.lock().expect("voters lock").remove(&message_id);
    }

    pub fn remove_channel(&self, channel_id: &str) {
        self.missing_channels
            .lock()
            .expect("channels lock")
            .insert(channel_id.into());
    }

    /// Every lookup against `channel_id` errors, as during a platform outage.
    pub fn fail_channel(&self, channel_id: &str) {
        self.failing_channels
            .lock()
            .expect("channels lock")
            .insert(channel_id.into());
    }

    pub fn block_dms(&self) {
        *self.dm_blocked.lock().expect("dm lock") = true;
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().expect("edits lock").len()
    }

    pub fn last_edit(&self) -> Option<ReviewCard> {
        self.edits
            .lock()
            .expect("edits lock")
            .last()
            .map(|(_, _, card)| card.clone())
    }

    pub fn dm_count(&self) -> usize {
        self.dms.lock().expect("dms lock").len()
    }

    fn check_reachable(&self, channel_id: &str) -> Result<(), AppError> {
        if self
            .failing_channels
            .lock()
            .expect("channels lock")
            .contains(channel_id)
        {
            return Err(AppError::Messaging(format!("channel {channel_id} timed out")));
        }
        Ok(())
    }

    fn channel_missing(&self, channel_id: &str) -> bool {
        self.missing_channels
            .lock()
            .expect("channels lock")
            .contains(channel_id)
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn post_review(
        &self,
        channel_id: &str,
        card: &ReviewCard,
        reactions: &[String],
    ) -> Result<i64, AppError> {
        if self.channel_missing(channel_id) {
            return Err(AppError::StaleReference(format!("channel {channel_id}")));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1000;
        self.posts
            .lock()
            .expect("posts lock")
            .push((channel_id.into(), message_id, card.clone()));
        self.counts.lock().expect("counts lock").insert(
            message_id,
            reactions.iter().map(|emoji| (emoji.clone(), 1)).collect(),
        );
        self.set_voters(message_id, &[]);
        Ok(message_id)
    }

    async fn edit_review(
        &self,
        channel_id: &str,
        message_id: i64,
        card: &ReviewCard,
    ) -> Result<(), AppError> {
        self.edits
            .lock()
            .expect("edits lock")
            .push((channel_id.into(), message_id, card.clone()));
        Ok(())
    }

    async fn send_dm(&self, user_id: &str, content: &str) -> Result<(), AppError> {
        if *self.dm_blocked.lock().expect("dm lock") {
            return Err(AppError::Messaging("dms disabled".into()));
        }
        self.dms
            .lock()
            .expect("dms lock")
            .push((user_id.into(), content.into()));
        Ok(())
    }

    async fn reaction_counts(
        &self,
        _channel_id: &str,
        message_id: i64,
    ) -> Result<Option<HashMap<String, u32>>, AppError> {
        Ok(self
            .counts
            .lock()
            .expect("counts lock")
            .get(&message_id)
            .cloned())
    }

    async fn reaction_voters(
        &self,
        channel_id: &str,
        message_id: i64,
        _emoji: &str,
    ) -> Result<Option<Vec<Voter>>, AppError> {
        self.check_reachable(channel_id)?;
        Ok(self
            .voters
            .lock()
            .expect("voters lock")
            .get(&message_id)
            .cloned())
    }

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, AppError> {
        self.check_reachable(channel_id)?;
        Ok(!self.channel_missing(channel_id))
    }
}

pub struct FailingCoins;

#[async_trait]
impl CoinLedger for FailingCoins {
    async fn add_coins(&self, _user_id: &str, _amount: i64, _reason: &str) -> Result<i64, AppError> {
        Err(AppError::Refund("ledger offline".into()))
    }
}

pub struct Harness {
    pub db: Arc<SurrealDbClient>,
    pub messenger: Arc<FakeMessenger>,
    pub ledger: ReviewLedger,
    pub jobs: UnboundedReceiver<IndexJob>,
}

pub async fn memory_db() -> Arc<SurrealDbClient> {
    Arc::new(
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb"),
    )
}

pub async fn harness() -> Harness {
    let db = memory_db().await;
    let coins = Arc::new(SurrealCoinLedger::new(db.clone()));
    harness_with_coins(db, coins)
}

pub fn harness_with_coins(db: Arc<SurrealDbClient>, coins: Arc<dyn CoinLedger>) -> Harness {
    let messenger = Arc::new(FakeMessenger::default());
    let (queue, jobs) = IndexingQueue::new();
    let ledger = ReviewLedger::new(
        db.clone(),
        messenger.clone(),
        coins,
        queue,
        ReviewSettingsTable::default(),
    );
    Harness {
        db,
        messenger,
        ledger,
        jobs,
    }
}

pub fn knowledge_payload(price: Option<i64>) -> SubmissionPayload {
    SubmissionPayload::GeneralKnowledge(GeneralKnowledgePayload {
        title: "Moon festival".into(),
        category_name: "Events".into(),
        content_text: "Held every autumn. Lanterns everywhere.".into(),
        purchase_info: price.map(|price| PurchaseInfo {
            item_id: Some("knowledge_slot".into()),
            price,
        }),
    })
}

pub fn member_payload(discord_id: &str, name: &str) -> SubmissionPayload {
    SubmissionPayload::CommunityMember(CommunityMemberPayload {
        discord_id: discord_id.into(),
        name: name.into(),
        personality: "Cheerful".into(),
        background: "Joined last spring.".into(),
        preferences: "Tea".into(),
        purchase_info: None,
    })
}

pub fn already_expired() -> Duration {
    Duration::minutes(-1)
}
