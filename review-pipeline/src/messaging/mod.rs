pub mod discord;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use common::error::AppError;

pub use discord::DiscordMessenger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Embed shown on a review post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewCard {
    pub title: String,
    pub description: String,
    pub fields: Vec<CardField>,
    pub footer: String,
    pub color: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub user_id: String,
    pub bot: bool,
}

/// Chat platform operations used by the review flow.
///
/// `None` from the reaction lookups means the message no longer exists.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Posts `card` to `channel_id`, seeds `reactions`, and returns the message id.
    /// A missing channel is reported as [`AppError::StaleReference`].
    async fn post_review(
        &self,
        channel_id: &str,
        card: &ReviewCard,
        reactions: &[String],
    ) -> Result<i64, AppError>;

    async fn edit_review(
        &self,
        channel_id: &str,
        message_id: i64,
        card: &ReviewCard,
    ) -> Result<(), AppError>;

    async fn send_dm(&self, user_id: &str, content: &str) -> Result<(), AppError>;

    /// Raw reaction counters keyed by emoji, bot reactions included.
    async fn reaction_counts(
        &self,
        channel_id: &str,
        message_id: i64,
    ) -> Result<Option<HashMap<String, u32>>, AppError>;

    async fn reaction_voters(
        &self,
        channel_id: &str,
        message_id: i64,
        emoji: &str,
    ) -> Result<Option<Vec<Voter>>, AppError>;

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, AppError>;
}
