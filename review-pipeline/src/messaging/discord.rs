use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use common::{error::AppError, utils::config::AppConfig};

use super::{Messenger, ReviewCard, Voter};

const VOTERS_PAGE_SIZE: usize = 100;

/// REST adapter for the Discord HTTP API.
#[derive(Clone)]
pub struct DiscordMessenger {
    client: Client,
    api_base: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReactionEmoji {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reaction {
    count: u32,
    emoji: ReactionEmoji,
}

#[derive(Debug, Deserialize)]
struct MessageWithReactions {
    #[serde(default)]
    reactions: Vec<Reaction>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    #[serde(default)]
    bot: bool,
}

impl DiscordMessenger {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.discord_api_base.clone(), config.discord_bot_token.clone())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn ensure_success(response: Response, context: &str) -> Result<Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Messaging(format!("{context} failed with {status}: {body}")))
    }

    async fn fetch_reactions(
        &self,
        channel_id: &str,
        message_id: i64,
    ) -> Result<Option<Vec<Reaction>>, AppError> {
        let response = self
            .request(Method::GET, &format!("/channels/{channel_id}/messages/{message_id}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let message: MessageWithReactions = Self::ensure_success(response, "fetch message")
            .await?
            .json()
            .await?;
        Ok(Some(message.reactions))
    }
}

/// Percent-encodes an emoji for use in a reaction path segment.
pub fn encode_emoji(emoji: &str) -> String {
    url::form_urlencoded::byte_serialize(emoji.as_bytes()).collect()
}

pub fn embed_json(card: &ReviewCard) -> Value {
    let mut embed = json!({
        "title": card.title,
        "description": card.description,
        "color": card.color,
        "fields": card.fields,
        "footer": { "text": card.footer },
    });
    if let (Some(timestamp), Some(object)) = (card.timestamp, embed.as_object_mut()) {
        object.insert("timestamp".into(), Value::String(timestamp.to_rfc3339()));
    }
    embed
}

fn parse_message_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::Messaging(format!("unexpected message id '{raw}'")))
}

fn counts_by_emoji(reactions: Vec<Reaction>) -> HashMap<String, u32> {
    reactions
        .into_iter()
        .filter_map(|reaction| reaction.emoji.name.map(|name| (name, reaction.count)))
        .collect()
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn post_review(
        &self,
        channel_id: &str,
        card: &ReviewCard,
        reactions: &[String],
    ) -> Result<i64, AppError> {
        let response = self
            .request(Method::POST, &format!("/channels/{channel_id}/messages"))
            .json(&json!({ "embeds": [embed_json(card)] }))
            .send()
            .await?;

        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Err(AppError::StaleReference(format!(
                "channel {channel_id} is not reachable"
            )));
        }

        let message: MessageRef = Self::ensure_success(response, "post review")
            .await?
            .json()
            .await?;
        let message_id = parse_message_id(&message.id)?;

        for emoji in reactions {
            let path = format!(
                "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
                encode_emoji(emoji)
            );
            let response = self.request(Method::PUT, &path).send().await?;
            if let Err(err) = Self::ensure_success(response, "seed reaction").await {
                warn!(%channel_id, message_id, %emoji, error = %err, "could not seed reaction");
            }
        }

        debug!(%channel_id, message_id, "review posted");
        Ok(message_id)
    }

    async fn edit_review(
        &self,
        channel_id: &str,
        message_id: i64,
        card: &ReviewCard,
    ) -> Result<(), AppError> {
        let response = self
            .request(
                Method::PATCH,
                &format!("/channels/{channel_id}/messages/{message_id}"),
            )
            .json(&json!({ "embeds": [embed_json(card)] }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::StaleReference(format!(
                "review message {message_id} is gone"
            )));
        }
        Self::ensure_success(response, "edit review").await?;
        Ok(())
    }

    async fn send_dm(&self, user_id: &str, content: &str) -> Result<(), AppError> {
        let response = self
            .request(Method::POST, "/users/@me/channels")
            .json(&json!({ "recipient_id": user_id }))
            .send()
            .await?;
        let channel: MessageRef = Self::ensure_success(response, "open dm")
            .await?
            .json()
            .await?;

        let response = self
            .request(Method::POST, &format!("/channels/{}/messages", channel.id))
            .json(&json!({ "content": content }))
            .send()
            .await?;
        Self::ensure_success(response, "send dm").await?;
        Ok(())
    }

    async fn reaction_counts(
        &self,
        channel_id: &str,
        message_id: i64,
    ) -> Result<Option<HashMap<String, u32>>, AppError> {
        Ok(self
            .fetch_reactions(channel_id, message_id)
            .await?
            .map(counts_by_emoji))
    }

    async fn reaction_voters(
        &self,
        channel_id: &str,
        message_id: i64,
        emoji: &str,
    ) -> Result<Option<Vec<Voter>>, AppError> {
        let mut voters = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .request(
                    Method::GET,
                    &format!(
                        "/channels/{channel_id}/messages/{message_id}/reactions/{}",
                        encode_emoji(emoji)
                    ),
                )
                .query(&[("limit", VOTERS_PAGE_SIZE.to_string())]);
            if let Some(after) = &after {
                request = request.query(&[("after", after)]);
            }

            let response = request.send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let page: Vec<DiscordUser> = Self::ensure_success(response, "list reactions")
                .await?
                .json()
                .await?;

            let page_len = page.len();
            after = page.last().map(|user| user.id.clone());
            voters.extend(page.into_iter().map(|user| Voter {
                user_id: user.id,
                bot: user.bot,
            }));

            if page_len < VOTERS_PAGE_SIZE {
                break;
            }
        }

        Ok(Some(voters))
    }

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, AppError> {
        let response = self
            .request(Method::GET, &format!("/channels/{channel_id}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            _ => {
                Self::ensure_success(response, "fetch channel").await?;
                Ok(true)
            }
        }
    }
}
