use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    #[default]
    OpenAI,
    Hashed,
}

impl EmbeddingBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingBackend::OpenAI => "openai",
            EmbeddingBackend::Hashed => "hashed",
        }
    }
}

/// Knobs for one hybrid-search corpus.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub top_k_vector: usize,
    pub top_k_fts: usize,
    pub final_k: usize,
    pub rrf_k: u32,
    pub max_parent_docs: usize,
}

impl RetrievalSettings {
    pub const fn tutorial() -> Self {
        Self {
            top_k_vector: 20,
            top_k_fts: 20,
            final_k: 5,
            rrf_k: 60,
            max_parent_docs: 3,
        }
    }

    pub const fn world_book() -> Self {
        Self {
            top_k_vector: 20,
            top_k_fts: 20,
            final_k: 10,
            rrf_k: 60,
            max_parent_docs: 5,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
pub struct ReviewSettings {
    pub review_duration_minutes: i64,
    pub approval_threshold: u32,
    pub instant_approval_threshold: u32,
    pub rejection_threshold: u32,
    #[serde(default = "default_vote_emoji")]
    pub vote_emoji: String,
    #[serde(default = "default_reject_emoji")]
    pub reject_emoji: String,
}

impl ReviewSettings {
    fn with_thresholds(duration: i64, approval: u32, instant: u32, rejection: u32) -> Self {
        Self {
            review_duration_minutes: duration,
            approval_threshold: approval,
            instant_approval_threshold: instant,
            rejection_threshold: rejection,
            vote_emoji: default_vote_emoji(),
            reject_emoji: default_reject_emoji(),
        }
    }
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self::with_thresholds(5, 3, 10, 5)
    }
}

/// Review settings keyed by entry type. Types without an override use `default`.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
pub struct ReviewSettingsTable {
    #[serde(default)]
    pub default: ReviewSettings,
    #[serde(default = "default_review_overrides")]
    pub overrides: HashMap<String, ReviewSettings>,
}

impl ReviewSettingsTable {
    pub fn for_entry_type(&self, entry_type: &str) -> &ReviewSettings {
        self.overrides.get(entry_type).unwrap_or(&self.default)
    }
}

impl Default for ReviewSettingsTable {
    fn default() -> Self {
        Self {
            default: ReviewSettings::default(),
            overrides: default_review_overrides(),
        }
    }
}

fn default_review_overrides() -> HashMap<String, ReviewSettings> {
    HashMap::from([
        (
            "community_member".to_string(),
            ReviewSettings::with_thresholds(5, 2, 8, 3),
        ),
        (
            "work_event".to_string(),
            ReviewSettings::with_thresholds(5, 2, 3, 3),
        ),
    ])
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default)]
    pub discord_bot_token: String,
    #[serde(default = "default_discord_api_base")]
    pub discord_api_base: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default = "RetrievalSettings::tutorial")]
    pub tutorial_retrieval: RetrievalSettings,
    #[serde(default = "RetrievalSettings::world_book")]
    pub world_book_retrieval: RetrievalSettings,
    #[serde(default)]
    pub review: ReviewSettingsTable,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimensions() -> u32 {
    1536
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_chunk_max_chars() -> usize {
    1000
}

fn default_vote_emoji() -> String {
    "✅".to_string()
}

fn default_reject_emoji() -> String {
    "❌".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "community".to_string(),
            surrealdb_database: "knowledge".to_string(),
            http_port: 3000,
            api_key: String::new(),
            openai_api_key: String::new(),
            openai_base_url: default_base_url(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            discord_bot_token: String::new(),
            discord_api_base: default_discord_api_base(),
            sweep_interval_secs: default_sweep_interval_secs(),
            chunk_max_chars: default_chunk_max_chars(),
            tutorial_retrieval: RetrievalSettings::tutorial(),
            world_book_retrieval: RetrievalSettings::world_book(),
            review: ReviewSettingsTable::default(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_entry_type_falls_back_to_default_settings() {
        let table = ReviewSettingsTable::default();
        let settings = table.for_entry_type("something_new");

        assert_eq!(settings, &ReviewSettings::default());
        assert_eq!(settings.approval_threshold, 3);
        assert_eq!(settings.instant_approval_threshold, 10);
        assert_eq!(settings.rejection_threshold, 5);
    }

    #[test]
    fn member_and_work_event_overrides_are_present() {
        let table = ReviewSettingsTable::default();

        let member = table.for_entry_type("community_member");
        assert_eq!(member.approval_threshold, 2);
        assert_eq!(member.instant_approval_threshold, 8);
        assert_eq!(member.rejection_threshold, 3);

        let event = table.for_entry_type("work_event");
        assert_eq!(event.instant_approval_threshold, 3);
        assert_eq!(event.vote_emoji, "✅");
        assert_eq!(event.reject_emoji, "❌");
    }

    #[test]
    fn config_source_fills_defaults() {
        let config = Config::builder()
            .set_override("surrealdb_address", "mem://")
            .and_then(|b| b.set_override("surrealdb_username", "root"))
            .and_then(|b| b.set_override("surrealdb_password", "root"))
            .and_then(|b| b.set_override("surrealdb_namespace", "ns"))
            .and_then(|b| b.set_override("surrealdb_database", "db"))
            .and_then(|b| b.set_override("http_port", 8080))
            .expect("overrides")
            .build()
            .expect("build config");

        let parsed: AppConfig = config.try_deserialize().expect("deserialize");
        assert_eq!(parsed.sweep_interval_secs, 60);
        assert_eq!(parsed.chunk_max_chars, 1000);
        assert_eq!(parsed.tutorial_retrieval, RetrievalSettings::tutorial());
        assert_eq!(parsed.world_book_retrieval.max_parent_docs, 5);
        assert_eq!(parsed.embedding_backend, EmbeddingBackend::OpenAI);
    }
}
