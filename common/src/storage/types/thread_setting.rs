use std::{fmt, str::FromStr};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Visibility rule for searches issued from a thread.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchMode {
    /// Only the thread's own documents plus scope-less ones are visible.
    #[default]
    Isolated,
    /// Everything is visible, same-thread matches rank first.
    Priority,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Isolated => "ISOLATED",
            SearchMode::Priority => "PRIORITY",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ISOLATED" => Ok(SearchMode::Isolated),
            "PRIORITY" => Ok(SearchMode::Priority),
            _ => Err(AppError::Validation(format!(
                "invalid search mode '{s}', expected ISOLATED or PRIORITY"
            ))),
        }
    }
}

// Keyed by thread id: the record id is the thread id itself.
stored_object!(ThreadSetting, "thread_setting", {
    thread_id: String,
    search_mode: SearchMode
});

impl ThreadSetting {
    /// Stored mode for the thread, `ISOLATED` when nothing was configured.
    pub async fn get_search_mode(
        db: &SurrealDbClient,
        thread_id: &str,
    ) -> Result<SearchMode, AppError> {
        let setting = db.get_item::<Self>(thread_id).await?;
        Ok(setting.map(|s| s.search_mode).unwrap_or_default())
    }

    pub async fn set_search_mode(
        db: &SurrealDbClient,
        thread_id: &str,
        mode: SearchMode,
    ) -> Result<Self, AppError> {
        if thread_id.trim().is_empty() {
            return Err(AppError::Validation("thread id must not be empty".into()));
        }

        let updated: Option<Self> = db
            .client
            .query(
                "UPSERT type::thing($table, $thread_id)
                 SET thread_id = $thread_id,
                     search_mode = $mode,
                     created_at = created_at ?? time::now(),
                     updated_at = time::now()
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("thread_id", thread_id.to_owned()))
            .bind(("mode", mode))
            .await?
            .take(0)?;

        updated.ok_or_else(|| {
            AppError::InternalError(format!("search mode for thread {thread_id} was not stored"))
        })
    }
}
