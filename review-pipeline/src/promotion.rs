use std::{collections::HashMap, sync::Arc};

use serde_json::{json, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};

use common::storage::types::{
    knowledge_document::{DocumentKind, KnowledgeDocument},
    pending_submission::{
        CommunityMemberPayload, GeneralKnowledgePayload, PendingSubmission,
    },
};

const DEFAULT_CATEGORY: &str = "General knowledge";
const SOURCE: &str = "community_submission";

/// Fields that identify a member or describe the purchase; they never reach profile text.
pub const PROFILE_EXCLUDED_FIELDS: [&str; 8] = [
    "discord_id",
    "discord_number_id",
    "uploaded_by",
    "uploaded_by_name",
    "update_target_id",
    "purchase_info",
    "item_id",
    "price",
];

/// Per-key async locks. Guards are owned so they can be held across awaits.
///
/// Only serialises writers inside one process; the approval transaction keeps the row
/// consistent across processes.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

fn original_submission(submission: &PendingSubmission) -> Value {
    serde_json::to_value(&submission.payload).unwrap_or(Value::Null)
}

pub fn general_knowledge_document(
    submission: &PendingSubmission,
    payload: &GeneralKnowledgePayload,
) -> KnowledgeDocument {
    let title = payload.title.trim();
    let category = match payload.category_name.trim() {
        "" => DEFAULT_CATEGORY,
        category => category,
    };
    let content = payload.content_text.trim();

    KnowledgeDocument::new(
        DocumentKind::GeneralKnowledge,
        title.to_string(),
        format!("Title: {title}\nCategory: {category}\nContent: {content}"),
        None,
        json!({
            "category": category,
            "source": SOURCE,
            "contributor_id": submission.proposer_id,
            "original_submission": original_submission(submission),
        }),
    )
    .with_external_id(format!("pending_{}", submission.id))
}

/// Searchable profile text built from the descriptive fields only.
pub fn member_profile_text(payload: &CommunityMemberPayload) -> String {
    [
        ("Name", payload.name.trim()),
        ("Personality", payload.personality.trim()),
        ("Background", payload.background.trim()),
        ("Preferences", payload.preferences.trim()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{label}: {value}"))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Member profile keyed by the Discord id. When the row already exists, the approval
/// write keeps its `created_at` and `external_id` (see `ApprovalWrite::ReplaceDocument`).
pub fn member_profile_document(
    submission: &PendingSubmission,
    payload: &CommunityMemberPayload,
) -> KnowledgeDocument {
    KnowledgeDocument::new(
        DocumentKind::CommunityMember,
        payload.name.trim().to_string(),
        member_profile_text(payload),
        None,
        json!({
            "name": payload.name.trim(),
            "personality": payload.personality.trim(),
            "background": payload.background.trim(),
            "preferences": payload.preferences.trim(),
            "source": SOURCE,
            "contributor_id": submission.proposer_id,
            "original_submission": original_submission(submission),
        }),
    )
    .with_natural_key(payload.discord_id.trim())
    .with_external_id(format!("pending_{}", submission.id))
}
