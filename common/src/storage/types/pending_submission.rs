use std::fmt;

use chrono::Duration as ChronoDuration;
use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{knowledge_document::KnowledgeDocument, work_event::WorkEvent};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    GeneralKnowledge,
    CommunityMember,
    WorkEvent,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::GeneralKnowledge => "general_knowledge",
            EntryType::CommunityMember => "community_member",
            EntryType::WorkEvent => "work_event",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general_knowledge" => Ok(EntryType::GeneralKnowledge),
            "community_member" => Ok(EntryType::CommunityMember),
            "work_event" => Ok(EntryType::WorkEvent),
            other => Err(AppError::Validation(format!("unknown entry type '{other}'"))),
        }
    }
}

/// Coins paid for the submission slot; refunded when the community rejects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchaseInfo {
    #[serde(default)]
    pub item_id: Option<String>,
    pub price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralKnowledgePayload {
    pub title: String,
    #[serde(default)]
    pub category_name: String,
    pub content_text: String,
    #[serde(default)]
    pub purchase_info: Option<PurchaseInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityMemberPayload {
    pub discord_id: String,
    pub name: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub purchase_info: Option<PurchaseInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkEventPayload {
    #[serde(default = "default_work_event_type")]
    pub event_type: String,
    pub name: String,
    pub description: String,
    pub reward_range_min: i64,
    pub reward_range_max: i64,
    #[serde(default)]
    pub good_event_description: Option<String>,
    #[serde(default)]
    pub good_event_modifier: Option<f64>,
    #[serde(default)]
    pub bad_event_description: Option<String>,
    #[serde(default)]
    pub bad_event_modifier: Option<f64>,
    #[serde(default)]
    pub purchase_info: Option<PurchaseInfo>,
}

fn default_work_event_type() -> String {
    "work".to_string()
}

/// Typed content of a submission, one case per entry type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPayload {
    GeneralKnowledge(GeneralKnowledgePayload),
    CommunityMember(CommunityMemberPayload),
    WorkEvent(WorkEventPayload),
}

impl SubmissionPayload {
    /// Builds a payload from an entry type and its untyped JSON body.
    pub fn from_parts(entry_type: EntryType, body: serde_json::Value) -> Result<Self, AppError> {
        let invalid = |err: serde_json::Error| {
            AppError::Validation(format!("invalid {entry_type} payload: {err}"))
        };

        Ok(match entry_type {
            EntryType::GeneralKnowledge => {
                Self::GeneralKnowledge(serde_json::from_value(body).map_err(invalid)?)
            }
            EntryType::CommunityMember => {
                Self::CommunityMember(serde_json::from_value(body).map_err(invalid)?)
            }
            EntryType::WorkEvent => Self::WorkEvent(serde_json::from_value(body).map_err(invalid)?),
        })
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::GeneralKnowledge(_) => EntryType::GeneralKnowledge,
            Self::CommunityMember(_) => EntryType::CommunityMember,
            Self::WorkEvent(_) => EntryType::WorkEvent,
        }
    }

    pub fn purchase_info(&self) -> Option<&PurchaseInfo> {
        match self {
            Self::GeneralKnowledge(p) => p.purchase_info.as_ref(),
            Self::CommunityMember(p) => p.purchase_info.as_ref(),
            Self::WorkEvent(p) => p.purchase_info.as_ref(),
        }
    }

    /// Human facing name of the submitted entry.
    pub fn display_name(&self) -> &str {
        match self {
            Self::GeneralKnowledge(p) => &p.title,
            Self::CommunityMember(p) => &p.name,
            Self::WorkEvent(p) => &p.name,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        fn required(field: &str, value: &str) -> Result<(), AppError> {
            if value.trim().is_empty() {
                return Err(AppError::Validation(format!("{field} must not be empty")));
            }
            Ok(())
        }

        match self {
            Self::GeneralKnowledge(p) => {
                required("title", &p.title)?;
                required("content_text", &p.content_text)?;
            }
            Self::CommunityMember(p) => {
                required("discord_id", &p.discord_id)?;
                required("name", &p.name)?;
            }
            Self::WorkEvent(p) => {
                required("event_type", &p.event_type)?;
                required("name", &p.name)?;
                required("description", &p.description)?;
                if p.reward_range_min > p.reward_range_max {
                    return Err(AppError::Validation(format!(
                        "reward range {}..{} is not ordered",
                        p.reward_range_min, p.reward_range_max
                    )));
                }
            }
        }

        if let Some(purchase) = self.purchase_info() {
            if purchase.price < 0 {
                return Err(AppError::Validation("price must not be negative".into()));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum SubmissionTransition {
    Approve,
    Reject,
}

impl SubmissionTransition {
    fn as_str(&self) -> &'static str {
        match self {
            SubmissionTransition::Approve => "approve",
            SubmissionTransition::Reject => "reject",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: SubmissionLifecycleMachine,
        initial: Pending,
        states: [Pending, Approved, Rejected],
        events {
            approve {
                transition: { from: Pending, to: Approved }
            }
            reject {
                transition: { from: Pending, to: Rejected }
            }
        }
    }

    pub(super) fn pending() -> SubmissionLifecycleMachine<(), Pending> {
        SubmissionLifecycleMachine::new(())
    }
}

fn invalid_transition(status: &SubmissionStatus, event: SubmissionTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid submission transition: {} -> {}",
        status.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(
    status: &SubmissionStatus,
    event: SubmissionTransition,
) -> Result<SubmissionStatus, AppError> {
    use lifecycle::pending;
    match (status, event) {
        (SubmissionStatus::Pending, SubmissionTransition::Approve) => pending()
            .approve()
            .map(|_| SubmissionStatus::Approved)
            .map_err(|_| invalid_transition(status, event)),
        (SubmissionStatus::Pending, SubmissionTransition::Reject) => pending()
            .reject()
            .map(|_| SubmissionStatus::Rejected)
            .map_err(|_| invalid_transition(status, event)),
        _ => Err(invalid_transition(status, event)),
    }
}

/// Permanent write that accompanies an approval.
#[derive(Debug, Clone)]
pub enum ApprovalWrite {
    InsertDocument(KnowledgeDocument),
    /// Upserts the document at its natural-key id and drops its old chunks first.
    /// A row that already exists keeps its `created_at` and `external_id`.
    ReplaceDocument(KnowledgeDocument),
    UpsertWorkEvent(WorkEvent),
}

impl ApprovalWrite {
    fn statement(&self) -> &'static str {
        match self {
            ApprovalWrite::InsertDocument(_) => {
                "CREATE type::thing('knowledge_document', $record_id) CONTENT $record;"
            }
            ApprovalWrite::ReplaceDocument(_) => {
                "LET $previous = (SELECT created_at, external_id FROM type::thing('knowledge_document', $record_id))[0];
                 DELETE knowledge_chunk WHERE document_id = $record_id;
                 UPSERT type::thing('knowledge_document', $record_id) CONTENT $record;
                 UPDATE type::thing('knowledge_document', $record_id)
                 SET created_at = $previous.created_at ?? created_at,
                     external_id = $previous.external_id ?? external_id;"
            }
            ApprovalWrite::UpsertWorkEvent(_) => {
                "UPSERT type::thing('custom_work_event', $record_id) CONTENT $record;"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Approved(PendingSubmission),
    /// Someone else already moved the submission out of `pending`.
    AlreadyDecided(SubmissionStatus),
}

stored_object!(PendingSubmission, "pending_submission", {
    entry_type: EntryType,
    payload: SubmissionPayload,
    proposer_id: String,
    origin_channel_id: String,
    review_message_id: Option<i64>,
    status: SubmissionStatus,
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    expires_at: DateTime<Utc>,
    decision_reason: Option<String>
});

impl PendingSubmission {
    pub fn new(
        payload: SubmissionPayload,
        proposer_id: String,
        origin_channel_id: String,
        review_duration: ChronoDuration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            entry_type: payload.entry_type(),
            payload,
            proposer_id,
            origin_channel_id,
            review_message_id: None,
            status: SubmissionStatus::Pending,
            expires_at: now + review_duration,
            decision_reason: None,
        }
    }

    pub async fn create_and_add_to_db(
        payload: SubmissionPayload,
        proposer_id: String,
        origin_channel_id: String,
        review_duration: ChronoDuration,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        payload.validate()?;
        let submission = Self::new(payload, proposer_id, origin_channel_id, review_duration);
        db.store_item(submission.clone()).await?;
        Ok(submission)
    }

    pub async fn get_by_review_message_id(
        db: &SurrealDbClient,
        message_id: i64,
    ) -> Result<Option<Self>, AppError> {
        let submission: Option<Self> = db
            .client
            .query("SELECT * FROM type::table($table) WHERE review_message_id = $message_id LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("message_id", message_id))
            .await?
            .take(0)?;

        Ok(submission)
    }

    /// Pending submissions whose review window closed at or before `now`, oldest first.
    pub async fn get_expired(
        db: &SurrealDbClient,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, AppError> {
        let expired: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status = $pending AND expires_at <= $now
                 ORDER BY expires_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("pending", SubmissionStatus::Pending.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?
            .take(0)?;

        Ok(expired)
    }

    /// Records the review post. Only pending submissions accept a message id.
    pub async fn set_review_message_id(
        db: &SurrealDbClient,
        id: &str,
        message_id: i64,
    ) -> Result<Option<Self>, AppError> {
        let updated: Option<Self> = db
            .client
            .query(
                "UPDATE type::thing($table, $id)
                 SET review_message_id = $message_id, updated_at = time::now()
                 WHERE status = $pending
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("message_id", message_id))
            .bind(("pending", SubmissionStatus::Pending.as_str()))
            .await?
            .take(0)?;

        Ok(updated)
    }

    /// Guarded `pending -> rejected`. Returns `None` when the submission was not pending.
    ///
    /// The lifecycle is checked against the status the caller loaded; a stale copy can
    /// still pass that check, so the `WHERE status = $pending` clause decides.
    pub async fn mark_rejected(
        db: &SurrealDbClient,
        submission: &Self,
        reason: &str,
    ) -> Result<Option<Self>, AppError> {
        let Ok(next) = compute_next_state(&submission.status, SubmissionTransition::Reject) else {
            debug!(submission_id = %submission.id, status = submission.status.as_str(), "rejection refused by lifecycle");
            return Ok(None);
        };
        let id = submission.id.as_str();

        let updated: Option<Self> = db
            .client
            .query(
                "UPDATE type::thing($table, $id)
                 SET status = $rejected, decision_reason = $reason, updated_at = time::now()
                 WHERE status = $pending
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("rejected", next.as_str()))
            .bind(("reason", reason.to_owned()))
            .bind(("pending", SubmissionStatus::Pending.as_str()))
            .await?
            .take(0)?;

        Ok(updated)
    }

    /// Guarded `pending -> approved` committed together with `write`.
    ///
    /// Both statements run in one transaction. When the status guard fails the
    /// transaction is cancelled, the permanent write never lands, and the call
    /// reports [`ApprovalOutcome::AlreadyDecided`]. Any other failure leaves the
    /// submission pending and is returned to the caller.
    ///
    /// A loaded record that is already terminal never reaches the store.
    pub async fn approve_with(
        db: &SurrealDbClient,
        submission: &Self,
        write: ApprovalWrite,
    ) -> Result<ApprovalOutcome, AppError> {
        let Ok(next) = compute_next_state(&submission.status, SubmissionTransition::Approve) else {
            debug!(submission_id = %submission.id, status = submission.status.as_str(), "approval refused by lifecycle");
            return Ok(ApprovalOutcome::AlreadyDecided(submission.status));
        };
        let id = submission.id.as_str();

        let query = format!(
            "BEGIN TRANSACTION;
             LET $claimed = (
                 UPDATE type::thing($table, $id)
                 SET status = $approved, updated_at = time::now()
                 WHERE status = $pending
                 RETURN AFTER
             );
             IF array::len($claimed) == 0 {{ THROW 'submission is no longer pending'; }};
             {write}
             COMMIT TRANSACTION;",
            write = write.statement()
        );

        let request = db
            .client
            .query(query)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("approved", next.as_str()))
            .bind(("pending", SubmissionStatus::Pending.as_str()));

        let request = match write {
            ApprovalWrite::InsertDocument(document) | ApprovalWrite::ReplaceDocument(document) => {
                request
                    .bind(("record_id", document.id.clone()))
                    .bind(("record", document))
            }
            ApprovalWrite::UpsertWorkEvent(event) => request
                .bind(("record_id", event.id.clone()))
                .bind(("record", event)),
        };

        let committed = match request.await {
            Ok(response) => response.check().map(|_| ()),
            Err(err) => Err(err),
        };

        let current = db.get_item::<Self>(id).await?;

        match (committed, current) {
            (Ok(()), Some(submission)) => Ok(ApprovalOutcome::Approved(submission)),
            (Ok(()), None) => Err(AppError::NotFound(format!("submission {id}"))),
            (Err(_), Some(submission)) if submission.status.is_terminal() => {
                debug!(submission_id = %id, status = submission.status.as_str(), "approval lost the race");
                Ok(ApprovalOutcome::AlreadyDecided(submission.status))
            }
            (Err(_), None) => Err(AppError::NotFound(format!("submission {id}"))),
            (Err(err), Some(_)) => {
                warn!(submission_id = %id, error = %err, "approval transaction failed, submission stays pending");
                Err(AppError::Database(err))
            }
        }
    }

    /// Hard delete used for orphaned submissions whose channel vanished.
    pub async fn purge(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}
