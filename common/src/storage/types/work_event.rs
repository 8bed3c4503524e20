use crate::stored_object;
#[cfg(any(test, feature = "test-utils"))]
use crate::{error::AppError, storage::db::SurrealDbClient};

use super::pending_submission::WorkEventPayload;

// Custom events contributed by the community; the built-in pool lives elsewhere.
stored_object!(WorkEvent, "custom_work_event", {
    event_type: String,
    name: String,
    description: String,
    reward_range_min: i64,
    reward_range_max: i64,
    good_event_description: Option<String>,
    good_event_modifier: Option<f64>,
    bad_event_description: Option<String>,
    bad_event_modifier: Option<f64>,
    is_enabled: bool,
    custom_event_by: String
});

impl WorkEvent {
    /// One event per `(event_type, name)`: a resubmission replaces the previous definition.
    pub fn id_for(event_type: &str, name: &str) -> String {
        format!("{}_{}", event_type.trim(), name.trim())
    }

    pub fn from_payload(payload: &WorkEventPayload, contributor_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(&payload.event_type, &payload.name),
            created_at: now,
            updated_at: now,
            event_type: payload.event_type.trim().to_string(),
            name: payload.name.trim().to_string(),
            description: payload.description.trim().to_string(),
            reward_range_min: payload.reward_range_min,
            reward_range_max: payload.reward_range_max,
            good_event_description: payload.good_event_description.clone(),
            good_event_modifier: payload.good_event_modifier,
            bad_event_description: payload.bad_event_description.clone(),
            bad_event_modifier: payload.bad_event_modifier,
            is_enabled: true,
            custom_event_by: contributor_id.to_string(),
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub async fn list_enabled(
        db: &SurrealDbClient,
        event_type: &str,
    ) -> Result<Vec<Self>, AppError> {
        let events: Vec<Self> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE event_type = $event_type AND is_enabled = true
                 ORDER BY name ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("event_type", event_type.to_owned()))
            .await?
            .take(0)?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn payload(name: &str, max: i64) -> WorkEventPayload {
        WorkEventPayload {
            event_type: "work".into(),
            name: name.into(),
            description: "Carry crates at the docks".into(),
            reward_range_min: 10,
            reward_range_max: max,
            good_event_description: Some("A tip from the captain".into()),
            good_event_modifier: Some(1.5),
            bad_event_description: None,
            bad_event_modifier: None,
            purchase_info: None,
        }
    }

    #[test]
    fn event_id_is_stable_per_type_and_name() {
        let a = WorkEvent::from_payload(&payload(" Dock work ", 20), "7");
        let b = WorkEvent::from_payload(&payload("Dock work", 40), "8");
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "Dock work");
        assert!(a.is_enabled);
    }

    #[tokio::test]
    async fn list_enabled_filters_by_type() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");

        db.store_item(WorkEvent::from_payload(&payload("Dock work", 20), "7"))
            .await
            .expect("store work");

        let mut other = WorkEvent::from_payload(&payload("Street show", 20), "7");
        other.event_type = "sell_body".into();
        other.id = WorkEvent::id_for(&other.event_type, &other.name);
        db.store_item(other).await.expect("store other");

        let mut disabled = WorkEvent::from_payload(&payload("Night shift", 20), "7");
        disabled.is_enabled = false;
        db.store_item(disabled).await.expect("store disabled");

        let events = WorkEvent::list_enabled(&db, "work").await.expect("list");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Dock work");
    }
}
