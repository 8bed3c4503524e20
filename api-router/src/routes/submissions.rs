use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use common::storage::types::pending_submission::{
    EntryType, SubmissionPayload, SubmissionStatus,
};
use review_pipeline::VoteOutcome;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SubmissionRequest {
    pub proposer_id: String,
    pub origin_channel_id: String,
    pub entry_type: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: String,
    pub status: SubmissionStatus,
    pub expires_at: DateTime<Utc>,
    pub review_message_id: Option<i64>,
}

pub async fn create_submission(
    State(state): State<ApiState>,
    Json(request): Json<SubmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.proposer_id.trim().is_empty() || request.origin_channel_id.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "proposer_id and origin_channel_id are required".to_string(),
        ));
    }

    let entry_type: EntryType = request.entry_type.parse()?;
    let payload = SubmissionPayload::from_parts(entry_type, request.payload)?;
    let submission = state
        .ledger
        .submit(payload, &request.proposer_id, &request.origin_channel_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmissionResponse {
            id: submission.id,
            status: submission.status,
            expires_at: submission.expires_at,
            review_message_id: submission.review_message_id,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct VoteEvent {
    pub channel_id: String,
    pub message_id: i64,
}

fn outcome_label(outcome: VoteOutcome) -> &'static str {
    match outcome {
        VoteOutcome::Ignored => "ignored",
        VoteOutcome::StillOpen { .. } => "open",
        VoteOutcome::Approved => "approved",
        VoteOutcome::Rejected => "rejected",
        VoteOutcome::AlreadyDecided(_) => "already_decided",
    }
}

/// Reaction event relay. Voters get no error feedback, failures are only logged.
pub async fn record_vote(
    State(state): State<ApiState>,
    Json(event): Json<VoteEvent>,
) -> impl IntoResponse {
    let outcome = match state
        .ledger
        .handle_vote(&event.channel_id, event.message_id)
        .await
    {
        Ok(outcome) => outcome_label(outcome),
        Err(err) => {
            error!(channel_id = %event.channel_id, message_id = event.message_id, error = %err, "vote processing failed");
            "failed"
        }
    };

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "outcome": outcome })),
    )
}
