use axum::{extract::State, response::IntoResponse, Json};
use common::storage::types::knowledge_document::Corpus;
use retrieval_pipeline::RetrievedDocument;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub corpus: Corpus,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub documents: Vec<RetrievedDocument>,
}

pub async fn search_knowledge(
    State(state): State<ApiState>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "query must not be empty".to_string(),
        ));
    }

    let documents = state
        .search
        .search(&request.query, request.thread_id.as_deref(), request.corpus)
        .await;

    Ok(Json(SearchResponse { documents }))
}
