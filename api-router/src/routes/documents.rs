use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::knowledge_document::{Corpus, DocumentKind, KnowledgeDocument};
use review_pipeline::IndexJob;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub corpus: Corpus,
}

pub async fn create_document(
    State(state): State<ApiState>,
    Json(request): Json<DocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.title.trim().is_empty() || request.content.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "title and content are required".to_string(),
        ));
    }

    let kind = match request.corpus {
        Corpus::Tutorial => DocumentKind::Tutorial,
        Corpus::WorldBook => DocumentKind::GeneralKnowledge,
    };
    let scope = request
        .scope
        .map(|scope| scope.trim().to_string())
        .filter(|scope| !scope.is_empty());
    let document = KnowledgeDocument::new(
        kind,
        request.title.trim().to_string(),
        request.content,
        scope,
        json!({ "source": "api" }),
    );
    let id = document.id.clone();

    state
        .db
        .store_item(document)
        .await
        .map_err(common::error::AppError::from)?;
    state.indexing.enqueue(IndexJob::Index(id.clone()))?;
    info!(document_id = %id, corpus = %request.corpus, "document stored, indexing queued");

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn delete_document(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !KnowledgeDocument::delete_with_chunks(&state.db, &id).await? {
        return Err(ApiError::NotFound(format!("document {id}")));
    }
    info!(document_id = %id, "document deleted");

    Ok(Json(json!({ "deleted": id })))
}
