use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use common::storage::types::thread_setting::{SearchMode, ThreadSetting};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct SearchModeResponse {
    pub thread_id: String,
    pub search_mode: SearchMode,
}

#[derive(Debug, Deserialize)]
pub struct SearchModeUpdate {
    pub search_mode: String,
}

pub async fn get_search_mode(
    State(state): State<ApiState>,
    Path(thread_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let search_mode = ThreadSetting::get_search_mode(&state.db, &thread_id).await?;

    Ok(Json(SearchModeResponse {
        thread_id,
        search_mode,
    }))
}

pub async fn set_search_mode(
    State(state): State<ApiState>,
    Path(thread_id): Path<String>,
    Json(update): Json<SearchModeUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let mode: SearchMode = update.search_mode.parse()?;
    let setting = ThreadSetting::set_search_mode(&state.db, &thread_id, mode).await?;
    info!(%thread_id, search_mode = %setting.search_mode, "thread search mode updated");

    Ok(Json(SearchModeResponse {
        thread_id: setting.thread_id,
        search_mode: setting.search_mode,
    }))
}
