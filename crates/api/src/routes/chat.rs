// ---------------------------------------------------------------------------
// Security assistant routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracing::debug;

use patchscout_analysis::{respond, ChatHistory, ChatRequest, ChatResponse};

use super::scans::require_scan;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    request.validate()?;
    let response = respond(state.storage.as_ref(), &request).await?;
    debug!(sources = response.sources.len(), "chat answered");
    Ok(Json(response))
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<i64>,
) -> Result<Json<ChatHistory>, ApiError> {
    require_scan(&state, scan_id).await?;
    Ok(Json(ChatHistory::empty(scan_id)))
}
