// ---------------------------------------------------------------------------
// Scheduled scan routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use patchscout_scheduler::{JobInfo, Scheduler};

use crate::error::ApiError;
use crate::state::AppState;

fn scheduler(state: &AppState) -> Result<&Arc<Scheduler>, ApiError> {
    state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("scheduler is not enabled".into()))
}

/// Jobs of the scheduler; empty when scheduling is disabled.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<JobInfo>> {
    match &state.scheduler {
        Some(scheduler) => Json(scheduler.list().await),
        None => Json(Vec::new()),
    }
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    scheduler(&state)?
        .remove(&id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    scheduler(&state)?
        .pause(&id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    scheduler(&state)?
        .resume(&id)
        .await
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}
