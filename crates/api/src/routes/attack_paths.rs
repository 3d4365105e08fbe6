// ---------------------------------------------------------------------------
// Attack-path routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use patchscout_analysis::{attack_graph, attack_paths, AttackGraph, AttackPathReport};

use super::scans::require_scan;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn paths(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AttackPathReport>, ApiError> {
    let scan = require_scan(&state, id).await?;
    let vulnerabilities = state.storage.scan_vulnerabilities(id).await?;
    Ok(Json(attack_paths(&scan, &vulnerabilities)))
}

pub async fn graph(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<AttackGraph>, ApiError> {
    let scan = require_scan(&state, id).await?;
    let vulnerabilities = state.storage.scan_vulnerabilities(id).await?;
    Ok(Json(attack_graph(&scan, &vulnerabilities)))
}
