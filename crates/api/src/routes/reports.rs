// ---------------------------------------------------------------------------
// Report routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;

use patchscout_analysis::{
    csv_filename, csv_report, dashboard_stats, json_report, summary_report, DashboardStats,
    JsonReport, SummaryReport,
};

use super::scans::require_scan;
use crate::error::ApiError;
use crate::state::AppState;

/// Scans listed on the dashboard.
const RECENT_SCANS: i64 = 5;

pub async fn json(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<JsonReport>, ApiError> {
    let scan = require_scan(&state, id).await?;
    let vulnerabilities = state.storage.scan_vulnerabilities(id).await?;
    let results = state.storage.list_tool_results(id).await?;
    Ok(Json(json_report(&scan, &vulnerabilities, &results)))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SummaryReport>, ApiError> {
    let scan = require_scan(&state, id).await?;
    let vulnerabilities = state.storage.scan_vulnerabilities(id).await?;
    Ok(Json(summary_report(&scan, &vulnerabilities)))
}

pub async fn csv(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    require_scan(&state, id).await?;
    let vulnerabilities = state.storage.scan_vulnerabilities(id).await?;
    let disposition = format!("attachment; filename={}", csv_filename(id, Utc::now()));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv_report(&vulnerabilities),
    )
        .into_response())
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, ApiError> {
    let scans = state.storage.scan_status_totals().await?;
    let severities = state.storage.severity_totals(None).await?;
    let recent = state.storage.recent_scans(RECENT_SCANS).await?;
    Ok(Json(dashboard_stats(&scans, &severities, &recent)))
}
