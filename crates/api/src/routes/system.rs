// ---------------------------------------------------------------------------
// System routes: health check + service info
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use patchscout_common::{ToolKind, VERSION};

use crate::state::AppState;

const APP_NAME: &str = "PatchScout";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app_name: &'static str,
    pub version: &'static str,
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub active_scans: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        app_name: APP_NAME,
        version: VERSION,
        timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_scans: state.runner.active_scans().await,
    })
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub app_name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub health: &'static str,
    pub scanning_tools: Vec<&'static str>,
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        app_name: APP_NAME,
        version: VERSION,
        description: "Centralized Vulnerability Detection System",
        health: "/health",
        scanning_tools: ToolKind::ALL.iter().map(ToolKind::as_str).collect(),
    })
}
