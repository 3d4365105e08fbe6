// ---------------------------------------------------------------------------
// Scan CRUD routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use patchscout_common::{
    Aggressiveness, NewScan, PageRequest, Scan, ScanFilter, ScanLauncher, ScanParameters,
    ScanStatus, ScanType, ScoutError, ToolKind, ToolResult, ToolStatus, Vulnerability,
};
use patchscout_target::{effective_ports, Target};

use crate::error::ApiError;
use crate::state::AppState;

/// Scan record as the API returns it: the stored row plus live progress.
#[derive(Debug, Serialize)]
pub struct ScanView {
    #[serde(flatten)]
    pub scan: Scan,
    pub progress: u8,
    pub current_tool: Option<String>,
    pub summary: ScanSummary,
}

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub total_vulnerabilities: i64,
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl ScanView {
    /// Completed scans report 100; running scans report the share of tools
    /// that have completed and the first tool still running.
    pub async fn render(state: &AppState, scan: Scan) -> Result<Self, ApiError> {
        let (progress, current_tool) = match scan.status {
            ScanStatus::Completed => (100, None),
            ScanStatus::Running => {
                let rows = state.storage.list_tool_results(scan.id).await?;
                let done = rows.iter().filter(|r| r.status == ToolStatus::Complete).count();
                let total = scan.selected_tools.len().max(1);
                let current = rows
                    .iter()
                    .find(|r| r.status == ToolStatus::Running)
                    .map(|r| r.tool_name.clone());
                (((done * 100) / total).min(100) as u8, current)
            }
            _ => (0, None),
        };

        Ok(Self {
            summary: ScanSummary {
                total_vulnerabilities: scan.total_vulnerabilities,
                critical: scan.critical_count,
                high: scan.high_count,
                medium: scan.medium_count,
                low: scan.low_count,
            },
            progress,
            current_tool,
            scan,
        })
    }
}

pub(super) async fn require_scan(state: &AppState, id: i64) -> Result<Scan, ApiError> {
    Ok(state
        .storage
        .get_scan(id)
        .await?
        .ok_or(ScoutError::ScanNotFound(id))?)
}

// ---------------------------------------------------------------------------
// POST /api/scans - create and start a scan
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfigBody {
    pub selected_tools: Vec<String>,
    pub scan_type: ScanType,
    pub aggressiveness: Aggressiveness,
    pub port_range: String,
    pub exclude_ports: Option<String>,
    pub include_nse: bool,
    pub compliance: Vec<String>,
}

impl Default for ScanConfigBody {
    fn default() -> Self {
        let defaults = ScanParameters::default();
        Self {
            selected_tools: ToolKind::default_selection(),
            scan_type: defaults.scan_type,
            aggressiveness: defaults.aggressiveness,
            port_range: defaults.port_range,
            exclude_ports: defaults.exclude_ports,
            include_nse: defaults.include_nse,
            compliance: defaults.compliance_frameworks,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateScanBody {
    pub target: String,
    #[serde(default)]
    pub scan_config: ScanConfigBody,
}

impl CreateScanBody {
    fn into_request(self) -> Result<NewScan, ApiError> {
        let target = self.target.trim().to_string();
        Target::parse(&target).map_err(|e| ApiError::InvalidInput(e.to_string()))?;

        let config = self.scan_config;
        effective_ports(&config.port_range, config.exclude_ports.as_deref())
            .map_err(|e| ApiError::InvalidInput(format!("invalid port range: {e}")))?;
        if config.selected_tools.iter().all(|t| t.trim().is_empty()) {
            return Err(ApiError::InvalidInput(
                "at least one tool must be selected".into(),
            ));
        }

        let parameters = ScanParameters {
            scan_type: config.scan_type,
            aggressiveness: config.aggressiveness,
            port_range: config.port_range,
            exclude_ports: config.exclude_ports.filter(|e| !e.trim().is_empty()),
            include_nse: config.include_nse,
            compliance_frameworks: config.compliance,
        };
        Ok(NewScan::new(target)
            .with_tools(config.selected_tools)
            .with_parameters(parameters))
    }
}

pub async fn create_scan(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateScanBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ScanView>), ApiError> {
    let Json(body) = payload?;
    let request = body.into_request()?;

    if !state.limiter.try_acquire() {
        return Err(ApiError::RateLimited(format!(
            "scan creation limit of {} per minute exceeded",
            state.limiter.per_minute()
        )));
    }

    let scan = state.runner.launch(request).await?;
    info!(scan_id = scan.id, target = %scan.target, "scan created");
    Ok((StatusCode::CREATED, Json(ScanView::render(&state, scan).await?)))
}

// ---------------------------------------------------------------------------
// GET /api/scans - list scans
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListScansQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScanList {
    pub scans: Vec<ScanView>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

pub async fn list_scans(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListScansQuery>, QueryRejection>,
) -> Result<Json<ScanList>, ApiError> {
    let Query(query) = query?;
    let status = query
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ScanStatus>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let filter = ScanFilter {
        status,
        page: PageRequest::new(query.page, query.page_size),
    };

    let page = state.storage.list_scans(&filter).await?;
    let mut scans = Vec::with_capacity(page.items.len());
    for scan in page.items {
        scans.push(ScanView::render(&state, scan).await?);
    }

    Ok(Json(ScanList {
        scans,
        total: page.total,
        page: filter.page.page,
        page_size: filter.page.page_size,
    }))
}

// ---------------------------------------------------------------------------
// Single-scan routes
// ---------------------------------------------------------------------------

pub async fn get_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ScanView>, ApiError> {
    let scan = require_scan(&state, id).await?;
    Ok(Json(ScanView::render(&state, scan).await?))
}

pub async fn delete_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.runner.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ScanView>, ApiError> {
    let scan = state.runner.cancel(id).await?;
    Ok(Json(ScanView::render(&state, scan).await?))
}

#[derive(Debug, Serialize)]
pub struct ScanVulnerabilities {
    pub scan_id: i64,
    pub vulnerabilities: Vec<Vulnerability>,
    pub total: usize,
}

pub async fn scan_vulnerabilities(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ScanVulnerabilities>, ApiError> {
    require_scan(&state, id).await?;
    let vulnerabilities = state.storage.scan_vulnerabilities(id).await?;
    Ok(Json(ScanVulnerabilities {
        scan_id: id,
        total: vulnerabilities.len(),
        vulnerabilities,
    }))
}

#[derive(Debug, Serialize)]
pub struct ScanResults {
    pub scan_id: i64,
    pub results: Vec<ToolResult>,
    pub total: usize,
}

pub async fn scan_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ScanResults>, ApiError> {
    require_scan(&state, id).await?;
    let results = state.storage.list_tool_results(id).await?;
    Ok(Json(ScanResults {
        scan_id: id,
        total: results.len(),
        results,
    }))
}
