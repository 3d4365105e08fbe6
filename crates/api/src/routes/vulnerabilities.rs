// ---------------------------------------------------------------------------
// Vulnerability routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use patchscout_analysis::{vulnerability_summary, VulnerabilitySummary};
use patchscout_common::{
    PageRequest, ScoutError, Severity, Vulnerability, VulnerabilityFilter,
};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListVulnerabilitiesQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub severity: Option<String>,
    pub scan_id: Option<i64>,
    pub cve_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VulnerabilityList {
    pub vulnerabilities: Vec<Vulnerability>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

pub async fn list_vulnerabilities(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListVulnerabilitiesQuery>, QueryRejection>,
) -> Result<Json<VulnerabilityList>, ApiError> {
    let Query(query) = query?;
    let severity = query
        .severity
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Severity>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let filter = VulnerabilityFilter {
        severity,
        scan_id: query.scan_id,
        cve_id: query.cve_id.filter(|c| !c.is_empty()),
        title: None,
        page: PageRequest::new(query.page, query.page_size),
    };

    let page = state.storage.list_vulnerabilities(&filter).await?;
    Ok(Json(VulnerabilityList {
        vulnerabilities: page.items,
        total: page.total,
        page: filter.page.page,
        page_size: filter.page.page_size,
    }))
}

pub async fn summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VulnerabilitySummary>, ApiError> {
    let counts = state.storage.severity_totals(None).await?;
    Ok(Json(vulnerability_summary(&counts)))
}

pub async fn get_vulnerability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vulnerability>, ApiError> {
    let vulnerability = state
        .storage
        .get_vulnerability(id)
        .await?
        .ok_or(ScoutError::VulnerabilityNotFound(id))?;
    Ok(Json(vulnerability))
}

#[derive(Debug, Serialize)]
pub struct Updated {
    pub message: &'static str,
    pub vulnerability: Vulnerability,
}

impl Updated {
    fn new(vulnerability: Vulnerability) -> Self {
        Self {
            message: "Updated successfully",
            vulnerability,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FalsePositiveQuery {
    pub is_false_positive: bool,
}

pub async fn mark_false_positive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    query: Result<Query<FalsePositiveQuery>, QueryRejection>,
) -> Result<Json<Updated>, ApiError> {
    let Query(query) = query?;
    let vulnerability = state
        .storage
        .set_false_positive(id, query.is_false_positive)
        .await?
        .ok_or(ScoutError::VulnerabilityNotFound(id))?;
    info!(vulnerability_id = id, false_positive = query.is_false_positive, "vulnerability triaged");
    Ok(Json(Updated::new(vulnerability)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub verified: bool,
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> Result<Json<Updated>, ApiError> {
    let Query(query) = query?;
    let vulnerability = state
        .storage
        .set_verified(id, query.verified)
        .await?
        .ok_or(ScoutError::VulnerabilityNotFound(id))?;
    info!(vulnerability_id = id, verified = query.verified, "vulnerability verified");
    Ok(Json(Updated::new(vulnerability)))
}
