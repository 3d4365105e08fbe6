//! Core traits for PatchScout components
//!
//! The orchestrator depends only on these seams: adapters it fans out to,
//! the persistence layer it writes through, and the sinks it notifies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AdapterError, ScoutResult};
use crate::events::ScanEvent;
use crate::types::{
    CveRecord, NetworkSummary, NewScan, NewVulnerability, OutcomeMode, Page, Scan, ScanFilter,
    ScanOutcome, ScanParameters, ScanStatus, ScanStatusCounts, SeverityCounts, ToolCompletion,
    ToolKind, ToolResult, Vulnerability, VulnerabilityFilter,
};

/// A uniform wrapper around one scanning tool.
#[async_trait]
pub trait ScannerAdapter: Send + Sync {
    /// Run the tool against `target`.
    ///
    /// Implementations must check `cancel` at every network call and polling
    /// iteration and return [`AdapterError::Cancelled`] once it fires.
    async fn scan(
        &self,
        target: &str,
        params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError>;

    /// Tool this adapter drives.
    fn tool(&self) -> ToolKind;

    /// Whether this adapter talks to the live tool.
    fn mode(&self) -> OutcomeMode;
}

/// Persistence backend for scans, findings and tool results.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_scan(&self, scan: &NewScan) -> ScoutResult<Scan>;

    async fn get_scan(&self, id: i64) -> ScoutResult<Option<Scan>>;

    /// Newest first.
    async fn list_scans(&self, filter: &ScanFilter) -> ScoutResult<Page<Scan>>;

    async fn recent_scans(&self, limit: i64) -> ScoutResult<Vec<Scan>>;

    /// Remove a scan with its vulnerabilities and tool results. False if absent.
    async fn delete_scan(&self, id: i64) -> ScoutResult<bool>;

    /// Compare-and-set on the scan status. Returns false if the current
    /// status was not `from`.
    async fn transition_scan(&self, id: i64, from: ScanStatus, to: ScanStatus)
        -> ScoutResult<bool>;

    async fn mark_scan_started(&self, id: i64, started_at: DateTime<Utc>) -> ScoutResult<()>;

    /// Set a terminal status, completion time and duration.
    async fn finish_scan(
        &self,
        id: i64,
        status: ScanStatus,
        completed_at: DateTime<Utc>,
    ) -> ScoutResult<()>;

    async fn update_network_summary(&self, id: i64, summary: &NetworkSummary) -> ScoutResult<()>;

    /// Recount severities from the persisted vulnerability rows and store them on the scan.
    async fn recompute_counts(&self, id: i64) -> ScoutResult<SeverityCounts>;

    async fn create_tool_result(
        &self,
        scan_id: i64,
        tool: &str,
        started_at: DateTime<Utc>,
    ) -> ScoutResult<ToolResult>;

    async fn finish_tool_result(&self, id: i64, completion: &ToolCompletion) -> ScoutResult<()>;

    async fn list_tool_results(&self, scan_id: i64) -> ScoutResult<Vec<ToolResult>>;

    /// Insert in one transaction.
    async fn insert_vulnerabilities(
        &self,
        scan_id: i64,
        vulnerabilities: &[NewVulnerability],
    ) -> ScoutResult<Vec<Vulnerability>>;

    /// Newest first.
    async fn list_vulnerabilities(
        &self,
        filter: &VulnerabilityFilter,
    ) -> ScoutResult<Page<Vulnerability>>;

    /// Every vulnerability of a scan, ordered by id.
    async fn scan_vulnerabilities(&self, scan_id: i64) -> ScoutResult<Vec<Vulnerability>>;

    async fn get_vulnerability(&self, id: i64) -> ScoutResult<Option<Vulnerability>>;

    async fn set_false_positive(&self, id: i64, value: bool)
        -> ScoutResult<Option<Vulnerability>>;

    async fn set_verified(&self, id: i64, value: bool) -> ScoutResult<Option<Vulnerability>>;

    /// Severity totals over all vulnerabilities, or those of one scan.
    async fn severity_totals(&self, scan_id: Option<i64>) -> ScoutResult<SeverityCounts>;

    async fn scan_status_totals(&self) -> ScoutResult<ScanStatusCounts>;

    async fn upsert_cve(&self, record: &CveRecord) -> ScoutResult<()>;

    async fn get_cve(&self, cve_id: &str) -> ScoutResult<Option<CveRecord>>;
}

/// Subscriber to scan lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ScanEvent);
}

/// Something that can create and start a scan (used by the scheduler).
#[async_trait]
pub trait ScanLauncher: Send + Sync {
    async fn launch(&self, request: NewScan) -> ScoutResult<Scan>;
}
