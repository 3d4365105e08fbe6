//! Orchestrator - fan-out of scanner adapters and single-writer aggregation
//!
//! Every selected tool runs in its own task and only returns a value; the
//! collector loop in [`Orchestrator::execute`] is the one place that writes
//! tool results, vulnerabilities and the network summary for a scan.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use patchscout_common::normalize::normalize_finding;
use patchscout_common::{
    AdapterError, EventSink, NetworkSummary, Scan, ScanEvent, ScanOutcome, ScannerAdapter,
    ScoutError, ScoutResult, Storage, ToolCompletion, ToolKind,
};

use crate::progress::{ProgressSnapshot, ProgressTracker};

/// What to do with tool names that do not resolve to a registered adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownToolPolicy {
    /// Log and drop the name; the remaining tools still run.
    #[default]
    Skip,
    /// Fail the whole scan before any tool starts.
    Reject,
}

impl FromStr for UnknownToolPolicy {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "reject" => Ok(Self::Reject),
            other => Err(ScoutError::Config(format!(
                "invalid unknown-tool policy '{}' (expected skip or reject)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub unknown_tools: UnknownToolPolicy,
    /// Upper bound on a single adapter call.
    pub tool_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            unknown_tools: UnknownToolPolicy::Skip,
            tool_timeout: Duration::from_secs(3600),
        }
    }
}

/// Summary of one [`Orchestrator::execute`] call.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    pub scan_id: i64,
    pub tools: Vec<ToolKind>,
    pub skipped: Vec<String>,
    pub progress: ProgressSnapshot,
    pub vulnerabilities: usize,
    pub network: NetworkSummary,
}

/// Value a tool task hands back to the collector.
struct ToolRun {
    tool: ToolKind,
    row_id: i64,
    started_at: DateTime<Utc>,
    result: Result<ScanOutcome, AdapterError>,
}

/// Orchestrator runs the selected adapters for a scan and records their results.
pub struct Orchestrator {
    adapters: HashMap<ToolKind, Arc<dyn ScannerAdapter>>,
    storage: Arc<dyn Storage>,
    sink: Arc<dyn EventSink>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<dyn Storage>,
        sink: Arc<dyn EventSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            adapters: HashMap::new(),
            storage,
            sink,
            config,
        }
    }

    /// Register an adapter under the tool it drives, replacing any previous one.
    pub fn add_adapter(&mut self, adapter: Arc<dyn ScannerAdapter>) {
        self.adapters.insert(adapter.tool(), adapter);
    }

    #[must_use]
    pub fn with_adapters<I>(mut self, adapters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ScannerAdapter>>,
    {
        for adapter in adapters {
            self.add_adapter(adapter);
        }
        self
    }

    /// Registered tools with their adapter mode, in canonical order.
    #[must_use]
    pub fn registered(&self) -> Vec<(ToolKind, Arc<dyn ScannerAdapter>)> {
        ToolKind::ALL
            .iter()
            .filter_map(|tool| self.adapters.get(tool).map(|a| (*tool, Arc::clone(a))))
            .collect()
    }

    fn select_adapter(&self, tool: ToolKind) -> ScoutResult<Arc<dyn ScannerAdapter>> {
        self.adapters
            .get(&tool)
            .cloned()
            .ok_or_else(|| ScoutError::UnknownTool(format!("Scanner '{}' not registered", tool)))
    }

    /// Map tool names onto registered adapters. Duplicates collapse to one run.
    ///
    /// Returns the tools to run and the names that were skipped.
    pub fn resolve_tools(
        &self,
        names: &[String],
    ) -> ScoutResult<(Vec<(ToolKind, Arc<dyn ScannerAdapter>)>, Vec<String>)> {
        let mut selected: Vec<(ToolKind, Arc<dyn ScannerAdapter>)> = Vec::new();
        let mut skipped = Vec::new();

        for name in names {
            let resolved = name
                .parse::<ToolKind>()
                .and_then(|tool| self.select_adapter(tool).map(|a| (tool, a)));
            match resolved {
                Ok((tool, adapter)) => {
                    if !selected.iter().any(|(t, _)| *t == tool) {
                        selected.push((tool, adapter));
                    }
                }
                Err(e) => match self.config.unknown_tools {
                    UnknownToolPolicy::Skip => {
                        warn!(tool = %name, error = %e, "skipping unknown tool");
                        skipped.push(name.clone());
                    }
                    UnknownToolPolicy::Reject => return Err(e),
                },
            }
        }
        Ok((selected, skipped))
    }

    /// Run every selected tool for `scan` concurrently and persist the results.
    ///
    /// Cancelling `cancel` stops the adapters; their rows are finished as
    /// failed and the call returns normally so the caller can decide the
    /// scan's terminal status.
    #[instrument(skip_all, fields(scan_id = scan.id, target = %scan.target))]
    pub async fn execute(
        &self,
        scan: &Scan,
        cancel: CancellationToken,
    ) -> ScoutResult<OrchestrationReport> {
        let (selected, skipped) = self.resolve_tools(&scan.selected_tools)?;
        let progress = ProgressTracker::new(scan.id);
        progress.set_total(selected.len()).await;

        let mut report = OrchestrationReport {
            scan_id: scan.id,
            tools: selected.iter().map(|(t, _)| *t).collect(),
            skipped,
            ..Default::default()
        };
        info!(tools = ?report.tools, "dispatching adapters");

        // Rows exist before any adapter starts.
        let mut dispatch = Vec::with_capacity(selected.len());
        for (tool, adapter) in selected {
            let started_at = Utc::now();
            let row = self
                .storage
                .create_tool_result(scan.id, tool.as_str(), started_at)
                .await?;
            self.sink
                .publish(&ScanEvent::ToolStarted {
                    scan_id: scan.id,
                    tool: tool.as_str().to_string(),
                })
                .await;
            dispatch.push((tool, row.id, started_at, adapter));
        }

        let mut pending: HashMap<i64, (ToolKind, DateTime<Utc>)> = HashMap::new();
        let mut tasks = JoinSet::new();
        for (tool, row_id, started_at, adapter) in dispatch {
            pending.insert(row_id, (tool, started_at));
            let target = scan.target.clone();
            let params = scan.parameters.clone();
            let token = cancel.child_token();
            let limit = self.config.tool_timeout;

            tasks.spawn(async move {
                let result =
                    match tokio::time::timeout(limit, adapter.scan(&target, &params, &token)).await {
                        Ok(result) => result,
                        Err(_) => {
                            token.cancel();
                            Err(AdapterError::Timeout(limit))
                        }
                    };
                ToolRun {
                    tool,
                    row_id,
                    started_at,
                    result,
                }
            });
        }

        // Storage failures are held back until every task has been drained.
        let mut first_error = None;
        let mut network = NetworkSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => {
                    pending.remove(&run.row_id);
                    if let Err(e) = self
                        .apply(scan, run, &progress, &mut report, &mut network)
                        .await
                    {
                        error!(error = %e, "failed to record tool result");
                        first_error.get_or_insert(e);
                    }
                }
                Err(e) => error!(error = %e, "adapter task did not finish"),
            }
        }

        // Anything still pending belongs to a task that panicked.
        for (row_id, (tool, started_at)) in pending {
            let completion = ToolCompletion::failed("adapter task panicked", started_at);
            if let Err(e) = self.storage.finish_tool_result(row_id, &completion).await {
                error!(tool = %tool, error = %e, "failed to record tool result");
                first_error.get_or_insert(e);
            }
            progress.increment_failed().await;
            self.record_tool_metrics(tool, &completion);
            self.publish_tool_completed(scan.id, tool, &completion).await;
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if !network.is_empty() {
            self.storage
                .update_network_summary(scan.id, &network)
                .await?;
        }
        report.network = network;
        report.progress = progress.snapshot().await;
        progress.log_summary().await;
        Ok(report)
    }

    async fn apply(
        &self,
        scan: &Scan,
        run: ToolRun,
        progress: &ProgressTracker,
        report: &mut OrchestrationReport,
        network: &mut NetworkSummary,
    ) -> ScoutResult<()> {
        let ToolRun {
            tool,
            row_id,
            started_at,
            result,
        } = run;

        let completion = match result {
            Ok(outcome) => match self.ingest(scan, tool, &outcome, network).await {
                Ok(found) => {
                    if !outcome.complete {
                        warn!(tool = %tool, "tool returned partial results");
                    }
                    debug!(tool = %tool, mode = %outcome.mode, found, "tool finished");
                    report.vulnerabilities += found;
                    progress.increment_completed().await;
                    ToolCompletion::from_outcome(&outcome, found, started_at)
                }
                Err(e) => {
                    error!(tool = %tool, error = %e, "could not store tool findings");
                    progress.increment_failed().await;
                    ToolCompletion::failed(e.to_string(), started_at)
                }
            },
            Err(e) => {
                if e.is_cancellation() {
                    info!(tool = %tool, "tool cancelled");
                } else {
                    warn!(tool = %tool, error = %e, "tool failed");
                }
                progress.increment_failed().await;
                ToolCompletion::failed(e.to_string(), started_at)
            }
        };

        self.storage.finish_tool_result(row_id, &completion).await?;
        self.record_tool_metrics(tool, &completion);
        self.publish_tool_completed(scan.id, tool, &completion).await;
        Ok(())
    }

    /// Persist one tool's findings and fold its network summary into the scan's.
    async fn ingest(
        &self,
        scan: &Scan,
        tool: ToolKind,
        outcome: &ScanOutcome,
        network: &mut NetworkSummary,
    ) -> ScoutResult<usize> {
        let findings: Vec<_> = outcome
            .findings
            .iter()
            .cloned()
            .map(|f| normalize_finding(f, tool))
            .collect();
        let stored = self
            .storage
            .insert_vulnerabilities(scan.id, &findings)
            .await?;
        for vulnerability in &stored {
            metrics::counter!(
                "patchscout_vulnerabilities_ingested_total",
                "severity" => vulnerability.severity.as_str()
            )
            .increment(1);
            self.sink
                .publish(&ScanEvent::VulnerabilityFound {
                    scan_id: scan.id,
                    target: scan.target.clone(),
                    vulnerability: Box::new(vulnerability.clone()),
                })
                .await;
        }
        if let Some(summary) = &outcome.network {
            network.merge(summary);
        }
        Ok(stored.len())
    }

    fn record_tool_metrics(&self, tool: ToolKind, completion: &ToolCompletion) {
        metrics::counter!(
            "patchscout_tool_runs_total",
            "tool" => tool.as_str(),
            "status" => completion.status.as_str()
        )
        .increment(1);
        metrics::histogram!("patchscout_tool_duration_seconds", "tool" => tool.as_str())
            .record(completion.duration_seconds);
    }

    async fn publish_tool_completed(&self, scan_id: i64, tool: ToolKind, c: &ToolCompletion) {
        self.sink
            .publish(&ScanEvent::ToolCompleted {
                scan_id,
                tool: tool.as_str().to_string(),
                status: c.status,
                mode: c.mode,
                vulnerabilities_found: c.vulnerabilities_found,
                duration_seconds: c.duration_seconds,
                error: c.error_message.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use patchscout_adapters::{AdapterConfig, AdapterMode, MockAdapter};
    use chrono::{DateTime, Utc};
    use patchscout_common::{
        CveRecord, NewScan, NewVulnerability, OutcomeMode, Page, ScanFilter, ScanParameters,
        ScanStatus, ScanStatusCounts, Severity, SeverityCounts, ToolResult, ToolStatus,
        Vulnerability, VulnerabilityFilter,
    };
    use patchscout_storage::SqliteStorage;

    use crate::notifier::Notifier;

    struct Broken(ToolKind);

    #[async_trait]
    impl ScannerAdapter for Broken {
        async fn scan(
            &self,
            _target: &str,
            _params: &ScanParameters,
            _cancel: &CancellationToken,
        ) -> Result<ScanOutcome, AdapterError> {
            Err(AdapterError::failed(self.0.as_str(), "connection reset"))
        }

        fn tool(&self) -> ToolKind {
            self.0
        }

        fn mode(&self) -> OutcomeMode {
            OutcomeMode::Real
        }
    }

    /// Nikto reports items through a non-zero exit status.
    struct NiktoWithItems;

    #[async_trait]
    impl ScannerAdapter for NiktoWithItems {
        async fn scan(
            &self,
            target: &str,
            _params: &ScanParameters,
            _cancel: &CancellationToken,
        ) -> Result<ScanOutcome, AdapterError> {
            Ok(patchscout_adapters::sample_outcome(ToolKind::Nikto, target)
                .with_exit_code(Some(1)))
        }

        fn tool(&self) -> ToolKind {
            ToolKind::Nikto
        }

        fn mode(&self) -> OutcomeMode {
            OutcomeMode::Real
        }
    }

    /// SQLite storage that refuses to store findings reported by one tool.
    struct RefusesFindingsFrom {
        inner: SqliteStorage,
        tool: ToolKind,
    }

    #[async_trait]
    impl Storage for RefusesFindingsFrom {
        async fn create_scan(&self, scan: &NewScan) -> ScoutResult<Scan> {
            self.inner.create_scan(scan).await
        }
        async fn get_scan(&self, id: i64) -> ScoutResult<Option<Scan>> {
            self.inner.get_scan(id).await
        }
        async fn list_scans(&self, filter: &ScanFilter) -> ScoutResult<Page<Scan>> {
            self.inner.list_scans(filter).await
        }
        async fn recent_scans(&self, limit: i64) -> ScoutResult<Vec<Scan>> {
            self.inner.recent_scans(limit).await
        }
        async fn delete_scan(&self, id: i64) -> ScoutResult<bool> {
            self.inner.delete_scan(id).await
        }
        async fn transition_scan(
            &self,
            id: i64,
            from: ScanStatus,
            to: ScanStatus,
        ) -> ScoutResult<bool> {
            self.inner.transition_scan(id, from, to).await
        }
        async fn mark_scan_started(&self, id: i64, at: DateTime<Utc>) -> ScoutResult<()> {
            self.inner.mark_scan_started(id, at).await
        }
        async fn finish_scan(
            &self,
            id: i64,
            status: ScanStatus,
            at: DateTime<Utc>,
        ) -> ScoutResult<()> {
            self.inner.finish_scan(id, status, at).await
        }
        async fn update_network_summary(
            &self,
            id: i64,
            summary: &NetworkSummary,
        ) -> ScoutResult<()> {
            self.inner.update_network_summary(id, summary).await
        }
        async fn recompute_counts(&self, id: i64) -> ScoutResult<SeverityCounts> {
            self.inner.recompute_counts(id).await
        }
        async fn create_tool_result(
            &self,
            scan_id: i64,
            tool: &str,
            at: DateTime<Utc>,
        ) -> ScoutResult<ToolResult> {
            self.inner.create_tool_result(scan_id, tool, at).await
        }
        async fn finish_tool_result(&self, id: i64, c: &ToolCompletion) -> ScoutResult<()> {
            self.inner.finish_tool_result(id, c).await
        }
        async fn list_tool_results(&self, scan_id: i64) -> ScoutResult<Vec<ToolResult>> {
            self.inner.list_tool_results(scan_id).await
        }
        async fn insert_vulnerabilities(
            &self,
            scan_id: i64,
            vulnerabilities: &[NewVulnerability],
        ) -> ScoutResult<Vec<Vulnerability>> {
            if vulnerabilities
                .iter()
                .any(|v| v.discovered_by == self.tool.as_str())
            {
                return Err(ScoutError::Storage("disk I/O error".into()));
            }
            self.inner.insert_vulnerabilities(scan_id, vulnerabilities).await
        }
        async fn list_vulnerabilities(
            &self,
            filter: &VulnerabilityFilter,
        ) -> ScoutResult<Page<Vulnerability>> {
            self.inner.list_vulnerabilities(filter).await
        }
        async fn scan_vulnerabilities(&self, scan_id: i64) -> ScoutResult<Vec<Vulnerability>> {
            self.inner.scan_vulnerabilities(scan_id).await
        }
        async fn get_vulnerability(&self, id: i64) -> ScoutResult<Option<Vulnerability>> {
            self.inner.get_vulnerability(id).await
        }
        async fn set_false_positive(
            &self,
            id: i64,
            value: bool,
        ) -> ScoutResult<Option<Vulnerability>> {
            self.inner.set_false_positive(id, value).await
        }
        async fn set_verified(&self, id: i64, value: bool) -> ScoutResult<Option<Vulnerability>> {
            self.inner.set_verified(id, value).await
        }
        async fn severity_totals(&self, scan_id: Option<i64>) -> ScoutResult<SeverityCounts> {
            self.inner.severity_totals(scan_id).await
        }
        async fn scan_status_totals(&self) -> ScoutResult<ScanStatusCounts> {
            self.inner.scan_status_totals().await
        }
        async fn upsert_cve(&self, record: &CveRecord) -> ScoutResult<()> {
            self.inner.upsert_cve(record).await
        }
        async fn get_cve(&self, cve_id: &str) -> ScoutResult<Option<CveRecord>> {
            self.inner.get_cve(cve_id).await
        }
    }

    async fn setup(config: OrchestratorConfig) -> (Arc<SqliteStorage>, Orchestrator) {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let orchestrator = Orchestrator::new(storage.clone(), Arc::new(Notifier::new()), config)
            .with_adapters(AdapterConfig::all_mock().build().unwrap());
        (storage, orchestrator)
    }

    async fn scan_with(storage: &SqliteStorage, tools: &[&str]) -> Scan {
        storage
            .create_scan(&NewScan::new("example.com").with_tools(tools.iter().copied()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn openvas_mock_persists_one_finding() {
        let (storage, orchestrator) = setup(OrchestratorConfig::default()).await;
        let scan = scan_with(&storage, &["OpenVAS"]).await;

        let report = orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.vulnerabilities, 1);

        let vulns = storage.scan_vulnerabilities(scan.id).await.unwrap();
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].title, "SQL Injection in Web Application");
        assert_eq!(vulns[0].severity, Severity::High);
        assert_eq!(vulns[0].cvss_score, Some(8.6));

        let rows = storage.list_tool_results(scan.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ToolStatus::Complete);
        assert_eq!(rows[0].vulnerabilities_found, 1);
    }

    #[tokio::test]
    async fn unknown_tools_are_skipped_by_default() {
        let (storage, orchestrator) = setup(OrchestratorConfig::default()).await;
        let scan = scan_with(&storage, &["Nikto", "Metasploit", "nikto"]).await;

        let report = orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.tools, vec![ToolKind::Nikto]);
        assert_eq!(report.skipped, vec!["Metasploit".to_string()]);
        assert_eq!(storage.list_tool_results(scan.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tools_can_be_rejected() {
        let (storage, orchestrator) = setup(OrchestratorConfig {
            unknown_tools: UnknownToolPolicy::Reject,
            ..Default::default()
        })
        .await;
        let scan = scan_with(&storage, &["Nmap", "Metasploit"]).await;

        let err = orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::UnknownTool(_)));
        assert!(storage.list_tool_results(scan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_tool_does_not_stop_the_others() {
        let (storage, mut orchestrator) = setup(OrchestratorConfig::default()).await;
        orchestrator.add_adapter(Arc::new(Broken(ToolKind::Nessus)));
        let scan = scan_with(&storage, &["Nessus", "OpenVAS", "Nuclei"]).await;

        let report = orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.progress.failed, 1);
        assert_eq!(report.progress.completed, 2);

        let rows = storage.list_tool_results(scan.id).await.unwrap();
        let nessus = rows.iter().find(|r| r.tool_name == "Nessus").unwrap();
        assert_eq!(nessus.status, ToolStatus::Failed);
        assert!(nessus.error_message.as_deref().unwrap().contains("connection reset"));
        assert_eq!(storage.scan_vulnerabilities(scan.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exit_code_is_recorded_on_the_tool_row() {
        let (storage, mut orchestrator) = setup(OrchestratorConfig::default()).await;
        orchestrator.add_adapter(Arc::new(NiktoWithItems));
        let scan = scan_with(&storage, &["Nikto"]).await;

        orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        let rows = storage.list_tool_results(scan.id).await.unwrap();
        assert_eq!(rows[0].status, ToolStatus::Complete);
        assert_eq!(rows[0].exit_code, Some(1));
        assert!(rows[0].error_message.is_none());
    }

    #[tokio::test]
    async fn storage_error_fails_only_that_tool() {
        let storage = Arc::new(RefusesFindingsFrom {
            inner: SqliteStorage::in_memory().await.unwrap(),
            tool: ToolKind::OpenVas,
        });
        let mut orchestrator = Orchestrator::new(
            storage.clone(),
            Arc::new(Notifier::new()),
            OrchestratorConfig::default(),
        )
        .with_adapters(AdapterConfig::all_mock().build().unwrap());
        orchestrator.add_adapter(Arc::new(
            MockAdapter::new(ToolKind::Nessus).with_delay(Duration::from_millis(100)),
        ));
        let scan = storage
            .create_scan(&NewScan::new("example.com").with_tools(["OpenVAS", "Nessus"]))
            .await
            .unwrap();

        let report = orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.progress.failed, 1);
        assert_eq!(report.progress.completed, 1);

        let rows = storage.list_tool_results(scan.id).await.unwrap();
        assert_eq!(rows.len(), 2);
        let openvas = rows.iter().find(|r| r.tool_name == "OpenVAS").unwrap();
        assert_eq!(openvas.status, ToolStatus::Failed);
        assert!(openvas.completed_at.is_some());
        assert!(openvas.error_message.as_deref().unwrap().contains("disk I/O error"));
        let nessus = rows.iter().find(|r| r.tool_name == "Nessus").unwrap();
        assert_eq!(nessus.status, ToolStatus::Complete);
        assert!(nessus.completed_at.is_some());

        let stored = storage.scan_vulnerabilities(scan.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].discovered_by, "Nessus");
    }

    #[tokio::test]
    async fn unreachable_nmap_falls_back_to_sample() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let mut adapters = AdapterConfig::all_mock().with_mode(ToolKind::Nmap, AdapterMode::Auto);
        adapters.nmap_binary = "/nonexistent/nmap".into();
        let orchestrator = Orchestrator::new(
            storage.clone(),
            Arc::new(Notifier::new()),
            OrchestratorConfig::default(),
        )
        .with_adapters(adapters.build().unwrap());
        let scan = scan_with(&storage, &["Nmap"]).await;

        let report = orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.network.open_ports, vec![22, 80, 443]);

        let rows = storage.list_tool_results(scan.id).await.unwrap();
        assert_eq!(rows[0].status, ToolStatus::Complete);
        assert_eq!(rows[0].mode, Some(OutcomeMode::Mock));

        let stored = storage.get_scan(scan.id).await.unwrap().unwrap();
        assert_eq!(stored.open_ports_count, 3);
        assert_eq!(stored.os_fingerprint.as_deref(), Some("Linux 4.15 - 5.6"));
    }

    #[tokio::test]
    async fn slow_tool_hits_the_timeout() {
        let (storage, mut orchestrator) = setup(OrchestratorConfig {
            tool_timeout: Duration::from_millis(50),
            ..Default::default()
        })
        .await;
        orchestrator.add_adapter(Arc::new(
            MockAdapter::new(ToolKind::Nessus).with_delay(Duration::from_secs(30)),
        ));
        let scan = scan_with(&storage, &["Nessus"]).await;

        orchestrator
            .execute(&scan, CancellationToken::new())
            .await
            .unwrap();
        let rows = storage.list_tool_results(scan.id).await.unwrap();
        assert_eq!(rows[0].status, ToolStatus::Failed);
        assert!(rows[0].error_message.as_deref().unwrap().starts_with("Timed out"));
    }

    #[tokio::test]
    async fn cancellation_stops_running_tools() {
        let (storage, mut orchestrator) = setup(OrchestratorConfig::default()).await;
        orchestrator.add_adapter(Arc::new(
            MockAdapter::new(ToolKind::OpenVas).with_delay(Duration::from_secs(30)),
        ));
        let scan = scan_with(&storage, &["OpenVAS"]).await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let report = tokio::time::timeout(Duration::from_secs(5), orchestrator.execute(&scan, cancel))
            .await
            .expect("execute returns promptly after cancellation")
            .unwrap();
        assert_eq!(report.progress.failed, 1);
        assert!(storage.scan_vulnerabilities(scan.id).await.unwrap().is_empty());
    }
}
