//! Core data types for PatchScout
//!
//! Enums serialize to the lowercase strings stored in the database and
//! returned by the API. Records keep public fields; builder-style `with_*`
//! methods consume `self` the same way across the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ScoutError;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[inline]
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ScoutError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ScoutError::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

/// Vulnerability severity. Ordered so that `Critical` compares greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(Severity {
    Info => "info",
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExploitStatus {
    Available,
    PocAvailable,
    Manual,
    NotAvailable,
}

string_enum!(ExploitStatus {
    Available => "available",
    PocAvailable => "poc_available",
    Manual => "manual",
    NotAvailable => "not_available",
});

/// Scan lifecycle: pending -> running -> completed | failed | cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

string_enum!(ScanStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

impl ScanStatus {
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    Quick,
    #[default]
    Comprehensive,
    Stealth,
    Custom,
}

string_enum!(ScanType {
    Quick => "quick",
    Comprehensive => "comprehensive",
    Stealth => "stealth",
    Custom => "custom",
});

/// Per-tool execution state of a tool-result row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Idle,
    Running,
    Complete,
    Failed,
}

string_enum!(ToolStatus {
    Idle => "idle",
    Running => "running",
    Complete => "complete",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggressiveness {
    Low,
    #[default]
    Medium,
    High,
}

string_enum!(Aggressiveness {
    Low => "low",
    Medium => "medium",
    High => "high",
});

/// Whether an outcome came from a live tool or from canned sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeMode {
    Mock,
    Real,
}

string_enum!(OutcomeMode {
    Mock => "mock",
    Real => "real",
});

/// The scanning tools the platform knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolKind {
    Nmap,
    #[serde(rename = "OpenVAS")]
    OpenVas,
    Nessus,
    Nikto,
    Nuclei,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Nmap,
        ToolKind::OpenVas,
        ToolKind::Nessus,
        ToolKind::Nikto,
        ToolKind::Nuclei,
    ];

    /// Canonical display name, as stored in `selected_tools` and tool-result rows.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Nmap => "Nmap",
            ToolKind::OpenVas => "OpenVAS",
            ToolKind::Nessus => "Nessus",
            ToolKind::Nikto => "Nikto",
            ToolKind::Nuclei => "Nuclei",
        }
    }

    /// Default tool list for a scan that does not name any.
    #[must_use]
    pub fn default_selection() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolKind {
    type Err = ScoutError;

    /// Case-insensitive match on the canonical names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| ScoutError::UnknownTool(needle.to_string()))
    }
}

/// Scan parameters handed to every adapter. Immutable for the duration of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    pub scan_type: ScanType,
    pub aggressiveness: Aggressiveness,
    pub port_range: String,
    pub exclude_ports: Option<String>,
    pub include_nse: bool,
    pub compliance_frameworks: Vec<String>,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            scan_type: ScanType::Comprehensive,
            aggressiveness: Aggressiveness::Medium,
            port_range: "1-65535".to_string(),
            exclude_ports: None,
            include_nse: true,
            compliance_frameworks: Vec::new(),
        }
    }
}

impl ScanParameters {
    #[inline]
    #[must_use]
    pub fn with_scan_type(mut self, scan_type: ScanType) -> Self {
        self.scan_type = scan_type;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_aggressiveness(mut self, aggressiveness: Aggressiveness) -> Self {
        self.aggressiveness = aggressiveness;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_port_range<S: Into<String>>(mut self, port_range: S) -> Self {
        self.port_range = port_range.into();
        self
    }
}

/// Request to create a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScan {
    pub target: String,
    pub selected_tools: Vec<String>,
    pub parameters: ScanParameters,
}

impl NewScan {
    #[must_use]
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
            selected_tools: ToolKind::default_selection(),
            parameters: ScanParameters::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_parameters(mut self, parameters: ScanParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Persisted scan record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: i64,
    pub target: String,
    pub status: ScanStatus,
    pub selected_tools: Vec<String>,
    #[serde(flatten)]
    pub parameters: ScanParameters,
    pub total_vulnerabilities: i64,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub open_ports_count: i64,
    pub services_detected: i64,
    pub os_fingerprint: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scan {
    #[must_use]
    pub fn counts(&self) -> SeverityCounts {
        SeverityCounts {
            critical: self.critical_count,
            high: self.high_count,
            medium: self.medium_count,
            low: self.low_count,
            info: self.total_vulnerabilities
                - self.critical_count
                - self.high_count
                - self.medium_count
                - self.low_count,
            total: self.total_vulnerabilities,
        }
    }
}

/// A single finding as reported by an adapter, before normalization.
///
/// Severity and exploit status are free text here; see [`crate::normalize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub cve_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub affected_component: Option<String>,
    pub affected_version: Option<String>,
    pub port: Option<u16>,
    pub service: Option<String>,
    pub exploit_status: Option<String>,
    pub solution: Option<String>,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub evidence: Option<String>,
    /// Overrides the tool name as discoverer (e.g. a specific NSE script).
    pub discovered_by: Option<String>,
}

impl Finding {
    #[must_use]
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_cve<S: Into<String>>(mut self, cve_id: S) -> Self {
        self.cve_id = Some(cve_id.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_severity<S: Into<String>>(mut self, severity: S) -> Self {
        self.severity = Some(severity.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cvss(mut self, score: f64) -> Self {
        self.cvss_score = Some(score);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cvss_vector<S: Into<String>>(mut self, vector: S) -> Self {
        self.cvss_vector = Some(vector.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_component<S: Into<String>>(mut self, component: S) -> Self {
        self.affected_component = Some(component.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.affected_version = Some(version.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_exploit_status<S: Into<String>>(mut self, status: S) -> Self {
        self.exploit_status = Some(status.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_solution<S: Into<String>>(mut self, solution: S) -> Self {
        self.solution = Some(solution.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.references.push(reference.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_evidence<S: Into<String>>(mut self, evidence: S) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn discovered_by<S: Into<String>>(mut self, source: S) -> Self {
        self.discovered_by = Some(source.into());
        self
    }
}

/// Host-level facts a network discovery tool can report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub open_ports: Vec<u16>,
    pub services: Vec<String>,
    pub os_fingerprint: Option<String>,
}

impl NetworkSummary {
    /// Fold another tool's view into this one: ports and services are unioned,
    /// the first OS fingerprint seen wins.
    pub fn merge(&mut self, other: &NetworkSummary) {
        for port in &other.open_ports {
            if !self.open_ports.contains(port) {
                self.open_ports.push(*port);
            }
        }
        for service in &other.services {
            if !self.services.contains(service) {
                self.services.push(service.clone());
            }
        }
        if self.os_fingerprint.is_none() {
            self.os_fingerprint = other.os_fingerprint.clone();
        }
        self.open_ports.sort_unstable();
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open_ports.is_empty() && self.services.is_empty() && self.os_fingerprint.is_none()
    }
}

/// What an adapter hands back to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub tool: ToolKind,
    pub tool_version: Option<String>,
    pub mode: OutcomeMode,
    /// False when a polling loop ran out of attempts and only partial results exist.
    pub complete: bool,
    pub findings: Vec<Finding>,
    pub network: Option<NetworkSummary>,
    pub ports_scanned: u32,
    pub hosts_scanned: u32,
    pub command: Option<String>,
    pub raw_output: Option<String>,
    /// Exit status of a process-backed tool.
    pub exit_code: Option<i32>,
}

impl ScanOutcome {
    #[must_use]
    pub fn new(tool: ToolKind, mode: OutcomeMode) -> Self {
        Self {
            tool,
            tool_version: None,
            mode,
            complete: true,
            findings: Vec::new(),
            network: None,
            ports_scanned: 0,
            hosts_scanned: 1,
            command: None,
            raw_output: None,
            exit_code: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_findings(mut self, findings: Vec<Finding>) -> Self {
        self.findings = findings;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_network(mut self, network: NetworkSummary) -> Self {
        self.network = Some(network);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_command<S: Into<String>>(mut self, command: S) -> Self {
        self.command = Some(command.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_raw_output<S: Into<String>>(mut self, raw: S) -> Self {
        self.raw_output = Some(raw.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_ports_scanned(mut self, ports: u32) -> Self {
        self.ports_scanned = ports;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    #[inline]
    #[must_use]
    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }
}

/// A finding after normalization, ready to be persisted against a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVulnerability {
    pub vulnerability_id: String,
    pub cve_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub affected_component: Option<String>,
    pub affected_version: Option<String>,
    pub port: Option<u16>,
    pub service: Option<String>,
    pub discovered_by: String,
    pub exploit_status: ExploitStatus,
    pub solution: Option<String>,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub evidence: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

/// Persisted vulnerability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: i64,
    pub scan_id: i64,
    pub vulnerability_id: String,
    pub cve_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub affected_component: Option<String>,
    pub affected_version: Option<String>,
    pub port: Option<u16>,
    pub service: Option<String>,
    pub discovered_by: String,
    pub exploit_status: ExploitStatus,
    pub solution: Option<String>,
    pub references: Vec<String>,
    pub tags: Vec<String>,
    pub evidence: Option<String>,
    pub false_positive: bool,
    pub verified: bool,
    pub discovered_at: DateTime<Utc>,
}

/// Per-(scan, tool) execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: i64,
    pub scan_id: i64,
    pub tool_name: String,
    pub tool_version: Option<String>,
    pub status: ToolStatus,
    pub mode: Option<OutcomeMode>,
    pub partial: bool,
    pub command: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub raw_output: Option<String>,
    pub parsed_output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
    pub vulnerabilities_found: i64,
    pub ports_scanned: i64,
    pub hosts_scanned: i64,
    pub created_at: DateTime<Utc>,
}

/// Final state written to a tool-result row when its adapter settles.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCompletion {
    pub status: ToolStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub tool_version: Option<String>,
    pub mode: Option<OutcomeMode>,
    pub partial: bool,
    pub command: Option<String>,
    pub raw_output: Option<String>,
    pub parsed_output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub exit_code: Option<i32>,
    pub vulnerabilities_found: i64,
    pub ports_scanned: i64,
    pub hosts_scanned: i64,
}

impl ToolCompletion {
    fn elapsed(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> f64 {
        (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Completion for an adapter that returned an outcome.
    #[must_use]
    pub fn from_outcome(outcome: &ScanOutcome, found: usize, started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        let parsed_output = serde_json::to_value(&outcome.findings).ok();
        Self {
            status: ToolStatus::Complete,
            completed_at,
            duration_seconds: Self::elapsed(started_at, completed_at),
            tool_version: outcome.tool_version.clone(),
            mode: Some(outcome.mode),
            partial: !outcome.complete,
            command: outcome.command.clone(),
            raw_output: outcome.raw_output.clone(),
            parsed_output,
            error_message: None,
            exit_code: outcome.exit_code,
            vulnerabilities_found: found as i64,
            ports_scanned: i64::from(outcome.ports_scanned),
            hosts_scanned: i64::from(outcome.hosts_scanned),
        }
    }

    /// Completion for an adapter that raised.
    #[must_use]
    pub fn failed<S: Into<String>>(message: S, started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        Self {
            status: ToolStatus::Failed,
            completed_at,
            duration_seconds: Self::elapsed(started_at, completed_at),
            tool_version: None,
            mode: None,
            partial: false,
            command: None,
            raw_output: None,
            parsed_output: None,
            error_message: Some(message.into()),
            exit_code: None,
            vulnerabilities_found: 0,
            ports_scanned: 0,
            hosts_scanned: 0,
        }
    }
}

/// Severity tallies for a set of vulnerabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
    pub info: i64,
    pub total: i64,
}

impl SeverityCounts {
    #[must_use]
    pub fn from_severities<I: IntoIterator<Item = Severity>>(severities: I) -> Self {
        let mut counts = Self::default();
        for severity in severities {
            counts.add(severity, 1);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity, n: i64) {
        match severity {
            Severity::Critical => self.critical += n,
            Severity::High => self.high += n,
            Severity::Medium => self.medium += n,
            Severity::Low => self.low += n,
            Severity::Info => self.info += n,
        }
        self.total += n;
    }

    /// Weighted risk: (10·critical + 7·high + 4·medium + low) / max(total, 1).
    #[must_use]
    pub fn risk_score(&self) -> f64 {
        let weighted = self.critical * 10 + self.high * 7 + self.medium * 4 + self.low;
        weighted as f64 / self.total.max(1) as f64
    }
}

/// Scan totals grouped by lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// One page of a listing plus the unpaginated total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Clamp to page >= 1 and 1 <= page_size <= 100.
    #[must_use]
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(Self::DEFAULT_PAGE_SIZE)
                .clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    #[inline]
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub status: Option<ScanStatus>,
    pub page: PageRequest,
}

#[derive(Debug, Clone, Default)]
pub struct VulnerabilityFilter {
    pub severity: Option<Severity>,
    pub scan_id: Option<i64>,
    /// Substring match on the CVE id.
    pub cve_id: Option<String>,
    /// Substring match on the title.
    pub title: Option<String>,
    pub page: PageRequest,
}

/// Reference CVE intelligence, filled by an external sync process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CveRecord {
    pub cve_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cvss_v3_score: Option<f64>,
    pub cvss_v3_vector: Option<String>,
    pub cvss_v2_score: Option<f64>,
    pub cvss_v2_vector: Option<String>,
    pub severity: Option<Severity>,
    pub cwe_ids: Vec<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub affected_products: Vec<String>,
    pub exploit_available: bool,
    pub exploit_maturity: Option<String>,
    pub references: Vec<String>,
    pub mitre_techniques: Vec<String>,
    pub actively_exploited: bool,
    pub epss_score: Option<f64>,
    pub kev_listed: bool,
    pub data_source: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}
