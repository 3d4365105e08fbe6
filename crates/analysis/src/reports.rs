//! Scan reports
//!
//! Every report is rendered from records the caller has already loaded, so
//! the functions here never touch storage:
//! - [`json_report`]: full machine-readable report of one scan
//! - [`summary_report`]: executive summary with risk level and compliance flags
//! - [`csv_report`]: flat vulnerability export
//! - [`dashboard_stats`] and [`vulnerability_summary`]: platform-wide totals

use chrono::{DateTime, Utc};
use serde::Serialize;

use patchscout_common::{
    Scan, ScanStatus, ScanStatusCounts, ScanType, Severity, SeverityCounts,
    ToolResult, ToolStatus, Vulnerability,
};

/// Header row of the CSV export.
pub const CSV_HEADER: &str =
    "ID,CVE,Title,Severity,CVSS,Port,Service,Component,Exploit Status,Solution";

const CSV_SOLUTION_CHARS: usize = 100;
const TOP_VULNERABILITIES: usize = 5;

const NEXT_STEPS: [&str; 5] = [
    "Patch critical vulnerabilities immediately",
    "Implement WAF for web applications",
    "Enable intrusion detection systems",
    "Conduct penetration testing",
    "Schedule regular security assessments",
];

/// Coarse risk bucket of the executive summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > 7.0 {
            RiskLevel::Critical
        } else if score > 4.0 {
            RiskLevel::High
        } else if score > 2.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compliance {
    #[serde(rename = "Non-Compliant")]
    NonCompliant,
    #[serde(rename = "Partially Compliant")]
    PartiallyCompliant,
}

impl Compliance {
    fn above(score: f64, threshold: f64) -> Self {
        if score > threshold {
            Compliance::NonCompliant
        } else {
            Compliance::PartiallyCompliant
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub report_metadata: ReportMetadata,
    pub scan_information: ScanInformation,
    pub executive_summary: ExecutiveSummary,
    pub vulnerabilities: Vec<Vulnerability>,
    pub tool_results: Vec<ToolSummary>,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub report_type: &'static str,
    pub patchscout_version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanInformation {
    pub scan_id: i64,
    pub target: String,
    pub scan_type: ScanType,
    pub status: ScanStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub tools_used: Vec<String>,
    pub aggressiveness: String,
    pub port_range: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SeverityBreakdown {
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

impl From<&SeverityCounts> for SeverityBreakdown {
    fn from(counts: &SeverityCounts) -> Self {
        Self {
            critical: counts.critical,
            high: counts.high,
            medium: counts.medium,
            low: counts.low,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutiveSummary {
    pub total_vulnerabilities: i64,
    pub severity_breakdown: SeverityBreakdown,
    pub risk_score: f64,
    pub open_ports: i64,
    pub services_detected: i64,
    pub os_fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub tool_name: String,
    pub status: ToolStatus,
    pub duration_seconds: Option<f64>,
    pub vulnerabilities_found: i64,
    pub ports_scanned: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ToolResult> for ToolSummary {
    fn from(result: &ToolResult) -> Self {
        Self {
            tool_name: result.tool_name.clone(),
            status: result.status,
            duration_seconds: result.duration_seconds,
            vulnerabilities_found: result.vulnerabilities_found,
            ports_scanned: result.ports_scanned,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub priority: &'static str,
    pub action: String,
    pub impact: &'static str,
    pub effort: &'static str,
}

/// Standing remediation plan, scaled by the scan's own counts.
fn recommendations(counts: &SeverityCounts) -> Vec<Recommendation> {
    vec![
        Recommendation {
            priority: "Critical",
            action: format!(
                "Immediately patch {} critical vulnerabilities",
                counts.critical
            ),
            impact: "Prevents immediate exploitation",
            effort: "High",
        },
        Recommendation {
            priority: "High",
            action: format!(
                "Address {} high-severity vulnerabilities within 7 days",
                counts.high
            ),
            impact: "Reduces attack surface",
            effort: "Medium",
        },
        Recommendation {
            priority: "Medium",
            action: "Implement continuous security monitoring".to_string(),
            impact: "Early threat detection",
            effort: "Low",
        },
        Recommendation {
            priority: "Low",
            action: "Regular vulnerability scans (weekly/monthly)".to_string(),
            impact: "Proactive security posture",
            effort: "Low",
        },
    ]
}

/// Full report of one scan.
pub fn json_report(scan: &Scan, vulnerabilities: &[Vulnerability], results: &[ToolResult]) -> JsonReport {
    let counts = scan.counts();

    JsonReport {
        report_metadata: ReportMetadata {
            generated_at: Utc::now(),
            report_type: "vulnerability_scan",
            patchscout_version: env!("CARGO_PKG_VERSION"),
        },
        scan_information: ScanInformation {
            scan_id: scan.id,
            target: scan.target.clone(),
            scan_type: scan.parameters.scan_type,
            status: scan.status,
            started_at: scan.started_at,
            completed_at: scan.completed_at,
            duration_seconds: scan.duration_seconds,
            tools_used: scan.selected_tools.clone(),
            aggressiveness: scan.parameters.aggressiveness.to_string(),
            port_range: scan.parameters.port_range.clone(),
        },
        executive_summary: ExecutiveSummary {
            total_vulnerabilities: counts.total,
            severity_breakdown: SeverityBreakdown::from(&counts),
            risk_score: counts.risk_score(),
            open_ports: scan.open_ports_count,
            services_detected: scan.services_detected,
            os_fingerprint: scan.os_fingerprint.clone(),
        },
        vulnerabilities: vulnerabilities.to_vec(),
        tool_results: results.iter().map(ToolSummary::from).collect(),
        recommendations: recommendations(&counts),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub scan_id: i64,
    pub target: String,
    pub scan_date: Option<DateTime<Utc>>,
    pub summary: SummaryFigures,
    pub top_vulnerabilities: Vec<TopVulnerability>,
    pub compliance_status: ComplianceStatus,
    pub next_steps: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryFigures {
    pub total_vulnerabilities: usize,
    pub critical: usize,
    pub high: usize,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopVulnerability {
    pub title: String,
    pub severity: Severity,
    pub cvss: Option<f64>,
    pub cve: Option<String>,
    pub solution: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ComplianceStatus {
    pub pci_dss: Compliance,
    pub nist: Compliance,
    pub iso_27001: Compliance,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Executive summary of one scan.
///
/// The score here weighs only critical (10) and high (7) findings against the
/// total, rounded to two decimals.
pub fn summary_report(scan: &Scan, vulnerabilities: &[Vulnerability]) -> SummaryReport {
    let critical = vulnerabilities
        .iter()
        .filter(|v| v.severity == Severity::Critical)
        .count();
    let high = vulnerabilities
        .iter()
        .filter(|v| v.severity == Severity::High)
        .count();
    let total = vulnerabilities.len();
    let risk_score = round2((critical * 10 + high * 7) as f64 / total.max(1) as f64);

    let mut ranked: Vec<&Vulnerability> = vulnerabilities.iter().collect();
    ranked.sort_by(|a, b| {
        let a = a.cvss_score.unwrap_or(0.0);
        let b = b.cvss_score.unwrap_or(0.0);
        b.total_cmp(&a)
    });

    SummaryReport {
        scan_id: scan.id,
        target: scan.target.clone(),
        scan_date: scan.started_at,
        summary: SummaryFigures {
            total_vulnerabilities: total,
            critical,
            high,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
        },
        top_vulnerabilities: ranked
            .into_iter()
            .take(TOP_VULNERABILITIES)
            .map(|v| TopVulnerability {
                title: v.title.clone(),
                severity: v.severity,
                cvss: v.cvss_score,
                cve: v.cve_id.clone(),
                solution: v.solution.clone(),
            })
            .collect(),
        compliance_status: ComplianceStatus {
            pci_dss: Compliance::above(risk_score, 5.0),
            nist: Compliance::above(risk_score, 6.0),
            iso_27001: Compliance::above(risk_score, 5.0),
        },
        next_steps: NEXT_STEPS.to_vec(),
    }
}

fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.1}")
    } else {
        score.to_string()
    }
}

/// CSV export of a scan's vulnerabilities, header included.
pub fn csv_report(vulnerabilities: &[Vulnerability]) -> String {
    let mut out = String::with_capacity(128 * (vulnerabilities.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');

    for v in vulnerabilities {
        let solution: String = v
            .solution
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(CSV_SOLUTION_CHARS)
            .collect();

        let fields = [
            v.id.to_string(),
            or_na(v.cve_id.clone()),
            v.title.clone(),
            v.severity.to_string(),
            or_na(v.cvss_score.filter(|s| *s > 0.0).map(format_score)),
            or_na(v.port.filter(|p| *p > 0).map(|p| p.to_string())),
            or_na(v.service.clone().filter(|s| !s.is_empty())),
            or_na(v.affected_component.clone().filter(|s| !s.is_empty())),
            v.exploit_status.as_str().to_string(),
            solution,
        ];

        let row: Vec<String> = fields.iter().map(|f| quoted(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Download name of the CSV export, e.g. `patchscout_scan_7_20240131.csv`.
pub fn csv_filename(scan_id: i64, at: DateTime<Utc>) -> String {
    format!("patchscout_scan_{}_{}.csv", scan_id, at.format("%Y%m%d"))
}

#[derive(Debug, Clone, Serialize)]
pub struct VulnerabilitySummary {
    pub total: i64,
    pub by_severity: SeverityBreakdown,
    pub risk_score: f64,
}

/// Severity totals with the weighted risk score; zero when nothing was found.
pub fn vulnerability_summary(counts: &SeverityCounts) -> VulnerabilitySummary {
    VulnerabilitySummary {
        total: counts.total,
        by_severity: SeverityBreakdown::from(counts),
        risk_score: counts.risk_score(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub scans: ScanTotals,
    pub vulnerabilities: VulnerabilityTotals,
    pub risk_score: f64,
    pub recent_scans: Vec<RecentScan>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScanTotals {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VulnerabilityTotals {
    pub total: i64,
    pub critical: i64,
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentScan {
    pub id: i64,
    pub target: String,
    pub status: ScanStatus,
    pub vulnerabilities: i64,
    pub created_at: DateTime<Utc>,
}

pub fn dashboard_stats(
    scans: &ScanStatusCounts,
    severities: &SeverityCounts,
    recent: &[Scan],
) -> DashboardStats {
    DashboardStats {
        scans: ScanTotals {
            total: scans.total,
            active: scans.running,
            completed: scans.completed,
            failed: scans.failed,
        },
        vulnerabilities: VulnerabilityTotals {
            total: severities.total,
            critical: severities.critical,
            high: severities.high,
            medium: severities.medium,
            low: severities.low,
        },
        risk_score: severities.risk_score(),
        recent_scans: recent
            .iter()
            .map(|s| RecentScan {
                id: s.id,
                target: s.target.clone(),
                status: s.status,
                vulnerabilities: s.total_vulnerabilities,
                created_at: s.created_at,
            })
            .collect(),
    }
}
