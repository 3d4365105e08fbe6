//! Finding normalization
//!
//! Adapters report severity and exploit status as free text. The tables below
//! map the known spellings onto the canonical enums; anything else falls to
//! the documented default branch.

use chrono::Utc;
use uuid::Uuid;

use crate::types::{ExploitStatus, Finding, NewVulnerability, Severity, ToolKind};

/// Severity assigned when the reported text is missing or unrecognized.
pub const DEFAULT_SEVERITY: Severity = Severity::Medium;

/// Exploit status assigned when the reported text is missing or unrecognized.
pub const DEFAULT_EXPLOIT_STATUS: ExploitStatus = ExploitStatus::NotAvailable;

/// Title used when an adapter reports a finding without one.
pub const DEFAULT_TITLE: &str = "Unknown Vulnerability";

const SEVERITY_TABLE: &[(&str, Severity)] = &[
    ("critical", Severity::Critical),
    ("high", Severity::High),
    ("medium", Severity::Medium),
    ("low", Severity::Low),
    ("info", Severity::Info),
];

const EXPLOIT_STATUS_TABLE: &[(&str, ExploitStatus)] = &[
    ("available", ExploitStatus::Available),
    ("poc_available", ExploitStatus::PocAvailable),
    ("manual", ExploitStatus::Manual),
    ("not_available", ExploitStatus::NotAvailable),
];

fn lookup<T: Copy>(table: &[(&str, T)], raw: Option<&str>) -> Option<T> {
    let key = raw?.trim().to_ascii_lowercase();
    table
        .iter()
        .find_map(|(name, value)| (*name == key).then_some(*value))
}

/// Map free-text severity to the enum, defaulting to [`DEFAULT_SEVERITY`].
#[must_use]
pub fn normalize_severity(raw: Option<&str>) -> Severity {
    lookup(SEVERITY_TABLE, raw).unwrap_or(DEFAULT_SEVERITY)
}

/// Map free-text exploit status to the enum, defaulting to [`DEFAULT_EXPLOIT_STATUS`].
#[must_use]
pub fn normalize_exploit_status(raw: Option<&str>) -> ExploitStatus {
    lookup(EXPLOIT_STATUS_TABLE, raw).unwrap_or(DEFAULT_EXPLOIT_STATUS)
}

/// Severity band for a CVSS base score.
#[must_use]
pub fn cvss_to_severity(score: f64) -> Severity {
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score > 0.0 {
        Severity::Low
    } else {
        Severity::Info
    }
}

/// Turn an adapter finding into a record ready for persistence.
///
/// The vulnerability id is the CVE id when present, otherwise
/// `<discoverer>-<uuid>`.
#[must_use]
pub fn normalize_finding(finding: Finding, tool: ToolKind) -> NewVulnerability {
    let discovered_by = finding
        .discovered_by
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| tool.as_str().to_string());
    let cve_id = finding.cve_id.filter(|s| !s.trim().is_empty());
    let vulnerability_id = cve_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", discovered_by, Uuid::new_v4().simple()));

    NewVulnerability {
        vulnerability_id,
        cve_id,
        title: finding
            .title
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        description: finding.description,
        severity: normalize_severity(finding.severity.as_deref()),
        cvss_score: finding.cvss_score,
        cvss_vector: finding.cvss_vector,
        affected_component: finding.affected_component,
        affected_version: finding.affected_version,
        port: finding.port,
        service: finding.service,
        discovered_by,
        exploit_status: normalize_exploit_status(finding.exploit_status.as_deref()),
        solution: finding.solution,
        references: finding.references,
        tags: finding.tags,
        evidence: finding.evidence,
        discovered_at: Utc::now(),
    }
}
