//! Attack-path heuristics
//!
//! Fixed narratives keyed on what a scan exposed: a web compromise when a web
//! port carries findings and anything critical was found, SSH brute force
//! when SSH is exposed, a database breach when a database service is. Steps
//! are tagged with MITRE ATT&CK tactic ids.

use serde::Serialize;

use patchscout_common::{Scan, Severity, Vulnerability};

use crate::services::{classify, effective_service, ServiceClass};

const WEB_PORTS: [u16; 2] = [80, 443];
const GRAPH_NODE_LIMIT: usize = 10;
const GRAPH_LABEL_CHARS: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct AttackStep {
    pub id: &'static str,
    pub name: &'static str,
    pub description: String,
    pub mitre_id: &'static str,
    pub technique: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
}

impl AttackStep {
    fn new(
        id: &'static str,
        name: &'static str,
        description: impl Into<String>,
        mitre_id: &'static str,
        technique: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            description: description.into(),
            mitre_id,
            technique,
            cve: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttackPath {
    pub id: &'static str,
    pub name: &'static str,
    pub severity: Severity,
    pub steps: Vec<AttackStep>,
    pub impact: &'static str,
    pub likelihood: &'static str,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathSummary {
    pub total_paths: usize,
    pub critical_paths: usize,
    pub high_paths: usize,
    pub overall_risk: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MitreMapping {
    pub tactics: Vec<&'static str>,
    pub techniques_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttackPathReport {
    pub scan_id: i64,
    pub target: String,
    pub attack_paths: Vec<AttackPath>,
    pub summary: PathSummary,
    pub mitre_attack_mapping: MitreMapping,
}

fn web_path(target: &str, vulns: &[Vulnerability]) -> Option<AttackPath> {
    let entry = vulns
        .iter()
        .find(|v| v.port.is_some_and(|p| WEB_PORTS.contains(&p)))?;
    if !vulns.iter().any(|v| v.severity == Severity::Critical) {
        return None;
    }

    let port = entry.port.unwrap_or_default();
    let mut exploit = AttackStep::new(
        "exploit",
        "Initial Access",
        format!("Exploit {} on port {}", entry.title, port),
        "TA0001",
        "Exploit Public-Facing Application",
    );
    exploit.cve = entry.cve_id.clone();

    Some(AttackPath {
        id: "path-1",
        name: "Web Application Compromise",
        severity: Severity::Critical,
        steps: vec![
            AttackStep::new(
                "recon",
                "Reconnaissance",
                format!("Attacker scans {target} and identifies open web ports"),
                "TA0043",
                "Active Scanning",
            ),
            exploit,
            AttackStep::new(
                "persistence",
                "Establish Persistence",
                "Attacker creates backdoor for continuous access",
                "TA0003",
                "Web Shell",
            ),
            AttackStep::new(
                "escalate",
                "Privilege Escalation",
                "Elevate privileges to root/administrator",
                "TA0004",
                "Exploitation for Privilege Escalation",
            ),
        ],
        impact: "Complete system compromise with root access",
        likelihood: "High",
        recommendations: vec![
            format!(
                "Immediately patch {}",
                entry.cve_id.as_deref().unwrap_or(&entry.title)
            ),
            "Implement Web Application Firewall (WAF)".to_string(),
            "Enable intrusion detection".to_string(),
            "Regular security assessments".to_string(),
        ],
    })
}

fn is_ssh(vuln: &Vulnerability) -> bool {
    vuln.port == Some(22)
        || effective_service(vuln).is_some_and(|s| s.to_ascii_lowercase().contains("ssh"))
}

fn ssh_path(vulns: &[Vulnerability]) -> Option<AttackPath> {
    if !vulns.iter().any(is_ssh) {
        return None;
    }

    Some(AttackPath {
        id: "path-2",
        name: "SSH Brute Force Attack",
        severity: Severity::High,
        steps: vec![
            AttackStep::new(
                "scan",
                "Network Scanning",
                "Identify SSH service on port 22",
                "TA0043",
                "Active Scanning",
            ),
            AttackStep::new(
                "brute-force",
                "Credential Access",
                "Brute force SSH credentials",
                "TA0006",
                "Brute Force",
            ),
            AttackStep::new(
                "lateral",
                "Lateral Movement",
                "Move to other systems on network",
                "TA0008",
                "Remote Services: SSH",
            ),
            AttackStep::new(
                "exfiltration",
                "Data Exfiltration",
                "Extract sensitive data",
                "TA0010",
                "Exfiltration Over C2 Channel",
            ),
        ],
        impact: "Unauthorized access to sensitive data",
        likelihood: "Medium",
        recommendations: [
            "Implement key-based authentication",
            "Disable password authentication",
            "Use fail2ban or similar tools",
            "Enable multi-factor authentication",
        ]
        .map(String::from)
        .to_vec(),
    })
}

fn database_path(vulns: &[Vulnerability]) -> Option<AttackPath> {
    let entry = vulns
        .iter()
        .find(|v| effective_service(v).is_some_and(|s| classify(s) == ServiceClass::Database))?;
    let port = entry
        .port
        .map_or_else(|| "an unknown port".to_string(), |p| format!("port {p}"));

    Some(AttackPath {
        id: "path-3",
        name: "Database Breach",
        severity: Severity::Critical,
        steps: vec![
            AttackStep::new(
                "discover",
                "Discovery",
                format!("Identify exposed database on {port}"),
                "TA0043",
                "Network Service Discovery",
            ),
            AttackStep::new(
                "exploit-db",
                "Exploitation",
                "Exploit database vulnerability or weak credentials",
                "TA0001",
                "Valid Accounts",
            ),
            AttackStep::new(
                "collection",
                "Data Collection",
                "Extract database contents",
                "TA0009",
                "Data from Information Repositories",
            ),
            AttackStep::new(
                "impact",
                "Impact",
                "Data breach, ransomware, or data destruction",
                "TA0040",
                "Data Encrypted for Impact",
            ),
        ],
        impact: "Massive data breach affecting customer data",
        likelihood: "High",
        recommendations: [
            "Never expose databases directly to internet",
            "Use strong authentication",
            "Encrypt data at rest and in transit",
            "Implement database firewall rules",
        ]
        .map(String::from)
        .to_vec(),
    })
}

/// Derive attack paths from a scan's findings.
pub fn attack_paths(scan: &Scan, vulnerabilities: &[Vulnerability]) -> AttackPathReport {
    let paths: Vec<AttackPath> = [
        web_path(&scan.target, vulnerabilities),
        ssh_path(vulnerabilities),
        database_path(vulnerabilities),
    ]
    .into_iter()
    .flatten()
    .collect();

    let critical_paths = paths
        .iter()
        .filter(|p| p.severity == Severity::Critical)
        .count();
    let high_paths = paths
        .iter()
        .filter(|p| p.severity == Severity::High)
        .count();
    let overall_risk = if critical_paths > 0 {
        "Critical"
    } else if !paths.is_empty() {
        "High"
    } else {
        "Low"
    };

    let mut tactics: Vec<&'static str> = paths
        .iter()
        .flat_map(|p| p.steps.iter().map(|s| s.mitre_id))
        .collect();
    tactics.sort_unstable();
    tactics.dedup();
    let techniques_count = paths.iter().map(|p| p.steps.len()).sum();

    AttackPathReport {
        scan_id: scan.id,
        target: scan.target.clone(),
        summary: PathSummary {
            total_paths: paths.len(),
            critical_paths,
            high_paths,
            overall_risk,
        },
        attack_paths: paths,
        mitre_attack_mapping: MitreMapping {
            tactics,
            techniques_count,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub risk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttackGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub layout: &'static str,
}

fn short_label(title: &str) -> String {
    if title.chars().count() > GRAPH_LABEL_CHARS {
        let head: String = title.chars().take(GRAPH_LABEL_CHARS).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

/// Attacker -> vulnerability -> target graph over the first ten findings.
pub fn attack_graph(scan: &Scan, vulnerabilities: &[Vulnerability]) -> AttackGraph {
    let mut nodes = vec![
        GraphNode {
            id: "attacker".to_string(),
            label: "Attacker".to_string(),
            kind: "threat-actor",
            risk: "critical".to_string(),
            cve: None,
            cvss: None,
        },
        GraphNode {
            id: "target".to_string(),
            label: scan.target.clone(),
            kind: "asset",
            risk: "target".to_string(),
            cve: None,
            cvss: None,
        },
    ];
    let mut edges = Vec::new();

    for vuln in vulnerabilities.iter().take(GRAPH_NODE_LIMIT) {
        let node_id = format!("vuln-{}", vuln.id);
        nodes.push(GraphNode {
            id: node_id.clone(),
            label: short_label(&vuln.title),
            kind: "vulnerability",
            risk: vuln.severity.to_string(),
            cve: vuln.cve_id.clone(),
            cvss: vuln.cvss_score,
        });
        edges.push(GraphEdge {
            from: "attacker".to_string(),
            to: node_id.clone(),
            kind: "exploits",
            label: vuln
                .port
                .map_or_else(|| "Network".to_string(), |p| format!("Port {p}")),
        });
        edges.push(GraphEdge {
            from: node_id,
            to: "target".to_string(),
            kind: "compromises",
            label: vuln.exploit_status.to_string(),
        });
    }

    AttackGraph {
        nodes,
        edges,
        layout: "hierarchical",
    }
}
