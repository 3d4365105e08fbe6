//! Nmap adapter
//!
//! Runs the `nmap` binary with normal output on stdout and parses open
//! ports, service versions, OS guesses and NSE script blocks out of it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use patchscout_common::{
    AdapterError, Aggressiveness, Finding, NetworkSummary, OutcomeMode, ScanOutcome,
    ScanParameters, ScanType, ScannerAdapter, ToolKind,
};
use patchscout_target::{effective_ports, format_ports, Target};

use crate::process::run_command;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Nmap (\d+\.\d+\S*)").expect("valid regex"));
static PORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)/(tcp|udp)\s+(\S+)\s+(\S+)(?:\s+(.*))?$").expect("valid regex")
});
static OS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:OS details|Running|Aggressive OS guesses):\s*(.+)$").expect("valid regex")
});
static SCRIPT_HEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|[_ ]([\w.-]+):\s?(.*)$").expect("valid regex"));
static CVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").expect("valid regex"));
static OPENSSH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"OpenSSH[ _](\d+)\.(\d+)").expect("valid regex"));

/// One open port line from nmap's port table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    pub version: String,
}

/// Output of one NSE script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub port: Option<u16>,
    pub id: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NmapReport {
    pub version: Option<String>,
    pub ports: Vec<PortEntry>,
    pub os: Option<String>,
    pub scripts: Vec<ScriptOutput>,
}

impl NmapReport {
    pub fn open_ports(&self) -> impl Iterator<Item = &PortEntry> {
        self.ports.iter().filter(|p| p.state == "open")
    }
}

/// Parse nmap's normal (`-oN`) output.
#[must_use]
pub fn parse_normal_output(text: &str) -> NmapReport {
    let mut report = NmapReport::default();
    let mut current_port: Option<u16> = None;
    let mut current_script: Option<ScriptOutput> = None;

    for line in text.lines() {
        if report.version.is_none() {
            if let Some(c) = VERSION_RE.captures(line) {
                report.version = Some(c[1].to_string());
            }
        }

        if let Some(c) = PORT_RE.captures(line) {
            report.scripts.extend(current_script.take());
            let port = c[1].parse().ok();
            current_port = port;
            if let Some(port) = port {
                report.ports.push(PortEntry {
                    port,
                    protocol: c[2].to_string(),
                    state: c[3].to_string(),
                    service: c[4].to_string(),
                    version: c.get(5).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                });
            }
            continue;
        }

        if line.starts_with('|') {
            if let Some(c) = SCRIPT_HEAD_RE.captures(line) {
                report.scripts.extend(current_script.take());
                current_script = Some(ScriptOutput {
                    port: current_port,
                    id: c[1].to_string(),
                    output: c[2].trim().to_string(),
                });
            } else if let Some(script) = current_script.as_mut() {
                let body = line.trim_start_matches(['|', '_']).trim();
                if !script.output.is_empty() {
                    script.output.push('\n');
                }
                script.output.push_str(body);
            }
            continue;
        }

        report.scripts.extend(current_script.take());
        if line.starts_with("Host script results:") {
            current_port = None;
        }
        if report.os.is_none() {
            if let Some(c) = OS_RE.captures(line) {
                report.os = Some(c[1].trim().to_string());
            }
        }
    }
    report.scripts.extend(current_script.take());
    report
}

struct KnownIssue {
    pattern: &'static str,
    cve: &'static str,
    cvss: f64,
    title: &'static str,
    description: &'static str,
}

const KNOWN_ISSUES: &[KnownIssue] = &[
    KnownIssue {
        pattern: "vsftpd 2.3.4",
        cve: "CVE-2011-2523",
        cvss: 10.0,
        title: "vsFTPd 2.3.4 Backdoor Command Execution",
        description: "vsFTPd version 2.3.4 contains a backdoor which allows remote code execution",
    },
    KnownIssue {
        pattern: "ProFTPD 1.3.3c",
        cve: "CVE-2010-4221",
        cvss: 10.0,
        title: "ProFTPD 1.3.3c Backdoor Command Execution",
        description: "ProFTPD 1.3.3c contains a backdoor allowing remote code execution",
    },
    KnownIssue {
        pattern: "Apache httpd 2.4.49",
        cve: "CVE-2021-41773",
        cvss: 9.8,
        title: "Apache HTTP Server 2.4.49 Path Traversal",
        description: "Path traversal and remote code execution vulnerability in Apache 2.4.49",
    },
];

/// Known-vulnerable service versions.
#[must_use]
pub fn check_service(entry: &PortEntry) -> Option<Finding> {
    if let Some(issue) = KNOWN_ISSUES.iter().find(|i| entry.version.contains(i.pattern)) {
        return Some(
            Finding::new(issue.title)
                .with_cve(issue.cve)
                .with_description(issue.description)
                .with_severity("critical")
                .with_cvss(issue.cvss)
                .with_component(entry.version.clone())
                .with_port(entry.port)
                .with_service(entry.service.clone())
                .with_exploit_status("available")
                .with_solution(format!("Upgrade {} to latest secure version", entry.service))
                .with_reference(format!(
                    "https://cve.mitre.org/cgi-bin/cvename.cgi?name={}",
                    issue.cve
                )),
        );
    }

    let c = OPENSSH_RE.captures(&entry.version)?;
    let major: u32 = c[1].parse().ok()?;
    let minor: u32 = c[2].parse().ok()?;
    if (major, minor) < (7, 4) {
        return Some(
            Finding::new("OpenSSH User Enumeration Vulnerability")
                .with_cve("CVE-2018-15473")
                .with_description(format!("{} is vulnerable to user enumeration", entry.version))
                .with_severity("medium")
                .with_cvss(5.3)
                .with_component(entry.version.clone())
                .with_port(entry.port)
                .with_service(entry.service.clone())
                .with_exploit_status("poc_available")
                .with_solution("Upgrade OpenSSH to version 7.8 or later")
                .with_reference("https://www.cve.org/CVERecord?id=CVE-2018-15473"),
        );
    }
    None
}

/// NSE scripts that flag a vulnerability become medium findings.
#[must_use]
pub fn check_script(script: &ScriptOutput, host: &str) -> Option<Finding> {
    if !script.id.contains("vuln") && !script.output.contains("CVE") {
        return None;
    }
    let mut finding = Finding::new(format!("Vulnerability detected by {}", script.id))
        .with_description(script.output.clone())
        .with_severity("medium")
        .with_cvss(5.0)
        .with_component(host.to_string())
        .with_exploit_status("manual")
        .with_solution("Review NSE script output and apply appropriate patches")
        .with_evidence(script.output.clone())
        .discovered_by(format!("Nmap NSE ({})", script.id));
    if let Some(cve) = CVE_RE.find(&script.output) {
        finding = finding.with_cve(cve.as_str());
    }
    if let Some(port) = script.port {
        finding = finding.with_port(port);
    }
    Some(finding)
}

/// Command-line arguments for a scan.
pub fn build_args(host: &str, params: &ScanParameters) -> Result<(Vec<String>, u32), AdapterError> {
    let ports = effective_ports(&params.port_range, params.exclude_ports.as_deref())
        .map_err(|e| AdapterError::failed(ToolKind::Nmap.as_str(), e.to_string()))?;

    let base: &[&str] = match params.aggressiveness {
        Aggressiveness::Low => &["-sV", "-T2", "--max-retries", "1"],
        Aggressiveness::Medium => &["-sV", "-sC", "-T3"],
        Aggressiveness::High => &["-sV", "-sC", "-O", "-T4", "--script", "vuln"],
    };
    let mut args: Vec<String> = base
        .iter()
        .copied()
        .filter(|a| params.include_nse || !matches!(*a, "-sC" | "--script" | "vuln"))
        .map(String::from)
        .collect();

    if params.scan_type == ScanType::Stealth {
        args.push("-Pn".into());
    }
    args.push("-p".into());
    args.push(format_ports(&ports));
    args.push("-oN".into());
    args.push("-".into());
    args.push(host.to_string());
    Ok((args, ports.len() as u32))
}

/// Live Nmap adapter.
pub struct NmapAdapter {
    binary: String,
}

impl NmapAdapter {
    #[must_use]
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NmapAdapter {
    fn default() -> Self {
        Self::new("nmap")
    }
}

#[async_trait]
impl ScannerAdapter for NmapAdapter {
    #[instrument(skip(self, params, cancel), fields(tool = "Nmap"))]
    async fn scan(
        &self,
        target: &str,
        params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        let parsed = Target::parse(target)
            .map_err(|e| AdapterError::failed(ToolKind::Nmap.as_str(), e.to_string()))?;
        let host = parsed.host();
        let (args, port_count) = build_args(&host, params)?;

        let output = run_command(ToolKind::Nmap, &self.binary, &args, cancel).await?;
        if !output.succeeded() {
            return Err(AdapterError::failed(
                ToolKind::Nmap.as_str(),
                format!(
                    "exit code {:?}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            ));
        }

        let report = parse_normal_output(&output.stdout);
        debug!(
            open_ports = report.open_ports().count(),
            scripts = report.scripts.len(),
            "parsed nmap report"
        );

        let mut findings: Vec<Finding> = report.open_ports().filter_map(check_service).collect();
        findings.extend(report.scripts.iter().filter_map(|s| check_script(s, &host)));

        let mut services: Vec<String> = Vec::new();
        for entry in report.open_ports() {
            if !services.contains(&entry.service) {
                services.push(entry.service.clone());
            }
        }
        let network = NetworkSummary {
            open_ports: report.open_ports().map(|p| p.port).collect(),
            services,
            os_fingerprint: report.os.clone(),
        };

        let mut outcome = ScanOutcome::new(ToolKind::Nmap, OutcomeMode::Real)
            .with_findings(findings)
            .with_network(network)
            .with_ports_scanned(port_count)
            .with_command(output.command_line)
            .with_exit_code(output.exit_code)
            .with_raw_output(output.stdout);
        if let Some(version) = report.version {
            outcome = outcome.with_version(version);
        }
        Ok(outcome)
    }

    fn tool(&self) -> ToolKind {
        ToolKind::Nmap
    }

    fn mode(&self) -> OutcomeMode {
        OutcomeMode::Real
    }
}
