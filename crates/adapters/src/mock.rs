//! Deterministic sample adapters
//!
//! Every tool has a fixed, documented set of sample findings so scans can run
//! without the real scanners installed. Outcomes carry `mode: mock`.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use patchscout_common::{
    AdapterError, Finding, NetworkSummary, OutcomeMode, ScanOutcome, ScanParameters,
    ScannerAdapter, ToolKind,
};

/// Simulated run time per tool.
#[must_use]
pub const fn default_delay(tool: ToolKind) -> Duration {
    match tool {
        ToolKind::OpenVas => Duration::from_secs(3),
        ToolKind::Nmap | ToolKind::Nessus | ToolKind::Nikto => Duration::from_secs(2),
        ToolKind::Nuclei => Duration::from_secs(1),
    }
}

/// Sample outcome for `tool` against `target`.
#[must_use]
pub fn sample_outcome(tool: ToolKind, target: &str) -> ScanOutcome {
    let outcome = ScanOutcome::new(tool, OutcomeMode::Mock)
        .with_version("mock")
        .with_command(format!("mock {} {}", tool, target));

    match tool {
        ToolKind::Nmap => outcome
            .with_ports_scanned(1000)
            .with_network(NetworkSummary {
                open_ports: vec![22, 80, 443],
                services: vec!["ssh".into(), "http".into(), "https".into()],
                os_fingerprint: Some("Linux 4.15 - 5.6".into()),
            })
            .with_findings(vec![Finding::new("OpenSSH User Enumeration Vulnerability")
                .with_cve("CVE-2018-15473")
                .with_description("OpenSSH 7.2p2 is vulnerable to user enumeration")
                .with_severity("medium")
                .with_cvss(5.3)
                .with_component("OpenSSH 7.2p2")
                .with_port(22)
                .with_service("ssh")
                .with_exploit_status("poc_available")
                .with_solution("Upgrade OpenSSH to version 7.8 or later")
                .with_reference("https://www.cve.org/CVERecord?id=CVE-2018-15473")]),
        ToolKind::OpenVas => outcome.with_findings(vec![Finding::new(
            "SQL Injection in Web Application",
        )
        .with_cve("CVE-2024-3456")
        .with_description("SQL injection vulnerability allows unauthorized database access")
        .with_severity("high")
        .with_cvss(8.6)
        .with_component("Web Application")
        .with_exploit_status("poc_available")
        .with_solution("Implement parameterized queries and input validation")
        .with_reference("https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2024-3456")]),
        ToolKind::Nessus => outcome.with_findings(vec![Finding::new(
            "Outdated SSL/TLS Configuration",
        )
        .with_cve("CVE-2024-7890")
        .with_description("Server supports outdated SSL/TLS protocols")
        .with_severity("medium")
        .with_cvss(5.9)
        .with_component("SSL/TLS Service")
        .with_port(443)
        .with_service("https")
        .with_exploit_status("manual")
        .with_solution("Disable SSLv3 and TLS 1.0/1.1, enable TLS 1.2/1.3 only")
        .with_reference("https://www.nessus.org/plugins/")]),
        ToolKind::Nikto => outcome.with_findings(vec![Finding::new("Exposed Admin Panel")
            .with_description("Admin panel accessible without authentication at /admin")
            .with_severity("high")
            .with_cvss(7.5)
            .with_component("Web Server")
            .with_port(80)
            .with_service("http")
            .with_exploit_status("manual")
            .with_solution("Implement authentication for admin panel")
            .with_reference("https://cirt.net/Nikto2")]),
        ToolKind::Nuclei => outcome.with_findings(vec![Finding::new("Missing Security Headers")
            .with_description("Critical security headers are missing: X-Frame-Options, Content-Security-Policy")
            .with_severity("low")
            .with_cvss(3.7)
            .with_component("Web Server")
            .with_exploit_status("manual")
            .with_solution("Add security headers to web server configuration")
            .with_tags(["misconfiguration", "security-headers"])]),
    }
}

/// Adapter that returns [`sample_outcome`] after a cancellable delay.
pub struct MockAdapter {
    tool: ToolKind,
    delay: Duration,
}

impl MockAdapter {
    #[must_use]
    pub fn new(tool: ToolKind) -> Self {
        Self {
            tool,
            delay: default_delay(tool),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ScannerAdapter for MockAdapter {
    async fn scan(
        &self,
        target: &str,
        _params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }
        Ok(sample_outcome(self.tool, target))
    }

    fn tool(&self) -> ToolKind {
        self.tool
    }

    fn mode(&self) -> OutcomeMode {
        OutcomeMode::Mock
    }
}
