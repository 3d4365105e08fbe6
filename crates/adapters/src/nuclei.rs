//! Nuclei adapter
//!
//! Runs `nuclei -u <url> -jsonl -silent`; each output line is one template
//! match.

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use patchscout_common::{
    AdapterError, Finding, OutcomeMode, ScanOutcome, ScanParameters, ScannerAdapter, ToolKind,
};
use patchscout_target::Target;

use crate::process::run_command;

const TOOL: ToolKind = ToolKind::Nuclei;

#[derive(Debug, Clone, Deserialize)]
pub struct NucleiMatch {
    #[serde(rename = "template-id", default)]
    pub template_id: String,
    pub info: NucleiInfo,
    #[serde(rename = "matched-at", default)]
    pub matched_at: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NucleiInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remediation: Option<String>,
    #[serde(default)]
    pub reference: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub classification: Option<Classification>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Classification {
    #[serde(rename = "cve-id", default)]
    pub cve_id: Option<Vec<String>>,
    #[serde(rename = "cvss-score", default)]
    pub cvss_score: Option<f64>,
    #[serde(rename = "cvss-metrics", default)]
    pub cvss_metrics: Option<String>,
}

/// Parse JSONL output, skipping lines that are not template matches.
#[must_use]
pub fn parse_jsonl(text: &str) -> Vec<NucleiMatch> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<NucleiMatch>(line) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "skipping unparseable nuclei line");
                None
            }
        })
        .collect()
}

#[must_use]
pub fn match_to_finding(m: &NucleiMatch) -> Finding {
    let info = &m.info;
    let title = info.name.clone().unwrap_or_else(|| m.template_id.clone());
    let mut finding = Finding::new(title)
        .with_component("Web Application")
        .with_exploit_status("manual")
        .with_tags(
            std::iter::once(format!("template:{}", m.template_id))
                .chain(info.tags.clone().unwrap_or_default()),
        );
    if let Some(severity) = &info.severity {
        // nuclei says "unknown" for unrated templates; normalization handles it
        finding = finding.with_severity(severity.clone());
    }
    if let Some(description) = &info.description {
        finding = finding.with_description(description.trim());
    }
    if let Some(remediation) = &info.remediation {
        finding = finding.with_solution(remediation.trim());
    }
    for reference in info.reference.iter().flatten() {
        finding = finding.with_reference(reference.clone());
    }
    if let Some(class) = &info.classification {
        if let Some(cve) = class.cve_id.iter().flatten().next() {
            finding = finding.with_cve(cve.to_ascii_uppercase());
        }
        if let Some(score) = class.cvss_score {
            finding = finding.with_cvss(score);
        }
        if let Some(vector) = &class.cvss_metrics {
            finding = finding.with_cvss_vector(vector.clone());
        }
    }
    if let Some(port) = m.port.as_deref().and_then(|p| p.parse::<u16>().ok()) {
        finding = finding.with_port(port);
    }
    if let Some(at) = &m.matched_at {
        finding = finding.with_evidence(format!("matched at {}", at));
    }
    finding
}

pub struct NucleiAdapter {
    binary: String,
}

impl NucleiAdapter {
    #[must_use]
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NucleiAdapter {
    fn default() -> Self {
        Self::new("nuclei")
    }
}

#[async_trait]
impl ScannerAdapter for NucleiAdapter {
    #[instrument(skip(self, _params, cancel), fields(tool = "Nuclei"))]
    async fn scan(
        &self,
        target: &str,
        _params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        let url = Target::parse(target)
            .map_err(|e| AdapterError::failed(TOOL.as_str(), e.to_string()))?
            .url();
        let args: Vec<String> = ["-u", url.as_str(), "-jsonl", "-silent", "-no-color"]
            .iter()
            .map(|a| a.to_string())
            .collect();

        let output = run_command(TOOL, &self.binary, &args, cancel).await?;
        if !output.succeeded() {
            return Err(AdapterError::failed(
                TOOL.as_str(),
                format!("exit code {:?}: {}", output.exit_code, output.stderr.trim()),
            ));
        }

        let matches = parse_jsonl(&output.stdout);
        debug!(matches = matches.len(), "parsed nuclei output");
        Ok(ScanOutcome::new(TOOL, OutcomeMode::Real)
            .with_findings(matches.iter().map(match_to_finding).collect())
            .with_ports_scanned(1)
            .with_command(output.command_line)
            .with_exit_code(output.exit_code)
            .with_raw_output(output.stdout))
    }

    fn tool(&self) -> ToolKind {
        TOOL
    }

    fn mode(&self) -> OutcomeMode {
        OutcomeMode::Real
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = concat!(
        r#"{"template-id":"CVE-2021-41773","info":{"name":"Apache 2.4.49 - Path Traversal","severity":"critical","description":"Path traversal in Apache HTTP Server 2.4.49.","reference":["https://nvd.nist.gov/vuln/detail/CVE-2021-41773"],"tags":["cve","apache","lfi"],"classification":{"cve-id":["cve-2021-41773"],"cvss-score":7.5,"cvss-metrics":"CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:N/A:N"}},"matched-at":"http://example.com/cgi-bin/.%2e/etc/passwd","port":"80"}"#,
        "\n",
        "[INF] not json\n",
        r#"{"template-id":"http-missing-security-headers","info":{"name":"HTTP Missing Security Headers","severity":"info","tags":["misconfig","headers"]},"matched-at":"http://example.com"}"#,
        "\n",
    );

    #[test]
    fn parses_matches_and_skips_noise() {
        let matches = parse_jsonl(OUTPUT);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].template_id, "CVE-2021-41773");
    }

    #[test]
    fn classification_fills_cve_and_cvss() {
        let matches = parse_jsonl(OUTPUT);
        let finding = match_to_finding(&matches[0]);
        assert_eq!(finding.cve_id.as_deref(), Some("CVE-2021-41773"));
        assert_eq!(finding.cvss_score, Some(7.5));
        assert_eq!(finding.severity.as_deref(), Some("critical"));
        assert_eq!(finding.port, Some(80));
        assert!(finding.tags.contains(&"lfi".to_string()));

        let headers = match_to_finding(&matches[1]);
        assert!(headers.cve_id.is_none());
        assert_eq!(headers.title.as_deref(), Some("HTTP Missing Security Headers"));
        assert_eq!(headers.tags[0], "template:http-missing-security-headers");
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let adapter = NucleiAdapter::new("/nonexistent/nuclei");
        let err = adapter
            .scan("example.com", &ScanParameters::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
