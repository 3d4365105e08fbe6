//! Nikto adapter
//!
//! Runs `nikto -h <url> -Format json -o -` and turns every reported item into
//! a low-severity finding on the scanned web port.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use patchscout_common::{
    AdapterError, Finding, OutcomeMode, ScanOutcome, ScanParameters, ScannerAdapter, ToolKind,
};
use patchscout_target::Target;

use crate::process::run_command;

const TOOL: ToolKind = ToolKind::Nikto;

#[derive(Debug, Clone, Deserialize)]
pub struct NiktoItem {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub references: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NiktoHost {
    #[serde(default)]
    port: Value,
    #[serde(default)]
    vulnerabilities: Vec<NiktoItem>,
}

/// Nikto emits either a single host object or an array of them, and the port
/// as a string or a number depending on version.
pub fn parse_report(text: &str) -> Result<Vec<(Option<u16>, NiktoItem)>, AdapterError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| AdapterError::parse(TOOL.as_str(), e.to_string()))?;
    let hosts: Vec<NiktoHost> = match value {
        Value::Array(_) => serde_json::from_value(value),
        other => serde_json::from_value(other).map(|h| vec![h]),
    }
    .map_err(|e| AdapterError::parse(TOOL.as_str(), e.to_string()))?;

    Ok(hosts
        .into_iter()
        .flat_map(|host| {
            let port = match &host.port {
                Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                Value::String(s) => s.parse().ok(),
                _ => None,
            };
            host.vulnerabilities.into_iter().map(move |item| (port, item))
        })
        .collect())
}

#[must_use]
pub fn item_to_finding(port: Option<u16>, item: &NiktoItem) -> Finding {
    let title: String = item.msg.chars().take(120).collect();
    let mut finding = Finding::new(title)
        .with_description(item.msg.clone())
        .with_severity("low")
        .with_component("Web Server")
        .with_exploit_status("manual");
    if let Some(port) = port {
        finding = finding
            .with_port(port)
            .with_service(if port == 443 { "https" } else { "http" });
    }
    if let Some(url) = &item.url {
        let method = item.method.as_deref().unwrap_or("GET");
        finding = finding.with_evidence(format!("{} {}", method, url));
    }
    if let Some(refs) = item.references.as_deref().filter(|r| !r.trim().is_empty()) {
        for reference in refs.split_whitespace() {
            finding = finding.with_reference(reference);
        }
    }
    let id = match &item.id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    if let Some(id) = id {
        finding = finding.with_tags([format!("nikto:{}", id)]);
    }
    finding
}

pub struct NiktoAdapter {
    binary: String,
}

impl NiktoAdapter {
    #[must_use]
    pub fn new<S: Into<String>>(binary: S) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NiktoAdapter {
    fn default() -> Self {
        Self::new("nikto")
    }
}

#[async_trait]
impl ScannerAdapter for NiktoAdapter {
    #[instrument(skip(self, _params, cancel), fields(tool = "Nikto"))]
    async fn scan(
        &self,
        target: &str,
        _params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        let parsed = Target::parse(target)
            .map_err(|e| AdapterError::failed(TOOL.as_str(), e.to_string()))?;
        let url = parsed.url();
        let args: Vec<String> = ["-h", url.as_str(), "-Format", "json", "-o", "-", "-nointeractive"]
            .iter()
            .map(|a| a.to_string())
            .collect();

        // Nikto exits non-zero when it reports items, so only the output decides.
        let output = run_command(TOOL, &self.binary, &args, cancel).await?;
        if output.stdout.trim().is_empty() && !output.succeeded() {
            return Err(AdapterError::failed(
                TOOL.as_str(),
                format!("exit code {:?}: {}", output.exit_code, output.stderr.trim()),
            ));
        }

        let items = parse_report(&output.stdout)?;
        debug!(items = items.len(), "parsed nikto report");
        let findings = items
            .iter()
            .map(|(port, item)| item_to_finding(*port, item))
            .collect();

        Ok(ScanOutcome::new(TOOL, OutcomeMode::Real)
            .with_findings(findings)
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

    const REPORT: &str = r#"[{
        "host": "example.com", "ip": "93.184.216.34", "port": "443", "banner": "",
        "vulnerabilities": [
            { "id": "999986", "method": "GET", "url": "/",
              "msg": "The X-Content-Type-Options header is not set.",
              "references": "https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/X-Content-Type-Options" },
            { "id": 600050, "method": "GET", "url": "/admin/", "msg": "/admin/: Admin login page found." }
        ]
    }]"#;

    #[test]
    fn parses_array_report_with_string_port() {
        let items = parse_report(REPORT).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, Some(443));

        let finding = item_to_finding(items[1].0, &items[1].1);
        assert_eq!(finding.severity.as_deref(), Some("low"));
        assert_eq!(finding.service.as_deref(), Some("https"));
        assert_eq!(finding.evidence.as_deref(), Some("GET /admin/"));
        assert_eq!(finding.tags, vec!["nikto:600050".to_string()]);
    }

    #[test]
    fn parses_single_host_object() {
        let items =
            parse_report(r#"{"host":"h","port":80,"vulnerabilities":[{"msg":"Server leaks inodes"}]}"#)
                .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, Some(80));
    }

    #[test]
    fn empty_output_has_no_items() {
        assert!(parse_report("  \n").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_report("not json"), Err(AdapterError::Parse { .. })));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let adapter = NiktoAdapter::new("/nonexistent/nikto");
        let err = adapter
            .scan("http://example.com", &ScanParameters::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
