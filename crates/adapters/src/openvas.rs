//! OpenVAS adapter
//!
//! Drives a Greenbone `openvasd` scanner over its HTTP API: create a scan,
//! start it, poll its status, then fetch and delete it.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use patchscout_common::{
    normalize::cvss_to_severity, AdapterError, Finding, OutcomeMode, ScanOutcome, ScanParameters,
    ScannerAdapter, ToolKind,
};
use patchscout_target::{effective_ports, port_ranges, Target};

use crate::http::{build_client, race, send, send_json};
use crate::poll::{poll_until, PollOutcome, PollSettings};

const TOOL: ToolKind = ToolKind::OpenVas;

static CVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"CVE-\d{4}-\d{4,}").expect("valid regex"));
static CVSS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)cvss[^0-9]{0,20}(\d{1,2}(?:\.\d)?)").expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct OpenVasSettings {
    /// Base URL of openvasd, e.g. `https://localhost:3000`.
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// VT OIDs to run; empty means every VT the scanner has loaded.
    pub vts: Vec<String>,
    pub accept_invalid_certs: bool,
    pub request_timeout: Duration,
    pub poll: PollSettings,
}

impl Default for OpenVasSettings {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            vts: Vec::new(),
            accept_invalid_certs: true,
            request_timeout: Duration::from_secs(30),
            poll: PollSettings::new(Duration::from_secs(5), 120),
        }
    }
}

#[derive(Debug, Serialize)]
struct PortRange {
    start: u16,
    end: u16,
}

#[derive(Debug, Serialize)]
struct PortSpec {
    protocol: &'static str,
    range: Vec<PortRange>,
}

#[derive(Debug, Deserialize)]
struct ScanStatusBody {
    status: String,
}

/// One entry of `GET /scans/{id}/results`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenVasResult {
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Only `alarm` results describe vulnerabilities; logs and host markers are dropped.
#[must_use]
pub fn result_to_finding(result: &OpenVasResult) -> Option<Finding> {
    if result.kind != "alarm" {
        return None;
    }
    let message = result.message.clone().unwrap_or_default();
    let headline = message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(120).collect::<String>());
    let title = headline.unwrap_or_else(|| {
        format!(
            "OpenVAS finding {}",
            result.oid.as_deref().unwrap_or("unknown")
        )
    });

    let mut finding = Finding::new(title)
        .with_description(message.clone())
        .with_evidence(message.clone())
        .with_exploit_status("not_available");
    if let Some(host) = result.hostname.clone().or_else(|| result.ip_address.clone()) {
        finding = finding.with_component(host);
    }
    if let Some(port) = result.port.and_then(|p| u16::try_from(p).ok()).filter(|p| *p > 0) {
        finding = finding.with_port(port);
    }
    if let Some(proto) = &result.protocol {
        finding = finding.with_service(proto.clone());
    }
    if let Some(cve) = CVE_RE.find(&message) {
        finding = finding.with_cve(cve.as_str());
    }
    if let Some(score) = CVSS_RE
        .captures(&message)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|s| (0.0..=10.0).contains(s))
    {
        finding = finding
            .with_cvss(score)
            .with_severity(cvss_to_severity(score).as_str());
    }
    if let Some(oid) = &result.oid {
        finding = finding.with_tags([format!("oid:{}", oid)]);
    }
    Some(finding)
}

pub struct OpenVasAdapter {
    settings: OpenVasSettings,
    client: Client,
}

impl OpenVasAdapter {
    pub fn new(settings: OpenVasSettings) -> Result<Self, AdapterError> {
        let client = build_client(TOOL, settings.request_timeout, settings.accept_invalid_certs)?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self, base: &str, path: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), path)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) => req.header("X-API-KEY", key),
            None => req,
        }
    }

    async fn vts(&self, base: &str) -> Result<Vec<String>, AdapterError> {
        if !self.settings.vts.is_empty() {
            return Ok(self.settings.vts.clone());
        }
        send_json(TOOL, self.authed(self.client.get(self.endpoint(base, "/vts")))).await
    }

    async fn fetch_results(&self, base: &str, id: &str) -> Result<Vec<OpenVasResult>, AdapterError> {
        let url = self.endpoint(base, &format!("/scans/{}/results", id));
        send_json(TOOL, self.authed(self.client.get(url))).await
    }

    async fn status(&self, base: &str, id: &str) -> Result<String, AdapterError> {
        let url = self.endpoint(base, &format!("/scans/{}/status", id));
        let body: ScanStatusBody = send_json(TOOL, self.authed(self.client.get(url))).await?;
        Ok(body.status)
    }

    /// Fire-and-forget stop for a scan we are abandoning.
    fn stop_in_background(&self, base: &str, id: &str) {
        let req = self
            .authed(self.client.post(self.endpoint(base, &format!("/scans/{}", id))))
            .json(&json!({ "action": "stop" }));
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = send(TOOL, req).await {
                debug!(scan = %id, error = %e, "openvasd stop request failed");
            }
        });
    }
}

#[async_trait]
impl ScannerAdapter for OpenVasAdapter {
    #[instrument(skip(self, params, cancel), fields(tool = "OpenVAS"))]
    async fn scan(
        &self,
        target: &str,
        params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        let base = self
            .settings
            .url
            .clone()
            .ok_or_else(|| AdapterError::unavailable(TOOL.as_str(), "openvasd URL not configured"))?;
        let host = Target::parse(target)
            .map_err(|e| AdapterError::failed(TOOL.as_str(), e.to_string()))?
            .host();
        let ports = effective_ports(&params.port_range, params.exclude_ports.as_deref())
            .map_err(|e| AdapterError::failed(TOOL.as_str(), e.to_string()))?;

        let vts = race(cancel, self.vts(&base)).await?;
        let port_spec = PortSpec {
            protocol: "tcp",
            range: port_ranges(&ports)
                .into_iter()
                .map(|(start, end)| PortRange { start, end })
                .collect(),
        };
        let body = json!({
            "target": {
                "hosts": [host],
                "ports": [port_spec],
            },
            "vts": vts.iter().map(|oid| json!({ "oid": oid })).collect::<Vec<_>>(),
        });

        let scan_id: String = race(
            cancel,
            send_json(TOOL, self.authed(self.client.post(self.endpoint(&base, "/scans"))).json(&body)),
        )
        .await?;
        info!(scan = %scan_id, vts = vts.len(), "openvasd scan created");

        let start = self
            .authed(self.client.post(self.endpoint(&base, &format!("/scans/{}", scan_id))))
            .json(&json!({ "action": "start" }));
        race(cancel, send(TOOL, start)).await?;

        let polled = poll_until(self.settings.poll, cancel, |attempt| {
            let base = base.clone();
            let scan_id = scan_id.clone();
            async move {
                let status = self.status(&base, &scan_id).await?;
                debug!(attempt, status = %status, "openvasd status");
                Ok(matches!(status.as_str(), "succeeded" | "failed" | "stopped").then_some(status))
            }
        })
        .await;

        let finished = match polled {
            Ok(PollOutcome::Finished(status)) => Some(status),
            Ok(PollOutcome::Exhausted) => None,
            Err(e) => {
                if e.is_cancellation() {
                    self.stop_in_background(&base, &scan_id);
                }
                return Err(e);
            }
        };

        if finished.as_deref() == Some("failed") {
            return Err(AdapterError::failed(TOOL.as_str(), format!("scan {} failed", scan_id)));
        }

        let results = race(cancel, self.fetch_results(&base, &scan_id)).await?;
        let findings: Vec<Finding> = results.iter().filter_map(result_to_finding).collect();
        let raw = serde_json::to_string(&results.iter().map(|r| r.id).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut outcome = ScanOutcome::new(TOOL, OutcomeMode::Real)
            .with_findings(findings)
            .with_ports_scanned(ports.len() as u32)
            .with_command(format!("openvasd scan {} against {}", scan_id, host))
            .with_raw_output(raw);

        match finished {
            Some(_) => {
                let delete = self.authed(
                    self.client
                        .delete(self.endpoint(&base, &format!("/scans/{}", scan_id))),
                );
                if let Err(e) = race(cancel, send(TOOL, delete)).await {
                    debug!(scan = %scan_id, error = %e, "openvasd delete failed");
                }
            }
            None => {
                warn!(
                    scan = %scan_id,
                    budget = ?self.settings.poll.budget(),
                    "openvasd scan still running after polling budget, returning partial results"
                );
                outcome = outcome.incomplete();
            }
        }
        Ok(outcome)
    }

    fn tool(&self) -> ToolKind {
        TOOL
    }

    fn mode(&self) -> OutcomeMode {
        OutcomeMode::Real
    }
}
