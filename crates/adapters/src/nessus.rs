//! Nessus adapter
//!
//! Uses the Nessus REST API with API-key authentication. A scan is created
//! from a policy template, launched, then polled until Nessus reports a
//! terminal status; completed scans are deleted afterwards.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use patchscout_common::{
    AdapterError, Finding, OutcomeMode, ScanOutcome, ScanParameters, ScannerAdapter, ToolKind,
};
use patchscout_target::Target;

use crate::http::{build_client, race, send, send_json};
use crate::poll::{poll_until, PollOutcome, PollSettings};

const TOOL: ToolKind = ToolKind::Nessus;

/// "Basic Network Scan" policy template.
pub const DEFAULT_TEMPLATE_UUID: &str = "731a8e52-3ea6-a291-ec0a-d2ff0619c19d7bd788d6be818b65";

#[derive(Debug, Clone)]
pub struct NessusSettings {
    /// Base URL, e.g. `https://localhost:8834`.
    pub url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub template_uuid: String,
    pub accept_invalid_certs: bool,
    pub request_timeout: Duration,
    pub poll: PollSettings,
}

impl Default for NessusSettings {
    fn default() -> Self {
        Self {
            url: None,
            access_key: None,
            secret_key: None,
            template_uuid: DEFAULT_TEMPLATE_UUID.to_string(),
            accept_invalid_certs: true,
            request_timeout: Duration::from_secs(30),
            poll: PollSettings::new(Duration::from_secs(5), 240),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedScan {
    scan: CreatedScanId,
}

#[derive(Debug, Deserialize)]
struct CreatedScanId {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ScanDetails {
    info: ScanInfo,
    #[serde(default)]
    vulnerabilities: Vec<PluginHit>,
}

#[derive(Debug, Deserialize)]
struct ScanInfo {
    status: String,
}

/// One row of the `vulnerabilities` summary in `GET /scans/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginHit {
    pub plugin_id: i64,
    pub plugin_name: String,
    #[serde(default)]
    pub plugin_family: Option<String>,
    #[serde(default)]
    pub severity: i64,
    #[serde(default)]
    pub count: i64,
}

fn severity_name(level: i64) -> &'static str {
    match level {
        4 => "critical",
        3 => "high",
        2 => "medium",
        1 => "low",
        _ => "info",
    }
}

#[must_use]
pub fn plugin_to_finding(hit: &PluginHit) -> Finding {
    let mut finding = Finding::new(hit.plugin_name.clone())
        .with_severity(severity_name(hit.severity))
        .with_reference(format!("https://www.tenable.com/plugins/nessus/{}", hit.plugin_id))
        .with_tags([format!("plugin:{}", hit.plugin_id)])
        .with_evidence(format!("{} occurrence(s)", hit.count.max(1)));
    if let Some(family) = &hit.plugin_family {
        finding = finding.with_component(family.clone());
    }
    finding
}

fn is_terminal(status: &str) -> bool {
    matches!(status, "completed" | "canceled" | "aborted")
}

pub struct NessusAdapter {
    settings: NessusSettings,
    client: Client,
}

impl NessusAdapter {
    pub fn new(settings: NessusSettings) -> Result<Self, AdapterError> {
        let client = build_client(TOOL, settings.request_timeout, settings.accept_invalid_certs)?;
        Ok(Self { settings, client })
    }

    fn api_keys(&self) -> Result<String, AdapterError> {
        match (&self.settings.access_key, &self.settings.secret_key) {
            (Some(access), Some(secret)) => {
                Ok(format!("accessKey={}; secretKey={}", access, secret))
            }
            _ => Err(AdapterError::unavailable(TOOL.as_str(), "API keys not configured")),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        base: &str,
        path: &str,
        keys: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", base.trim_end_matches('/'), path))
            .header("X-ApiKeys", keys)
    }

    async fn details(&self, base: &str, keys: &str, id: i64) -> Result<ScanDetails, AdapterError> {
        send_json(
            TOOL,
            self.request(reqwest::Method::GET, base, &format!("/scans/{}", id), keys),
        )
        .await
    }

    fn stop_in_background(&self, base: &str, keys: &str, id: i64) {
        let req = self.request(reqwest::Method::POST, base, &format!("/scans/{}/stop", id), keys);
        tokio::spawn(async move {
            if let Err(e) = send(TOOL, req).await {
                debug!(scan = id, error = %e, "nessus stop request failed");
            }
        });
    }
}

#[async_trait]
impl ScannerAdapter for NessusAdapter {
    #[instrument(skip(self, _params, cancel), fields(tool = "Nessus"))]
    async fn scan(
        &self,
        target: &str,
        _params: &ScanParameters,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, AdapterError> {
        let base = self
            .settings
            .url
            .clone()
            .ok_or_else(|| AdapterError::unavailable(TOOL.as_str(), "Nessus URL not configured"))?;
        let keys = self.api_keys()?;
        let host = Target::parse(target)
            .map_err(|e| AdapterError::failed(TOOL.as_str(), e.to_string()))?
            .host();

        let body = json!({
            "uuid": self.settings.template_uuid,
            "settings": {
                "name": format!("patchscout {}", host),
                "text_targets": host,
                "enabled": false,
            },
        });
        let created: CreatedScan = race(
            cancel,
            send_json(
                TOOL,
                self.request(reqwest::Method::POST, &base, "/scans", &keys).json(&body),
            ),
        )
        .await?;
        let scan_id = created.scan.id;
        info!(scan = scan_id, "nessus scan created");

        race(
            cancel,
            send(
                TOOL,
                self.request(
                    reqwest::Method::POST,
                    &base,
                    &format!("/scans/{}/launch", scan_id),
                    &keys,
                ),
            ),
        )
        .await?;

        let polled = poll_until(self.settings.poll, cancel, |attempt| {
            let base = base.clone();
            let keys = keys.clone();
            async move {
                let details = self.details(&base, &keys, scan_id).await?;
                debug!(attempt, status = %details.info.status, "nessus status");
                Ok(is_terminal(&details.info.status).then_some(details))
            }
        })
        .await;

        let (details, complete) = match polled {
            Ok(PollOutcome::Finished(details)) => {
                let complete = details.info.status == "completed";
                (details, complete)
            }
            Ok(PollOutcome::Exhausted) => {
                warn!(
                    scan = scan_id,
                    budget = ?self.settings.poll.budget(),
                    "nessus scan still running after polling budget, returning partial results"
                );
                (race(cancel, self.details(&base, &keys, scan_id)).await?, false)
            }
            Err(e) => {
                if e.is_cancellation() {
                    self.stop_in_background(&base, &keys, scan_id);
                }
                return Err(e);
            }
        };

        if complete {
            let delete =
                self.request(reqwest::Method::DELETE, &base, &format!("/scans/{}", scan_id), &keys);
            if let Err(e) = race(cancel, send(TOOL, delete)).await {
                debug!(scan = scan_id, error = %e, "nessus delete failed");
            }
        }

        let findings: Vec<Finding> = details.vulnerabilities.iter().map(plugin_to_finding).collect();
        let outcome = ScanOutcome::new(TOOL, OutcomeMode::Real)
            .with_findings(findings)
            .with_command(format!("nessus scan {} against {}", scan_id, host))
            .with_raw_output(details.info.status.clone());
        Ok(if complete { outcome } else { outcome.incomplete() })
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
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: String) -> NessusSettings {
        NessusSettings {
            url: Some(url),
            access_key: Some("ak".into()),
            secret_key: Some("sk".into()),
            poll: PollSettings::new(Duration::from_millis(5), 3),
            ..Default::default()
        }
    }

    #[test]
    fn severity_levels_map_to_names() {
        let hit = PluginHit {
            plugin_id: 51192,
            plugin_name: "SSL Certificate Cannot Be Trusted".into(),
            plugin_family: Some("General".into()),
            severity: 2,
            count: 1,
        };
        let finding = plugin_to_finding(&hit);
        assert_eq!(finding.severity.as_deref(), Some("medium"));
        assert_eq!(finding.affected_component.as_deref(), Some("General"));
        assert_eq!(
            finding.references,
            vec!["https://www.tenable.com/plugins/nessus/51192".to_string()]
        );
        assert_eq!(severity_name(4), "critical");
        assert_eq!(severity_name(0), "info");
    }

    #[tokio::test]
    async fn missing_keys_are_unavailable() {
        let adapter = NessusAdapter::new(NessusSettings {
            url: Some("https://localhost:8834".into()),
            ..Default::default()
        })
        .unwrap();
        let err = adapter
            .scan("10.0.0.5", &ScanParameters::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn completed_scan_yields_findings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scans"))
            .and(header("X-ApiKeys", "accessKey=ak; secretKey=sk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scan": { "id": 7 } })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/scans/7/launch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scan_uuid": "x" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/scans/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "info": { "status": "completed" },
                "vulnerabilities": [
                    { "plugin_id": 1, "plugin_name": "Critical thing", "plugin_family": "Web",
                      "severity": 4, "count": 2 },
                    { "plugin_id": 2, "plugin_name": "Banner", "severity": 0, "count": 1 }
                ]
            })))
            .mount(&server)
            .await;

        let adapter = NessusAdapter::new(settings(server.uri())).unwrap();
        let outcome = adapter
            .scan("10.0.0.5", &ScanParameters::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.findings.len(), 2);
        assert_eq!(outcome.findings[0].severity.as_deref(), Some("critical"));
    }

    #[tokio::test]
    async fn aborted_scan_is_incomplete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scans"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "scan": { "id": 9 } })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/scans/9/launch"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/scans/9"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "info": { "status": "aborted" } })),
            )
            .mount(&server)
            .await;

        let adapter = NessusAdapter::new(settings(server.uri())).unwrap();
        let outcome = adapter
            .scan("10.0.0.5", &ScanParameters::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.complete);
        assert!(outcome.findings.is_empty());
    }
}
