//! Shared HTTP plumbing for the API-driven scanners (OpenVAS, Nessus)

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use patchscout_common::{AdapterError, ToolKind};

pub fn build_client(
    tool: ToolKind,
    timeout: Duration,
    accept_invalid_certs: bool,
) -> Result<Client, AdapterError> {
    Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| AdapterError::unavailable(tool.as_str(), format!("HTTP client: {}", e)))
}

/// Await `fut` unless `cancel` fires first.
pub async fn race<T, Fut>(cancel: &CancellationToken, fut: Fut) -> Result<T, AdapterError>
where
    Fut: Future<Output = Result<T, AdapterError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        r = fut => r,
    }
}

/// Classify a transport error: connection problems mean the service is unavailable.
pub fn transport_error(tool: ToolKind, err: reqwest::Error) -> AdapterError {
    if err.is_connect() || err.is_timeout() || err.is_builder() {
        AdapterError::unavailable(tool.as_str(), err.to_string())
    } else {
        AdapterError::failed(tool.as_str(), err.to_string())
    }
}

/// Send a request and reject non-success statuses.
///
/// 401/403 mean bad or missing credentials and count as unavailable.
pub async fn send(tool: ToolKind, request: RequestBuilder) -> Result<Response, AdapterError> {
    let response = request.send().await.map_err(|e| transport_error(tool, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = format!("HTTP {}: {}", status, body.trim());
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        Err(AdapterError::unavailable(tool.as_str(), reason))
    } else {
        Err(AdapterError::failed(tool.as_str(), reason))
    }
}

pub async fn send_json<T: DeserializeOwned>(
    tool: ToolKind,
    request: RequestBuilder,
) -> Result<T, AdapterError> {
    send(tool, request)
        .await?
        .json::<T>()
        .await
        .map_err(|e| AdapterError::parse(tool.as_str(), e.to_string()))
}
