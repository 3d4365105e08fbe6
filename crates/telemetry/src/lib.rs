//! Logging and metrics setup shared by the binaries

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected compact or json)")),
        }
    }
}

/// Filter directive for a `-v` count. `RUST_LOG` overrides it.
#[must_use]
pub fn level_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

pub fn init_logging(verbose: u8, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_for(verbose)));

    match format {
        LogFormat::Compact => fmt().with_env_filter(filter).compact().init(),
        LogFormat::Json => fmt().with_env_filter(filter).json().init(),
    }
}

/// Starts the Prometheus scrape endpoint on `addr` and registers metric
/// descriptions. Must be called from inside a tokio runtime.
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to start metrics exporter on {addr}"))?;
    describe_metrics();
    info!(%addr, "prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("patchscout_scans_total", "Scans finished, by final status");
    describe_counter!("patchscout_tool_runs_total", "Adapter runs, by tool and status");
    describe_histogram!(
        "patchscout_tool_duration_seconds",
        Unit::Seconds,
        "Wall time of each adapter run"
    );
    describe_counter!(
        "patchscout_vulnerabilities_ingested_total",
        "Findings persisted, by severity"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), "info");
        assert_eq!(level_for(1), "debug");
        assert_eq!(level_for(5), "trace");
    }

    #[test]
    fn parses_log_format() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
