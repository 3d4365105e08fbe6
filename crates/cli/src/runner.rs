//! Foreground commands: one-shot scans, tool listing, CVE import

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use patchscout_common::{
    CveRecord, EventSink, NewScan, ScanEvent, ScanLauncher, ScanParameters, ScanStatus, Storage,
    ToolKind,
};
use patchscout_notify::{EventHub, DEFAULT_CAPACITY};
use patchscout_orchestrator::{Notifier, Orchestrator, ScanRunner};
use patchscout_storage::SqliteStorage;

use crate::args::{EngineArgs, ScanArgs};
use crate::output::print_results;

/// Storage, adapters and runner wired the same way for every command.
pub struct Engine {
    pub storage: Arc<dyn Storage>,
    pub runner: ScanRunner,
}

impl Engine {
    pub fn build(
        storage: Arc<dyn Storage>,
        args: &EngineArgs,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let adapters = args
            .adapter_config()
            .build()
            .context("Failed to build scanner adapters")?;
        let orchestrator =
            Orchestrator::new(storage.clone(), sink.clone(), args.orchestrator_config())
                .with_adapters(adapters);
        let runner = ScanRunner::new(
            storage.clone(),
            Arc::new(orchestrator),
            sink,
            args.runner_config(),
        );
        Ok(Self { storage, runner })
    }
}

pub async fn open_storage(database_url: Option<&str>) -> Result<Arc<dyn Storage>> {
    let storage = match database_url {
        Some(url) => SqliteStorage::connect(url)
            .await
            .with_context(|| format!("Failed to open database {}", url))?,
        None => SqliteStorage::in_memory().await?,
    };
    Ok(Arc::new(storage))
}

pub async fn run_scan(args: ScanArgs) -> Result<()> {
    let parameters = ScanParameters {
        scan_type: args.scan_type,
        aggressiveness: args.aggressiveness,
        port_range: args.ports.clone(),
        exclude_ports: args.exclude_ports.clone(),
        include_nse: !args.no_nse,
        compliance_frameworks: args.compliance.clone(),
    };
    let request = NewScan::new(args.target.trim())
        .with_tools(args.tools.clone())
        .with_parameters(parameters);

    info!("Starting scan...");
    info!("Target: {}", request.target);
    info!("Tools: {}", request.selected_tools.join(", "));
    info!("Ports: {}", args.ports);

    let storage = open_storage(args.database_url.as_deref()).await?;
    let hub = EventHub::new(DEFAULT_CAPACITY);
    let progress = tokio::spawn(log_progress(hub.subscribe()));
    let sink = Arc::new(Notifier::new().with_sink(Arc::new(hub)));
    let engine = Engine::build(storage, &args.engine, sink)?;

    let started = Instant::now();
    let scan = engine.runner.launch(request).await?;
    let scan = tokio::select! {
        finished = engine.runner.wait(scan.id) => finished?,
        _ = tokio::signal::ctrl_c() => {
            warn!(scan_id = scan.id, "interrupted, cancelling scan");
            engine.runner.cancel(scan.id).await?
        }
    };
    progress.abort();

    let vulnerabilities = engine.storage.scan_vulnerabilities(scan.id).await?;
    let tool_results = engine.storage.list_tool_results(scan.id).await?;
    print_results(
        &scan,
        &vulnerabilities,
        &tool_results,
        &args.output_format,
        started.elapsed(),
    )?;

    if scan.status == ScanStatus::Failed {
        bail!("Scan {} failed", scan.id);
    }
    Ok(())
}

/// Relays tool progress to the log while a foreground scan runs.
async fn log_progress(mut rx: broadcast::Receiver<Arc<ScanEvent>>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event.as_ref() {
            ScanEvent::ToolStarted { tool, .. } => info!("{} started", tool),
            ScanEvent::ToolCompleted {
                tool,
                status,
                vulnerabilities_found,
                duration_seconds,
                error,
                ..
            } => match error {
                Some(error) => warn!("{} {} after {:.1}s: {}", tool, status, duration_seconds, error),
                None => info!(
                    "{} {} with {} finding(s) in {:.1}s",
                    tool, status, vulnerabilities_found, duration_seconds
                ),
            },
            _ => {}
        }
    }
}

pub fn list_tools(args: &EngineArgs) -> Result<()> {
    let config = args.adapter_config();

    println!("\n{:-<60}", "");
    println!("{:<10} {:<8} {:<40}", "TOOL", "MODE", "ENDPOINT");
    println!("{:-<60}", "");
    for tool in ToolKind::ALL {
        let endpoint = match tool {
            ToolKind::Nmap => config.nmap_binary.clone(),
            ToolKind::Nikto => config.nikto_binary.clone(),
            ToolKind::Nuclei => config.nuclei_binary.clone(),
            ToolKind::OpenVas => config.openvas.url.clone().unwrap_or_else(|| "-".into()),
            ToolKind::Nessus => config.nessus.url.clone().unwrap_or_else(|| "-".into()),
        };
        println!(
            "{:<10} {:<8} {:<40}",
            tool.as_str(),
            config.mode(tool).as_str(),
            endpoint
        );
    }
    println!();

    // Surfaces missing credentials for tools in real or auto mode.
    config.build().context("Adapter configuration is incomplete")?;
    Ok(())
}

pub async fn import_cves(file: &Path, database_url: &str) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records: Vec<CveRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of CVE records", file.display()))?;

    let storage = SqliteStorage::connect(database_url).await?;
    let mut imported = 0;
    for record in &records {
        if record.cve_id.trim().is_empty() {
            warn!("Skipping CVE record without an id");
            continue;
        }
        storage.upsert_cve(record).await?;
        imported += 1;
    }

    info!("Imported {} CVE record(s) into {}", imported, database_url);
    Ok(())
}
