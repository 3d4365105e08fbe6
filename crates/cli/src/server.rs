//! `patchscout serve`: wires storage, notifiers, runner and scheduler into the API

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use patchscout_api::state::AppState;
use patchscout_notify::{EmailNotifier, EventHub, DEFAULT_CAPACITY};
use patchscout_orchestrator::{Notifier, RateLimiter};
use patchscout_scheduler::Scheduler;
use patchscout_telemetry::install_metrics_exporter;

use crate::args::ServeArgs;
use crate::runner::{open_storage, Engine};

pub async fn serve(args: ServeArgs) -> Result<()> {
    if let Some(addr) = args.metrics_listen {
        install_metrics_exporter(addr)?;
    }

    let storage = open_storage(Some(&args.database_url)).await?;
    info!(database = %args.database_url, "database ready");

    let hub = EventHub::new(DEFAULT_CAPACITY);
    let mut notifier = Notifier::new().with_sink(Arc::new(hub.clone()));
    let email = args.email.config();
    if email.is_configured() {
        info!(
            recipients = email.recipients.len(),
            min_severity = %email.min_severity,
            "email notifications enabled"
        );
        notifier = notifier.with_sink(Arc::new(EmailNotifier::smtp(email)));
    } else if email.enabled {
        info!("email notifications enabled but SMTP settings are incomplete; skipping");
    }

    let engine = Engine::build(storage, &args.engine, Arc::new(notifier))?;
    let limiter = RateLimiter::new(args.scan_rate, args.scan_burst)
        .context("Invalid scan rate limit")?;

    let mut state = AppState::new(engine.storage.clone(), engine.runner.clone(), hub, limiter)
        .with_debug(args.debug)
        .with_cors_origins(args.cors_origins.clone());

    let scheduler = if args.schedule.no_scheduler {
        None
    } else {
        let scheduler = Arc::new(Scheduler::new(Arc::new(engine.runner.clone())));
        scheduler.load(&args.schedule.config()).await?;
        state = state.with_scheduler(scheduler.clone());
        Some(scheduler)
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
        }
        info!("shutdown signal received");
    };
    patchscout_api::serve(args.listen, Arc::new(state), shutdown).await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    engine.runner.shutdown().await;
    Ok(())
}
