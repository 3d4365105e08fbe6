//! Scan runner - background task per scan, cancellation registry, concurrency cap

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use patchscout_common::{
    EventSink, NewScan, Scan, ScanEvent, ScanLauncher, ScanStatus, ScoutError, ScoutResult,
    Storage,
};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_concurrent_scans: usize,
    /// How long `cancel` waits for in-flight tools to stop.
    pub cancel_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scans: 5,
            cancel_grace: Duration::from_secs(30),
        }
    }
}

struct Handle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Inner {
    storage: Arc<dyn Storage>,
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn EventSink>,
    permits: Arc<Semaphore>,
    running: Mutex<HashMap<i64, Handle>>,
    config: RunnerConfig,
}

/// Owns the lifecycle of every scan: pending -> running -> terminal.
#[derive(Clone)]
pub struct ScanRunner {
    inner: Arc<Inner>,
}

impl ScanRunner {
    pub fn new(
        storage: Arc<dyn Storage>,
        orchestrator: Arc<Orchestrator>,
        sink: Arc<dyn EventSink>,
        config: RunnerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_scans.max(1)));
        Self {
            inner: Arc::new(Inner {
                storage,
                orchestrator,
                sink,
                permits,
                running: Mutex::new(HashMap::new()),
                config,
            }),
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.inner.orchestrator
    }

    /// Scans with a live background task (queued or running).
    pub async fn active_scans(&self) -> usize {
        self.inner.running.lock().await.len()
    }

    /// Spawn the background task for an existing pending scan.
    pub async fn start(&self, id: i64) {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.inner.running.lock().await.insert(
            id,
            Handle {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );

        let runner = self.clone();
        tokio::spawn(async move {
            match Arc::clone(&runner.inner.permits).acquire_owned().await {
                Ok(_permit) => {
                    if cancel.is_cancelled() {
                        debug!(scan_id = id, "scan dropped before it started");
                        if let Err(e) = runner.cancel_queued(id).await {
                            debug!(scan_id = id, error = %e, "could not mark queued scan cancelled");
                        }
                    } else if let Err(e) = runner.run(id, cancel).await {
                        error!(scan_id = id, error = %e, "scan run aborted");
                        if let Err(e) = runner
                            .inner
                            .storage
                            .finish_scan(id, ScanStatus::Failed, Utc::now())
                            .await
                        {
                            debug!(scan_id = id, error = %e, "could not mark aborted scan failed");
                        }
                    }
                }
                Err(_) => warn!(scan_id = id, "scan runner is shutting down"),
            }
            runner.inner.running.lock().await.remove(&id);
            let _ = done_tx.send(true);
        });
    }

    async fn run(&self, id: i64, cancel: CancellationToken) -> ScoutResult<()> {
        let storage = &self.inner.storage;
        let Some(scan) = storage.get_scan(id).await? else {
            warn!(scan_id = id, "scan disappeared before it started");
            return Ok(());
        };
        if !storage
            .transition_scan(id, ScanStatus::Pending, ScanStatus::Running)
            .await?
        {
            warn!(scan_id = id, status = %scan.status, "scan is no longer pending");
            return Ok(());
        }

        let started_at = Utc::now();
        storage.mark_scan_started(id, started_at).await?;
        info!(scan_id = id, target = %scan.target, tools = ?scan.selected_tools, "scan started");
        self.inner
            .sink
            .publish(&ScanEvent::ScanStarted {
                scan_id: id,
                target: scan.target.clone(),
                tools: scan.selected_tools.clone(),
                at: started_at,
            })
            .await;

        let outcome = self.inner.orchestrator.execute(&scan, cancel.clone()).await;
        let counts = storage.recompute_counts(id).await?;
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;

        let (status, event) = match outcome {
            _ if cancel.is_cancelled() => (
                ScanStatus::Cancelled,
                ScanEvent::ScanCancelled {
                    scan_id: id,
                    target: scan.target.clone(),
                },
            ),
            Ok(report) => {
                info!(
                    scan_id = id,
                    vulnerabilities = counts.total,
                    tools = report.tools.len(),
                    "scan completed"
                );
                (
                    ScanStatus::Completed,
                    ScanEvent::ScanCompleted {
                        scan_id: id,
                        target: scan.target.clone(),
                        counts,
                        duration_seconds,
                    },
                )
            }
            Err(e) => {
                error!(scan_id = id, error = %e, "scan failed");
                (
                    ScanStatus::Failed,
                    ScanEvent::ScanFailed {
                        scan_id: id,
                        target: scan.target.clone(),
                        error: e.to_string(),
                    },
                )
            }
        };

        storage.finish_scan(id, status, completed_at).await?;
        metrics::counter!("patchscout_scans_total", "status" => status.as_str()).increment(1);
        self.inner.sink.publish(&event).await;
        Ok(())
    }

    /// Wait until the background task of scan `id` has settled, then return the scan.
    pub async fn wait(&self, id: i64) -> ScoutResult<Scan> {
        let done = self
            .inner
            .running
            .lock()
            .await
            .get(&id)
            .map(|h| h.done.clone());
        if let Some(mut done) = done {
            // A closed channel means the task is gone, which is also settled.
            let _ = done.wait_for(|finished| *finished).await;
        }
        self.inner
            .storage
            .get_scan(id)
            .await?
            .ok_or(ScoutError::ScanNotFound(id))
    }

    /// Cancel a running scan and wait, up to the grace period, for it to settle.
    pub async fn cancel(&self, id: i64) -> ScoutResult<Scan> {
        let storage = &self.inner.storage;
        let scan = storage.get_scan(id).await?.ok_or(ScoutError::ScanNotFound(id))?;
        if scan.status != ScanStatus::Running {
            return Err(ScoutError::InvalidState("Scan is not running".into()));
        }

        let handle = self
            .inner
            .running
            .lock()
            .await
            .get(&id)
            .map(|h| (h.cancel.clone(), h.done.clone()));

        match handle {
            Some((token, mut done)) => {
                info!(scan_id = id, "cancelling scan");
                token.cancel();
                let grace = self.inner.config.cancel_grace;
                if tokio::time::timeout(grace, done.wait_for(|finished| *finished))
                    .await
                    .is_err()
                {
                    warn!(scan_id = id, ?grace, "scan did not settle within grace period");
                    storage
                        .finish_scan(id, ScanStatus::Cancelled, Utc::now())
                        .await?;
                }
            }
            None => {
                // Running row without a task, e.g. left over from a previous process.
                if storage
                    .transition_scan(id, ScanStatus::Running, ScanStatus::Cancelled)
                    .await?
                {
                    storage
                        .finish_scan(id, ScanStatus::Cancelled, Utc::now())
                        .await?;
                    self.inner
                        .sink
                        .publish(&ScanEvent::ScanCancelled {
                            scan_id: id,
                            target: scan.target.clone(),
                        })
                        .await;
                }
            }
        }

        storage.get_scan(id).await?.ok_or(ScoutError::ScanNotFound(id))
    }

    /// Delete a scan, cancelling it first when it is running.
    pub async fn delete(&self, id: i64) -> ScoutResult<()> {
        let scan = self
            .inner
            .storage
            .get_scan(id)
            .await?
            .ok_or(ScoutError::ScanNotFound(id))?;

        if scan.status == ScanStatus::Running {
            match self.cancel(id).await {
                Ok(_) | Err(ScoutError::InvalidState(_)) => {}
                Err(e) => return Err(e),
            }
        } else {
            let queued = self
                .inner
                .running
                .lock()
                .await
                .get(&id)
                .map(|h| h.cancel.clone());
            // Queued behind the concurrency cap; make sure it never starts.
            if let Some(token) = queued {
                self.cancel_queued(id).await?;
                token.cancel();
            }
        }

        if !self.inner.storage.delete_scan(id).await? {
            return Err(ScoutError::ScanNotFound(id));
        }
        info!(scan_id = id, "scan deleted");
        Ok(())
    }

    /// Move a scan that never started from pending to cancelled and announce it.
    /// Returns false when the scan is gone or already left the pending state.
    async fn cancel_queued(&self, id: i64) -> ScoutResult<bool> {
        let storage = &self.inner.storage;
        let Some(scan) = storage.get_scan(id).await? else {
            return Ok(false);
        };
        if !storage
            .transition_scan(id, ScanStatus::Pending, ScanStatus::Cancelled)
            .await?
        {
            return Ok(false);
        }
        storage
            .finish_scan(id, ScanStatus::Cancelled, Utc::now())
            .await?;
        metrics::counter!("patchscout_scans_total", "status" => ScanStatus::Cancelled.as_str())
            .increment(1);
        self.inner
            .sink
            .publish(&ScanEvent::ScanCancelled {
                scan_id: id,
                target: scan.target,
            })
            .await;
        Ok(true)
    }

    /// Cancel every queued and running scan.
    pub async fn shutdown(&self) {
        let running = self.inner.running.lock().await;
        for handle in running.values() {
            handle.cancel.cancel();
        }
        if !running.is_empty() {
            info!(scans = running.len(), "cancelled in-flight scans");
        }
    }
}

#[async_trait]
impl ScanLauncher for ScanRunner {
    async fn launch(&self, request: NewScan) -> ScoutResult<Scan> {
        let scan = self.inner.storage.create_scan(&request).await?;
        self.start(scan.id).await;
        Ok(scan)
    }
}
