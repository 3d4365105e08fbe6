// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

use std::sync::Arc;
use std::time::Instant;

use patchscout_common::Storage;
use patchscout_notify::EventHub;
use patchscout_orchestrator::{RateLimiter, ScanRunner};
use patchscout_scheduler::Scheduler;

/// Shared state behind every handler.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub runner: ScanRunner,
    /// Source of the WebSocket event streams.
    pub hub: EventHub,
    /// Token bucket for `POST /api/scans`.
    pub limiter: RateLimiter,
    pub scheduler: Option<Arc<Scheduler>>,
    /// Return internal error details to clients.
    pub debug: bool,
    /// Allowed CORS origins; empty allows any origin.
    pub cors_origins: Vec<String>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        runner: ScanRunner,
        hub: EventHub,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            storage,
            runner,
            hub,
            limiter,
            scheduler: None,
            debug: false,
            cors_origins: Vec::new(),
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}
