//! Per-scan tool progress

use tokio::sync::Mutex;
use tracing::info;

/// Counts settled tools for one orchestration run.
pub struct ProgressTracker {
    scan_id: i64,
    total: Mutex<usize>,
    completed: Mutex<usize>,
    failed: Mutex<usize>,
}

/// Point-in-time copy of a tracker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn settled(&self) -> usize {
        self.completed + self.failed
    }

    /// Settled share in percent; an empty run counts as done.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.settled() * 100) / self.total).min(100) as u8
    }
}

impl ProgressTracker {
    pub fn new(scan_id: i64) -> Self {
        Self {
            scan_id,
            total: Mutex::new(0),
            completed: Mutex::new(0),
            failed: Mutex::new(0),
        }
    }

    pub async fn set_total(&self, total: usize) {
        *self.total.lock().await = total;
    }

    pub async fn increment_completed(&self) {
        *self.completed.lock().await += 1;
    }

    pub async fn increment_failed(&self) {
        *self.failed.lock().await += 1;
    }

    pub async fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: *self.total.lock().await,
            completed: *self.completed.lock().await,
            failed: *self.failed.lock().await,
        }
    }

    pub async fn log_summary(&self) {
        let snap = self.snapshot().await;
        info!(
            scan_id = self.scan_id,
            tools = snap.total,
            completed = snap.completed,
            failed = snap.failed,
            "orchestration finished"
        );
    }
}
