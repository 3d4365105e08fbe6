//! Bounded job-status polling for scanners that run asynchronously

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use patchscout_common::AdapterError;

/// Interval and attempt bound for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Longest a loop with these settings can wait, ignoring request time.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 120)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Finished(T),
    /// Attempts ran out before the job reported completion.
    Exhausted,
}

/// Call `check` until it yields `Some`, sleeping `interval` between attempts.
///
/// The token is checked before every attempt and raced against both the
/// check and the sleep.
pub async fn poll_until<T, F, Fut>(
    settings: PollSettings,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<PollOutcome<T>, AdapterError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, AdapterError>>,
{
    for attempt in 1..=settings.max_attempts {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }

        let checked = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            r = check(attempt) => r?,
        };
        if let Some(done) = checked {
            return Ok(PollOutcome::Finished(done));
        }

        if attempt < settings.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
                _ = tokio::time::sleep(settings.interval) => {}
            }
        }
    }
    Ok(PollOutcome::Exhausted)
}
