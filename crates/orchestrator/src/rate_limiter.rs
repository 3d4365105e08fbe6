//! Scan-creation rate limiting

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Governor};
use std::num::NonZeroU32;

use patchscout_common::{ScoutError, ScoutResult};

/// Token bucket shared by every caller that creates scans.
pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
    per_minute: u32,
}

impl RateLimiter {
    /// Allow `per_minute` scans per minute with bursts of up to `burst`.
    pub fn new(per_minute: u32, burst: u32) -> ScoutResult<Self> {
        let rate = NonZeroU32::new(per_minute)
            .ok_or_else(|| ScoutError::Config("scan rate must be at least 1 per minute".into()))?;
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| ScoutError::Config("scan burst must be at least 1".into()))?;
        Ok(Self {
            inner: Governor::direct(Quota::per_minute(rate).allow_burst(burst)),
            per_minute,
        })
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }

    #[must_use]
    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("per_minute", &self.per_minute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_enforced() {
        let limiter = RateLimiter::new(1, 2).unwrap();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_rate_is_a_config_error() {
        assert!(matches!(RateLimiter::new(0, 1), Err(ScoutError::Config(_))));
    }
}
