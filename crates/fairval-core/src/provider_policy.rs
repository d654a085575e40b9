use std::time::Duration;

/// Call budget and transport settings for the fundamentals provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    /// Minimum spacing between consecutive uncached calls.
    pub min_call_interval: Duration,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub request_timeout: Duration,
    pub retry_backoff: BackoffPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
    /// Spread each delay by up to +/- 50%.
    pub jitter: bool,
}

impl ProviderPolicy {
    /// Alpha Vantage free tier: 25 calls per day, one call every 20 seconds.
    pub fn alphavantage_default() -> Self {
        Self {
            min_call_interval: Duration::from_secs(20),
            quota_window: Duration::from_secs(24 * 60 * 60),
            quota_limit: 25,
            request_timeout: Duration::from_secs(10),
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                max_retries: 2,
                jitter: true,
            },
        }
    }

    /// No pacing and no retries; for tests and offline runs.
    pub fn unthrottled(quota_limit: u32) -> Self {
        Self {
            min_call_interval: Duration::ZERO,
            quota_limit,
            retry_backoff: BackoffPolicy::none(),
            ..Self::alphavantage_default()
        }
    }
}

impl BackoffPolicy {
    pub fn none() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            max_retries: 0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry_count` (0-based), or `None` once the
    /// retry budget is spent.
    pub fn delay(&self, retry_count: u32) -> Option<Duration> {
        if retry_count >= self.max_retries {
            return None;
        }

        let scale = self.multiplier.powf(f64::from(retry_count));
        let seconds = self.initial_delay.as_secs_f64() * scale;
        let capped = Duration::from_secs_f64(seconds.min(self.max_delay.as_secs_f64()));
        if !self.jitter {
            return Some(capped);
        }

        let capped_ms = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
        let spread = capped_ms / 2;
        let offset = fastrand::u64(0..=spread.saturating_mul(2));
        Some(Duration::from_millis(
            capped_ms.saturating_sub(spread).saturating_add(offset),
        ))
    }
}
