use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::provider_policy::ProviderPolicy;
use crate::source::SourceError;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gate in front of every uncached provider call.
///
/// Enforces the daily call budget (a governor token bucket) and a minimum
/// spacing between consecutive admitted calls. Cache hits never pass through
/// here, so they are neither paced nor counted.
#[derive(Clone)]
pub struct CallPacer {
    budget: Option<Arc<DirectRateLimiter>>,
    quota_limit: u32,
    min_interval: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl CallPacer {
    pub fn new(min_interval: Duration, quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            budget: quota_from_window(quota_window, quota_limit)
                .map(|quota| Arc::new(RateLimiter::direct(quota))),
            quota_limit,
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(
            policy.min_call_interval,
            policy.quota_window,
            policy.quota_limit,
        )
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for a call slot. Fails without waiting when the budget is spent.
    pub async fn admit(&self) -> Result<(), SourceError> {
        let mut last_call = self.last_call.lock().await;

        let within_budget = self
            .budget
            .as_ref()
            .is_some_and(|limiter| limiter.check().is_ok());
        if !within_budget {
            return Err(SourceError::rate_limited(format!(
                "daily budget of {} provider calls exhausted",
                self.quota_limit
            )));
        }

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "pacing provider call");
                tokio::time::sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
        Ok(())
    }
}

/// `None` for a zero limit: no call is ever admitted.
fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Option<Quota> {
    let burst = NonZeroU32::new(quota_limit)?;
    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(quota_limit)).max(0.001);
    let quota = Quota::with_period(Duration::from_secs_f64(seconds_per_cell))?;
    Some(quota.allow_burst(burst))
}
