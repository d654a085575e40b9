//! Cached, paced access to provider fundamentals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheKey, FundamentalCache};
use crate::provider_policy::ProviderPolicy;
use crate::source::{FundamentalEndpoint, FundamentalSource, QueryParams, SourceError};
use crate::throttling::CallPacer;
use crate::Symbol;

/// One provider payload for one symbol and function.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub symbol: Symbol,
    pub endpoint: FundamentalEndpoint,
    pub payload: Value,
    pub from_cache: bool,
}

/// Call counters since the client was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallStats {
    pub api_calls: u64,
    pub cache_hits: u64,
    pub failed_calls: u64,
}

impl CallStats {
    /// Counts accumulated after `earlier` was taken.
    pub fn since(self, earlier: Self) -> Self {
        Self {
            api_calls: self.api_calls.saturating_sub(earlier.api_calls),
            cache_hits: self.cache_hits.saturating_sub(earlier.cache_hits),
            failed_calls: self.failed_calls.saturating_sub(earlier.failed_calls),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    api_calls: AtomicU64,
    cache_hits: AtomicU64,
    failed_calls: AtomicU64,
}

#[derive(Clone)]
pub struct FundamentalsClient {
    source: Arc<dyn FundamentalSource>,
    cache: FundamentalCache,
    pacer: CallPacer,
    counters: Arc<Counters>,
}

impl FundamentalsClient {
    pub fn new(
        source: Arc<dyn FundamentalSource>,
        cache: FundamentalCache,
        pacer: CallPacer,
    ) -> Self {
        Self {
            source,
            cache,
            pacer,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn from_policy(
        source: Arc<dyn FundamentalSource>,
        cache: FundamentalCache,
        policy: &ProviderPolicy,
    ) -> Self {
        Self::new(source, cache, CallPacer::from_policy(policy))
    }

    pub fn cache(&self) -> &FundamentalCache {
        &self.cache
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            api_calls: self.counters.api_calls.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            failed_calls: self.counters.failed_calls.load(Ordering::Relaxed),
        }
    }

    /// Serve from cache when possible; otherwise wait for the pacer and call
    /// the provider. Only clean payloads are cached.
    pub async fn fetch(
        &self,
        symbol: &Symbol,
        endpoint: FundamentalEndpoint,
        params: &QueryParams,
    ) -> Result<RawSeries, SourceError> {
        let key = CacheKey::new(endpoint.function(), symbol.as_str(), params);

        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_str::<Value>(&cached) {
                Ok(payload) => {
                    self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(RawSeries {
                        symbol: symbol.clone(),
                        endpoint,
                        payload,
                        from_cache: true,
                    });
                }
                Err(error) => {
                    warn!(key = %key, %error, "discarding corrupt cache entry");
                    self.cache.delete(&key);
                }
            }
        }

        self.pacer.admit().await?;

        let body = match self.source.fetch(symbol, endpoint, params).await {
            Ok(body) => body,
            Err(error) => {
                self.counters.failed_calls.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
        };
        let payload = serde_json::from_str::<Value>(&body).map_err(|e| {
            self.counters.failed_calls.fetch_add(1, Ordering::Relaxed);
            SourceError::data_unavailable(format!("provider payload is not JSON: {e}"))
        })?;

        self.counters.api_calls.fetch_add(1, Ordering::Relaxed);
        self.cache.set(&key, &body, None);
        debug!(%symbol, %endpoint, "fetched from provider");

        Ok(RawSeries {
            symbol: symbol.clone(),
            endpoint,
            payload,
            from_cache: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSource {
        calls: Mutex<Vec<String>>,
        body: String,
    }

    impl CountingSource {
        fn returning(body: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                body: body.to_owned(),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }
    }

    impl FundamentalSource for CountingSource {
        fn fetch<'a>(
            &'a self,
            symbol: &'a Symbol,
            endpoint: FundamentalEndpoint,
            _params: &'a QueryParams,
        ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(format!("{endpoint}:{symbol}"));
            let body = self.body.clone();
            Box::pin(async move { Ok(body) })
        }
    }

    struct FailingSource;

    impl FundamentalSource for FailingSource {
        fn fetch<'a>(
            &'a self,
            _symbol: &'a Symbol,
            _endpoint: FundamentalEndpoint,
            _params: &'a QueryParams,
        ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>> {
            Box::pin(async { Err(SourceError::data_unavailable("upstream down")) })
        }
    }

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").expect("valid symbol")
    }

    fn client(
        source: Arc<dyn FundamentalSource>,
        min_interval: Duration,
        quota: u32,
    ) -> FundamentalsClient {
        let pacer = CallPacer::new(min_interval, Duration::from_secs(86_400), quota);
        FundamentalsClient::new(source, FundamentalCache::in_memory(), pacer)
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let source = CountingSource::returning(r#"{"quarterlyEarnings":[]}"#);
        let client = client(source.clone(), Duration::ZERO, 5);

        let first = client
            .fetch(&aapl(), FundamentalEndpoint::Earnings, &QueryParams::new())
            .await
            .expect("first fetch");
        let second = client
            .fetch(&aapl(), FundamentalEndpoint::Earnings, &QueryParams::new())
            .await
            .expect("second fetch");

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.payload, second.payload);
        assert_eq!(source.call_count(), 1);
        assert_eq!(
            client.stats(),
            CallStats {
                api_calls: 1,
                cache_hits: 1,
                failed_calls: 0
            }
        );
    }

    #[tokio::test]
    async fn cache_hits_are_not_paced() {
        let source = CountingSource::returning(r#"{"Symbol":"AAPL"}"#);
        let client = client(source, Duration::from_secs(20), 5);
        client
            .fetch(&aapl(), FundamentalEndpoint::Overview, &QueryParams::new())
            .await
            .expect("miss");

        let started = std::time::Instant::now();
        for _ in 0..3 {
            client
                .fetch(&aapl(), FundamentalEndpoint::Overview, &QueryParams::new())
                .await
                .expect("hit");
        }

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(client.stats().cache_hits, 3);
    }

    #[tokio::test]
    async fn exhausted_budget_is_rate_limited_without_calling_provider() {
        let source = CountingSource::returning(r#"{"Symbol":"AAPL"}"#);
        let client = client(source.clone(), Duration::ZERO, 1);
        client
            .fetch(&aapl(), FundamentalEndpoint::Overview, &QueryParams::new())
            .await
            .expect("within budget");

        let error = client
            .fetch(&aapl(), FundamentalEndpoint::Earnings, &QueryParams::new())
            .await
            .expect_err("over budget");

        assert!(error.is_rate_limited());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_refetched() {
        let source = CountingSource::returning(r#"{"annualReports":[]}"#);
        let client = client(source.clone(), Duration::ZERO, 5);
        let key = CacheKey::new("CASH_FLOW", "AAPL", &QueryParams::new());
        client.cache().set(&key, "{truncated", None);

        let series = client
            .fetch(&aapl(), FundamentalEndpoint::CashFlow, &QueryParams::new())
            .await
            .expect("refetch");

        assert!(!series.from_cache);
        assert_eq!(source.call_count(), 1);
        assert_eq!(client.cache().get(&key).as_deref(), Some(r#"{"annualReports":[]}"#));
    }

    #[tokio::test]
    async fn failures_are_counted_and_not_cached() {
        let client = client(Arc::new(FailingSource), Duration::ZERO, 5);

        let error = client
            .fetch(&aapl(), FundamentalEndpoint::Earnings, &QueryParams::new())
            .await
            .expect_err("upstream down");

        assert!(!error.is_rate_limited());
        assert_eq!(client.stats().failed_calls, 1);
        assert_eq!(client.stats().api_calls, 0);
        let key = CacheKey::new("EARNINGS", "AAPL", &QueryParams::new());
        assert_eq!(client.cache().get(&key), None);
    }

    #[test]
    fn stats_since_subtracts() {
        let before = CallStats {
            api_calls: 2,
            cache_hits: 1,
            failed_calls: 0,
        };
        let after = CallStats {
            api_calls: 5,
            cache_hits: 4,
            failed_calls: 1,
        };
        assert_eq!(
            after.since(before),
            CallStats {
                api_calls: 3,
                cache_hits: 3,
                failed_calls: 1
            }
        );
    }
}
