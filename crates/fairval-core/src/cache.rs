//! Long-lived cache for raw provider payloads.
//!
//! [`FundamentalCache`] never fails: a backend error on read is a miss and a
//! backend error on write is logged and dropped, so a broken cache costs API
//! budget but never a run.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fairval_warehouse::{Warehouse, WarehouseError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::UtcDateTime;

/// Backend failure. Never leaves [`FundamentalCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// `alphavantage:{FUNCTION}:{SYMBOL}[:k1=v1&k2=v2]` with params sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(function: &str, symbol: &str, params: &BTreeMap<String, String>) -> Self {
        let mut key = format!("alphavantage:{function}:{symbol}");
        if !params.is_empty() {
            let rendered = params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("&");
            key.push(':');
            key.push_str(&rendered);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage behind [`FundamentalCache`]. Expiry is in epoch milliseconds; an
/// entry is live while `expires_at_ms > now_ms`.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str, now_ms: i64) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str, expires_at_ms: i64) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
    fn purge_expired(&self, now_ms: i64) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at_ms: i64,
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    map: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str, now_ms: i64) -> Result<Option<String>, CacheError> {
        let map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(map
            .get(key)
            .filter(|entry| entry.expires_at_ms > now_ms)
            .map(|entry| entry.body.clone()))
    }

    fn set(&self, key: &str, value: &str, expires_at_ms: i64) -> Result<(), CacheError> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        map.insert(
            key.to_owned(),
            CacheEntry {
                body: value.to_owned(),
                expires_at_ms,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        map.remove(key);
        Ok(())
    }

    fn purge_expired(&self, now_ms: i64) -> Result<usize, CacheError> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, entry| entry.expires_at_ms > now_ms);
        Ok(before - map.len())
    }
}

impl CacheBackend for Warehouse {
    fn get(&self, key: &str, now_ms: i64) -> Result<Option<String>, CacheError> {
        Ok(self.cache_get(key, now_ms)?)
    }

    fn set(&self, key: &str, value: &str, expires_at_ms: i64) -> Result<(), CacheError> {
        Ok(self.cache_put(key, value, expires_at_ms)?)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        Ok(self.cache_delete(key)?)
    }

    fn purge_expired(&self, now_ms: i64) -> Result<usize, CacheError> {
        Ok(self.cache_purge_expired(now_ms)?)
    }
}

/// Infallible cache facade used by the fundamentals client.
#[derive(Clone)]
pub struct FundamentalCache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
}

impl FundamentalCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            default_ttl: Self::DEFAULT_TTL,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &CacheKey) -> Option<String> {
        match self.backend.get(key.as_str(), now_ms()) {
            Ok(Some(value)) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(error) => {
                warn!(key = %key, %error, "cache read failed; treating as miss");
                None
            }
        }
    }

    /// Store `value` for `ttl` (or the default TTL).
    pub fn set(&self, key: &CacheKey, value: &str, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at_ms = now_ms().saturating_add(ttl_ms);
        if let Err(error) = self.backend.set(key.as_str(), value, expires_at_ms) {
            warn!(key = %key, %error, "cache write failed; entry dropped");
        }
    }

    pub fn delete(&self, key: &CacheKey) {
        if let Err(error) = self.backend.delete(key.as_str()) {
            warn!(key = %key, %error, "cache delete failed");
        }
    }

    /// Drop expired entries; returns how many were removed (0 on backend failure).
    pub fn purge_expired(&self) -> usize {
        match self.backend.purge_expired(now_ms()) {
            Ok(removed) => removed,
            Err(error) => {
                warn!(%error, "cache purge failed");
                0
            }
        }
    }
}

fn now_ms() -> i64 {
    UtcDateTime::now().unix_millis()
}
