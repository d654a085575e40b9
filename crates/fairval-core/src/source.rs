//! Upstream fundamentals source contract.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::Symbol;

/// Extra query parameters; ordered so cache keys are stable.
pub type QueryParams = BTreeMap<String, String>;

/// Provider functions the pipeline consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundamentalEndpoint {
    Earnings,
    CashFlow,
    Overview,
}

impl FundamentalEndpoint {
    pub const ALL: [Self; 3] = [Self::Earnings, Self::CashFlow, Self::Overview];

    pub const fn function(self) -> &'static str {
        match self {
            Self::Earnings => "EARNINGS",
            Self::CashFlow => "CASH_FLOW",
            Self::Overview => "OVERVIEW",
        }
    }
}

impl Display for FundamentalEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.function())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Transport failure, non-2xx, malformed or empty payload, provider error message.
    DataUnavailable,
    /// Daily budget exhausted or provider throttle notice.
    RateLimited,
}

/// Structured error at the client/adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn data_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::DataUnavailable,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self.kind, SourceErrorKind::RateLimited)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::DataUnavailable => "source.data_unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// A provider that returns the raw, validated JSON body for one function call.
///
/// Implementations classify provider error payloads into [`SourceError`];
/// a returned `Ok` body is safe to cache.
pub trait FundamentalSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        symbol: &'a Symbol,
        endpoint: FundamentalEndpoint,
        params: &'a QueryParams,
    ) -> Pin<Box<dyn Future<Output = Result<String, SourceError>> + Send + 'a>>;
}
