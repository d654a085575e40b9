//! # Fairval Core
//!
//! Intrinsic-value pipeline for a curated universe of equities.
//!
//! ## Overview
//!
//! - **Domain models** for tracked securities, assumptions, outputs and snapshots
//! - **DCF engine** with EPS and FCF variants in exact decimal arithmetic
//! - **Fundamentals client** with a seven-day cache, call pacing and a daily budget
//! - **Orchestrator** that revalues the stalest securities first
//! - **Snapshot archiver** with idempotent quarterly snapshots and comparisons
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Alpha Vantage fundamentals source |
//! | [`archiver`] | Snapshot creation, history, comparison view |
//! | [`cache`] | Infallible TTL cache over a pluggable backend |
//! | [`client`] | Cached, paced provider access with call counters |
//! | [`domain`] | Symbol, TrackedSecurity, ValuationSnapshot, ValueDelta |
//! | [`envelope`] | Response envelope for CLI output |
//! | [`error`] | Validation errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`metrics`] | TTM EPS and FCF per share from raw payloads |
//! | [`orchestrator`] | One valuation run over the universe |
//! | [`provider_policy`] | Pacing, quota and retry settings |
//! | [`selector`] | Revaluation priority |
//! | [`source`] | Provider contract and error classification |
//! | [`store`] | Persistence port (memory, DuckDB) |
//! | [`throttling`] | Daily budget and inter-call spacing |
//! | [`valuation`] | DCF engine |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌──────────────────┐
//! │  Orchestrator   │─────▶│ Selector         │
//! └────────┬────────┘      └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │ Fundamentals    │─────▶│ Cache (7d TTL)   │
//! │ Client          │      └──────────────────┘
//! │                 │      ┌──────────────────┐
//! │                 │─────▶│ CallPacer        │
//! └────────┬────────┘      └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌──────────────────┐
//! │ AlphaVantage    │─────▶│ HTTP Client      │
//! │ Source          │      │ (reqwest)        │
//! └─────────────────┘      └──────────────────┘
//!
//! metrics ─▶ valuation ─▶ store ◀─ archiver
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fairval_core::valuation::{intrinsic_value, DcfInputs};
//! use rust_decimal::Decimal;
//!
//! let inputs = DcfInputs {
//!     base_metric: Decimal::new(642, 2),
//!     growth_rate_pct: Decimal::from(10),
//!     exit_multiple: Decimal::from(20),
//!     required_return_pct: Decimal::from(15),
//!     years: 5,
//! };
//! assert_eq!(intrinsic_value(&inputs).unwrap(), Decimal::new(13096, 2));
//! ```
//!
//! ## Security
//!
//! - The API key is read from `FAIRVAL_ALPHAVANTAGE_API_KEY` and masked in logs
//! - Warehouse statements are parameterized

pub mod adapters;
pub mod archiver;
pub mod cache;
pub mod client;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod orchestrator;
pub mod provider_policy;
pub mod selector;
pub mod source;
pub mod store;
pub mod throttling;
pub mod valuation;

// Adapters
pub use adapters::AlphaVantageSource;

// Archiver
pub use archiver::{
    ArchiveOptions, ArchiveReport, ComparisonDeltas, ComparisonView, EffectiveValue, SkipReason,
    SnapshotArchiver, SnapshotOutcome,
};

// Caching
pub use cache::{CacheBackend, CacheError, CacheKey, FundamentalCache, MemoryCacheBackend};

// Client
pub use client::{CallStats, FundamentalsClient, RawSeries};

// Domain models
pub use domain::{
    PreferredMethod, SnapshotDate, Symbol, TrackedSecurity, UtcDateTime, ValuationAssumptions,
    ValuationOutputs, ValuationSnapshot, ValueDelta,
};

// Envelope types
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};

// Error types
pub use error::ValidationError;

// Warehouse (re-exported from fairval-warehouse)
pub use fairval_warehouse::{Warehouse, WarehouseConfig, WarehouseError};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Metrics
pub use metrics::MetricsError;

// Orchestrator
pub use orchestrator::{
    RunError, RunOptions, RunReport, SecurityIssue, ValuationOrchestrator, ValueChange,
    DEFAULT_RUN_LIMIT,
};

// Provider policies
pub use provider_policy::{BackoffPolicy, ProviderPolicy};

// Source contract
pub use source::{FundamentalEndpoint, FundamentalSource, QueryParams, SourceError, SourceErrorKind};

// Persistence
pub use store::{MemoryStore, StoreError, ValuationStore};

// Throttling
pub use throttling::CallPacer;

// Valuation
pub use valuation::{DcfInputs, DcfValuation, SecurityValuation, ValuationError};
