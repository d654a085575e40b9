//! One valuation run over the tracked universe.
//!
//! Securities are handled strictly one after another in selector order; each
//! goes through fetch, compute and persist before the next one starts. A
//! failure for one security is recorded and the run moves on, except for a
//! rate limit, which ends fetching for the rest of the run.

use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{CallStats, FundamentalsClient};
use crate::metrics::{self, MetricsError};
use crate::selector;
use crate::source::{FundamentalEndpoint, QueryParams, SourceError};
use crate::store::{StoreError, ValuationStore};
use crate::valuation::{self, ValuationError};
use crate::{PreferredMethod, Symbol, TrackedSecurity, UtcDateTime, ValueDelta, ValuationOutputs};

/// Three provider calls per security against a 25-call day.
pub const DEFAULT_RUN_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Restrict the run to these symbols; each must be tracked.
    pub symbols: Option<Vec<Symbol>>,
    pub limit: usize,
    pub force_all: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            symbols: None,
            limit: DEFAULT_RUN_LIMIT,
            force_all: false,
        }
    }
}

/// Failures that stop a run before any security is processed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to load tracked universe: {0}")]
    Store(#[from] StoreError),
    #[error("symbols are not tracked: {}", join_symbols(.symbols))]
    UnknownSymbols { symbols: Vec<Symbol> },
}

fn join_symbols(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityIssue {
    pub symbol: Symbol,
    pub reason: String,
}

/// Effective value before and after a run for one processed security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    pub symbol: Symbol,
    pub method: PreferredMethod,
    pub delta: ValueDelta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Selecting,
    Fetching,
    Computing,
    Persisting,
    Reporting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    pub selected: Vec<Symbol>,
    pub processed: Vec<Symbol>,
    pub skipped: Vec<SecurityIssue>,
    pub errors: Vec<SecurityIssue>,
    pub stats: CallStats,
    pub rate_limited: bool,
    pub deltas: Vec<ValueChange>,
}

impl RunReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Per-security result before it is folded into the report.
enum Outcome {
    Processed(ValueChange),
    Skipped(String),
    RateLimited(String),
    Failed(String),
}

#[derive(Debug, Error)]
enum InputError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Base metrics for both DCF variants.
struct BaseMetrics {
    eps: Decimal,
    fcf_per_share: Decimal,
}

pub struct ValuationOrchestrator {
    store: Arc<dyn ValuationStore>,
    client: FundamentalsClient,
}

impl ValuationOrchestrator {
    pub fn new(store: Arc<dyn ValuationStore>, client: FundamentalsClient) -> Self {
        Self { store, client }
    }

    pub fn client(&self) -> &FundamentalsClient {
        &self.client
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunReport, RunError> {
        let started_at = UtcDateTime::now();
        let stats_before = self.client.stats();

        stage(RunStage::Selecting);
        let universe = self.store.load_universe()?;
        let selected = self.select(&universe, options)?;
        let selected_symbols: Vec<Symbol> = selected.iter().map(|s| s.symbol.clone()).collect();
        info!(
            selected = selected.len(),
            universe = universe.len(),
            "valuation run started"
        );

        let mut processed = Vec::new();
        let mut skipped = Vec::new();
        let mut errors = Vec::new();
        let mut deltas = Vec::new();
        let mut rate_limited = false;

        for security in &selected {
            let symbol = security.symbol.clone();
            if rate_limited {
                skipped.push(SecurityIssue {
                    symbol,
                    reason: String::from("rate limited"),
                });
                continue;
            }

            match self.value_one(security).await {
                Outcome::Processed(change) => {
                    info!(%symbol, value = ?change.delta.to, "security valued");
                    processed.push(symbol);
                    deltas.push(change);
                }
                Outcome::Skipped(reason) => {
                    warn!(%symbol, %reason, "security skipped");
                    skipped.push(SecurityIssue { symbol, reason });
                }
                Outcome::RateLimited(reason) => {
                    warn!(%symbol, %reason, "rate limited; skipping remaining securities");
                    rate_limited = true;
                    skipped.push(SecurityIssue {
                        symbol,
                        reason: format!("rate limited: {reason}"),
                    });
                }
                Outcome::Failed(reason) => {
                    warn!(%symbol, %reason, "security failed");
                    errors.push(SecurityIssue { symbol, reason });
                }
            }
        }

        stage(RunStage::Reporting);
        let report = RunReport {
            started_at,
            finished_at: UtcDateTime::now(),
            selected: selected_symbols,
            processed,
            skipped,
            errors,
            stats: self.client.stats().since(stats_before),
            rate_limited,
            deltas,
        };
        info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            api_calls = report.stats.api_calls,
            cache_hits = report.stats.cache_hits,
            rate_limited = report.rate_limited,
            "valuation run finished"
        );
        Ok(report)
    }

    fn select(
        &self,
        universe: &[TrackedSecurity],
        options: &RunOptions,
    ) -> Result<Vec<TrackedSecurity>, RunError> {
        let Some(symbols) = &options.symbols else {
            return Ok(selector::select(universe, options.limit, options.force_all));
        };

        let known: BTreeSet<&Symbol> = universe.iter().map(|s| &s.symbol).collect();
        let unknown: Vec<Symbol> = symbols
            .iter()
            .filter(|symbol| !known.contains(symbol))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(RunError::UnknownSymbols { symbols: unknown });
        }

        // Named symbols are an explicit operator request: no limit, same priority order.
        let wanted: BTreeSet<&Symbol> = symbols.iter().collect();
        let named: Vec<TrackedSecurity> = universe
            .iter()
            .filter(|security| wanted.contains(&security.symbol))
            .cloned()
            .collect();
        Ok(selector::select(&named, named.len(), options.force_all))
    }

    async fn value_one(&self, security: &TrackedSecurity) -> Outcome {
        let symbol = &security.symbol;

        stage(RunStage::Fetching);
        let base = match self.fetch_base_metrics(symbol).await {
            Ok(base) => base,
            Err(InputError::Source(error)) if error.is_rate_limited() => {
                return Outcome::RateLimited(error.message().to_owned());
            }
            Err(error) => return Outcome::Skipped(error.to_string()),
        };

        stage(RunStage::Computing);
        let valuation =
            match valuation::value_security(&security.assumptions, base.eps, base.fcf_per_share) {
                Ok(valuation) => valuation,
                Err(ValuationError::InvalidAssumption { field, reason }) => {
                    return Outcome::Failed(format!("invalid assumption '{field}': {reason}"));
                }
            };
        let outputs: ValuationOutputs = valuation.into_outputs(UtcDateTime::now());

        stage(RunStage::Persisting);
        if let Err(error) = self.store.record_valuation(symbol, &outputs) {
            return Outcome::Failed(format!("failed to persist valuation: {error}"));
        }

        let method = security.assumptions.preferred_method;
        Outcome::Processed(ValueChange {
            symbol: symbol.clone(),
            method,
            delta: ValueDelta::between(
                security.effective_intrinsic_value(),
                Some(outputs.value_for(method)),
            ),
        })
    }

    async fn fetch_base_metrics(&self, symbol: &Symbol) -> Result<BaseMetrics, InputError> {
        let params = QueryParams::new();
        let earnings = self
            .client
            .fetch(symbol, FundamentalEndpoint::Earnings, &params)
            .await?;
        let eps = metrics::ttm_eps(&earnings.payload)?;

        let cash_flow = self
            .client
            .fetch(symbol, FundamentalEndpoint::CashFlow, &params)
            .await?;
        let overview = self
            .client
            .fetch(symbol, FundamentalEndpoint::Overview, &params)
            .await?;
        let fcf_per_share = metrics::fcf_per_share(&cash_flow.payload, &overview.payload)?;

        Ok(BaseMetrics { eps, fcf_per_share })
    }
}

fn stage(stage: RunStage) {
    debug!(?stage, "run stage");
}
