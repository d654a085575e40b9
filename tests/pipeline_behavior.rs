//! Behavior-driven tests for a valuation run
//!
//! These tests verify HOW a run picks securities, spends the provider
//! budget, and isolates failures, using an in-memory store and a scripted
//! provider in place of Alpha Vantage.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fairval_core::{
    selector, CallPacer, FundamentalCache, FundamentalEndpoint, FundamentalSource,
    FundamentalsClient, MemoryStore, PreferredMethod, ProviderPolicy, QueryParams, RunError,
    RunOptions, SourceError, Symbol, TrackedSecurity, UtcDateTime, ValuationAssumptions,
    ValuationOrchestrator, ValuationOutputs, ValuationStore,
};
use rust_decimal_macros::dec;
use serde_json::json;

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Script {
    Unavailable,
    RateLimited,
    ShortHistory,
    OutOfRange,
}

/// Serves healthy fundamentals unless a symbol is scripted otherwise.
///
/// Healthy payloads give TTM EPS 6.42 and FCF per share 5.00.
#[derive(Default)]
struct ScriptedSource {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn healthy() -> Self {
        Self::default()
    }

    fn with(mut self, symbol: &str, script: Script) -> Self {
        self.scripts.insert(symbol.to_owned(), script);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn calls_for(&self, symbol: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.ends_with(&format!(":{symbol}")))
            .count()
    }

    fn respond(
        &self,
        symbol: &Symbol,
        endpoint: FundamentalEndpoint,
    ) -> Result<String, SourceError> {
        match (self.scripts.get(symbol.as_str()), endpoint) {
            (Some(Script::Unavailable), _) => {
                Err(SourceError::data_unavailable("Invalid API call"))
            }
            (Some(Script::RateLimited), _) => Err(SourceError::rate_limited(
                "standard API rate limit is 25 requests per day",
            )),
            (Some(Script::ShortHistory), FundamentalEndpoint::Earnings) => Ok(json!({
                "quarterlyEarnings": [
                    {"fiscalDateEnding": "2026-06-30", "reportedEPS": "1.605"},
                    {"fiscalDateEnding": "2026-03-31", "reportedEPS": "1.605"},
                ]
            })
            .to_string()),
            (Some(Script::OutOfRange), FundamentalEndpoint::Earnings) => {
                let huge = "70000000000000000000000000000";
                Ok(json!({
                    "quarterlyEarnings": [
                        {"fiscalDateEnding": "2026-06-30", "reportedEPS": huge},
                        {"fiscalDateEnding": "2026-03-31", "reportedEPS": huge},
                        {"fiscalDateEnding": "2025-12-31", "reportedEPS": "1.605"},
                        {"fiscalDateEnding": "2025-09-30", "reportedEPS": "1.605"},
                    ]
                })
                .to_string())
            }
            (_, FundamentalEndpoint::Earnings) => Ok(earnings_payload()),
            (_, FundamentalEndpoint::CashFlow) => Ok(cash_flow_payload()),
            (_, FundamentalEndpoint::Overview) => {
                Ok(json!({"SharesOutstanding": "1000"}).to_string())
            }
        }
    }
}

impl FundamentalSource for ScriptedSource {
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
        let response = self.respond(symbol, endpoint);
        Box::pin(async move { response })
    }
}

fn earnings_payload() -> String {
    json!({
        "symbol": "X",
        "quarterlyEarnings": [
            {"fiscalDateEnding": "2026-06-30", "reportedEPS": "1.605"},
            {"fiscalDateEnding": "2026-03-31", "reportedEPS": "1.605"},
            {"fiscalDateEnding": "2025-12-31", "reportedEPS": "1.605"},
            {"fiscalDateEnding": "2025-09-30", "reportedEPS": "1.605"},
            {"fiscalDateEnding": "2025-06-30", "reportedEPS": "9.99"},
        ]
    })
    .to_string()
}

fn cash_flow_payload() -> String {
    let quarter = |date: &str| {
        json!({"fiscalDateEnding": date, "operatingCashflow": "1500", "capitalExpenditures": "250"})
    };
    json!({
        "quarterlyReports": [
            quarter("2026-06-30"),
            quarter("2026-03-31"),
            quarter("2025-12-31"),
            quarter("2025-09-30"),
        ]
    })
    .to_string()
}

// =============================================================================
// Fixtures
// =============================================================================

fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

/// EPS 6.42 under these assumptions is worth 130.96.
fn reference_assumptions() -> ValuationAssumptions {
    ValuationAssumptions {
        eps_growth_rate: dec!(10),
        eps_exit_multiple: dec!(20),
        fcf_growth_rate: dec!(10),
        fcf_exit_multiple: dec!(15),
        required_return_rate: dec!(15),
        projection_years: 5,
        preferred_method: PreferredMethod::Eps,
    }
}

fn never_calculated(raw: &str) -> TrackedSecurity {
    TrackedSecurity::new(symbol(raw), reference_assumptions())
}

fn calculated_days_ago(raw: &str, days: i64) -> TrackedSecurity {
    never_calculated(raw).with_outputs(ValuationOutputs {
        current_eps: dec!(6.00),
        intrinsic_value_eps: dec!(120.00),
        current_fcf_per_share: dec!(4.00),
        intrinsic_value_fcf: dec!(70.00),
        last_calculated_at: UtcDateTime::from_offset_datetime(
            UtcDateTime::now().into_inner() - time::Duration::days(days),
        )
        .expect("utc timestamp"),
    })
}

fn orchestrator(
    store: Arc<MemoryStore>,
    source: Arc<ScriptedSource>,
    policy: &ProviderPolicy,
) -> ValuationOrchestrator {
    let client = FundamentalsClient::from_policy(source, FundamentalCache::in_memory(), policy);
    ValuationOrchestrator::new(store, client)
}

fn names(symbols: &[Symbol]) -> Vec<&str> {
    symbols.iter().map(Symbol::as_str).collect()
}

// =============================================================================
// Pipeline: Selection
// =============================================================================

#[test]
fn when_limit_is_two_never_calculated_then_oldest_are_chosen() {
    // Given: A never calculated, B 10 days old, C 1 day old
    let universe = vec![
        calculated_days_ago("C", 1),
        calculated_days_ago("B", 10),
        never_calculated("A"),
    ];

    // When: Two securities are selected
    let selected = selector::select(&universe, 2, false);

    // Then: A then B
    let chosen: Vec<&str> = selected.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(chosen, vec!["A", "B"]);
}

#[tokio::test]
async fn when_run_has_a_limit_only_the_stalest_securities_are_fetched() {
    // Given: Three securities of different staleness
    let store = Arc::new(MemoryStore::with_securities([
        calculated_days_ago("C", 1),
        calculated_days_ago("B", 10),
        never_calculated("A"),
    ]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store, source.clone(), &ProviderPolicy::unthrottled(25));

    // When: A run is limited to two securities
    let report = orchestrator
        .run(&RunOptions {
            limit: 2,
            ..RunOptions::default()
        })
        .await
        .expect("run completes");

    // Then: Only A and B are valued and C is never fetched
    assert_eq!(names(&report.processed), vec!["A", "B"]);
    assert_eq!(source.calls_for("C"), 0);
    assert_eq!(report.stats.api_calls, 6);
}

#[tokio::test]
async fn when_inactive_security_exists_it_is_never_valued() {
    let mut dormant = never_calculated("OLD");
    dormant.is_active = false;
    let store = Arc::new(MemoryStore::with_securities([dormant, never_calculated("KO")]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store, source.clone(), &ProviderPolicy::unthrottled(25));

    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    assert_eq!(names(&report.processed), vec!["KO"]);
    assert_eq!(source.calls_for("OLD"), 0);
}

// =============================================================================
// Pipeline: Valuation Results
// =============================================================================

#[tokio::test]
async fn when_security_is_valued_outputs_are_persisted_with_a_delta() {
    // Given: A security previously worth 120.00
    let store = Arc::new(MemoryStore::with_securities([calculated_days_ago("KO", 30)]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store.clone(), source, &ProviderPolicy::unthrottled(25));

    // When: It is revalued from fresh fundamentals
    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    // Then: The store holds the new outputs and the report shows the change
    let stored = store
        .load_security(&symbol("KO"))
        .expect("load")
        .expect("tracked");
    let outputs = stored.outputs.expect("outputs written");
    assert_eq!(outputs.current_eps, dec!(6.42));
    assert_eq!(outputs.intrinsic_value_eps, dec!(130.96));
    assert_eq!(outputs.current_fcf_per_share, dec!(5.00));

    assert_eq!(report.deltas.len(), 1);
    let delta = &report.deltas[0].delta;
    assert_eq!(delta.from, Some(dec!(120.00)));
    assert_eq!(delta.to, Some(dec!(130.96)));
    assert_eq!(delta.absolute, Some(dec!(10.96)));
}

// =============================================================================
// Pipeline: Failure Isolation
// =============================================================================

#[tokio::test]
async fn when_second_of_three_fails_first_and_third_are_still_processed() {
    // Given: B's fundamentals are unavailable
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("A"),
        never_calculated("B"),
        never_calculated("C"),
    ]));
    let source = Arc::new(ScriptedSource::healthy().with("B", Script::Unavailable));
    let orchestrator = orchestrator(store, source, &ProviderPolicy::unthrottled(25));

    // When: The run goes through all three
    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("no error escapes the run");

    // Then: A and C are processed and B is skipped with a reason
    assert_eq!(names(&report.processed), vec!["A", "C"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].symbol.as_str(), "B");
    assert!(report.skipped[0].reason.contains("Invalid API call"));
    assert!(!report.has_errors());
    assert_eq!(report.stats.failed_calls, 1);
}

#[tokio::test]
async fn when_history_is_too_short_security_is_skipped() {
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("NEW"),
        never_calculated("KO"),
    ]));
    let source = Arc::new(ScriptedSource::healthy().with("NEW", Script::ShortHistory));
    let orchestrator = orchestrator(store, source, &ProviderPolicy::unthrottled(25));

    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    assert_eq!(names(&report.processed), vec!["KO"]);
    assert_eq!(report.skipped[0].symbol.as_str(), "NEW");
}

#[tokio::test]
async fn when_reported_figures_are_out_of_range_only_that_security_is_skipped() {
    // Given: One security whose earnings overflow when summed
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("HUGE"),
        never_calculated("KO"),
    ]));
    let source = Arc::new(ScriptedSource::healthy().with("HUGE", Script::OutOfRange));
    let orchestrator = orchestrator(store, source, &ProviderPolicy::unthrottled(25));

    // When: The run values both
    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    // Then: The bad payload skips its security and the run carries on
    assert_eq!(names(&report.processed), vec!["KO"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].symbol.as_str(), "HUGE");
    assert!(report.skipped[0].reason.contains("out of range"));
    assert!(!report.has_errors());
}

#[tokio::test]
async fn when_assumptions_are_invalid_the_security_is_reported_as_an_error() {
    // Given: A security with a zero-year horizon
    let mut broken = never_calculated("BAD");
    broken.assumptions.projection_years = 0;
    let store = Arc::new(MemoryStore::with_securities([broken, never_calculated("KO")]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store.clone(), source, &ProviderPolicy::unthrottled(25));

    // When: The run values both
    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    // Then: BAD is an error, KO is processed, and BAD keeps no outputs
    assert_eq!(names(&report.processed), vec!["KO"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].symbol.as_str(), "BAD");
    assert!(report.errors[0].reason.contains("projection_years"));
    let bad = store
        .load_security(&symbol("BAD"))
        .expect("load")
        .expect("tracked");
    assert!(bad.outputs.is_none());
}

#[tokio::test]
async fn when_persisting_fails_the_run_continues_with_the_next_security() {
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("A"),
        never_calculated("B"),
    ]));
    store.fail_writes_for(&symbol("A"));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store, source, &ProviderPolicy::unthrottled(25));

    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    assert_eq!(names(&report.processed), vec!["B"]);
    assert_eq!(report.errors[0].symbol.as_str(), "A");
}

// =============================================================================
// Pipeline: Rate Limiting
// =============================================================================

#[tokio::test]
async fn when_provider_throttles_remaining_securities_are_skipped_without_calls() {
    // Given: The provider starts throttling at B
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("A"),
        never_calculated("B"),
        never_calculated("C"),
    ]));
    let source = Arc::new(ScriptedSource::healthy().with("B", Script::RateLimited));
    let orchestrator = orchestrator(store, source.clone(), &ProviderPolicy::unthrottled(25));

    // When: The run proceeds
    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    // Then: A is processed, B and C are skipped, and C is never fetched
    assert!(report.rate_limited);
    assert_eq!(names(&report.processed), vec!["A"]);
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(skipped, vec!["B", "C"]);
    assert!(report.skipped[0].reason.starts_with("rate limited"));
    assert_eq!(source.calls_for("C"), 0);
    assert!(!report.has_errors());
}

#[tokio::test]
async fn when_daily_budget_runs_out_the_run_stops_fetching() {
    // Given: Budget for exactly one security (three calls)
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("A"),
        never_calculated("B"),
    ]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store, source.clone(), &ProviderPolicy::unthrottled(3));

    // When: Two securities are due
    let report = orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    // Then: A is valued and B is refused before any provider call
    assert_eq!(names(&report.processed), vec!["A"]);
    assert!(report.rate_limited);
    assert_eq!(source.calls_for("B"), 0);
    assert_eq!(report.stats.api_calls, 3);
}

#[tokio::test]
async fn when_fundamentals_are_cached_no_pacing_delay_is_applied() {
    // Given: A client that spaces provider calls 300ms apart
    let store = Arc::new(MemoryStore::with_securities([never_calculated("KO")]));
    let source = Arc::new(ScriptedSource::healthy());
    let pacer = CallPacer::new(Duration::from_millis(300), Duration::from_secs(86_400), 25);
    let client = FundamentalsClient::new(source.clone(), FundamentalCache::in_memory(), pacer);
    let orchestrator = ValuationOrchestrator::new(store, client);
    let options = RunOptions {
        force_all: true,
        ..RunOptions::default()
    };

    // When: The first run fills the cache and a second run follows
    let first = orchestrator.run(&options).await.expect("first run");
    let started = Instant::now();
    let second = orchestrator.run(&options).await.expect("second run");
    let elapsed = started.elapsed();

    // Then: The second run is served from cache without waiting
    assert_eq!(first.stats.api_calls, 3);
    assert_eq!(second.stats.api_calls, 0);
    assert_eq!(second.stats.cache_hits, 3);
    assert_eq!(source.calls().len(), 3);
    assert!(elapsed < Duration::from_millis(250), "cache hits waited {elapsed:?}");
}

#[tokio::test]
async fn when_cache_misses_follow_each_other_they_are_spaced_out() {
    let store = Arc::new(MemoryStore::with_securities([never_calculated("KO")]));
    let source = Arc::new(ScriptedSource::healthy());
    let pacer = CallPacer::new(Duration::from_millis(100), Duration::from_secs(86_400), 25);
    let client = FundamentalsClient::new(source, FundamentalCache::in_memory(), pacer);
    let orchestrator = ValuationOrchestrator::new(store, client);

    let started = Instant::now();
    orchestrator
        .run(&RunOptions::default())
        .await
        .expect("run completes");

    // Three misses: two enforced gaps.
    assert!(started.elapsed() >= Duration::from_millis(200));
}

// =============================================================================
// Pipeline: Named Symbols
// =============================================================================

#[tokio::test]
async fn when_named_symbol_is_not_tracked_the_run_fails_before_fetching() {
    // Given: A universe without ZZZ
    let store = Arc::new(MemoryStore::with_securities([never_calculated("KO")]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store, source.clone(), &ProviderPolicy::unthrottled(25));

    // When: The operator asks for KO and ZZZ
    let result = orchestrator
        .run(&RunOptions {
            symbols: Some(vec![symbol("KO"), symbol("ZZZ")]),
            ..RunOptions::default()
        })
        .await;

    // Then: The whole run is rejected and nothing is fetched
    let Err(RunError::UnknownSymbols { symbols }) = result else {
        panic!("unknown symbols must abort the run");
    };
    assert_eq!(names(&symbols), vec!["ZZZ"]);
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn when_symbols_are_named_the_limit_does_not_apply() {
    let store = Arc::new(MemoryStore::with_securities([
        never_calculated("A"),
        never_calculated("B"),
        never_calculated("C"),
    ]));
    let source = Arc::new(ScriptedSource::healthy());
    let orchestrator = orchestrator(store, source, &ProviderPolicy::unthrottled(25));

    let report = orchestrator
        .run(&RunOptions {
            symbols: Some(vec![symbol("C"), symbol("A")]),
            limit: 1,
            force_all: false,
        })
        .await
        .expect("run completes");

    assert_eq!(names(&report.processed), vec!["A", "C"]);
}
