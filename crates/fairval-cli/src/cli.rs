//! CLI argument definitions for fairval.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `calculate` | Revalue the stalest tracked securities |
//! | `snapshot` | Archive dated snapshots of current valuations |
//! | `history` | Snapshot history for one symbol, newest first |
//! | `compare` | Latest snapshot against prior period and prior year |
//! | `value` | Effective and per-method intrinsic value of one symbol |
//! | `dcf` | Ad-hoc DCF breakdown |
//! | `track` | Create or update a tracked security |
//! | `untrack` | Remove a security and its snapshots |
//! | `list` | Tracked universe |
//! | `cache` | Fundamentals cache maintenance |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--verbose` | `false` | Debug-level logging on stderr |
//! | `--db-path` | `$FAIRVAL_HOME/warehouse.duckdb` | Warehouse file |
//! | `--min-call-interval-secs` | `20` | Spacing between uncached provider calls |
//! | `--daily-quota` | `25` | Provider calls allowed per day |
//! | `--timeout-ms` | `10000` | Provider request timeout |
//!
//! # Examples
//!
//! ```bash
//! fairval track KO --eps-growth 6 --eps-multiple 22 --required-return 9
//! fairval calculate --limit 4
//! fairval snapshot --dry-run
//! fairval compare KO --pretty
//! fairval dcf --base 6.42 --growth 10 --multiple 20 --return 15 --years 5
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fairval_core::{PreferredMethod, SnapshotDate, Symbol, DEFAULT_RUN_LIMIT};
use rust_decimal::Decimal;

/// Intrinsic-value tracking for a curated equity universe.
#[derive(Debug, Parser)]
#[command(
    name = "fairval",
    author,
    version,
    about = "DCF intrinsic-value pipeline",
    long_about = "fairval keeps a small universe of equities valued with a two-variant DCF \
(EPS and free cash flow) on top of Alpha Vantage fundamentals.\n\
\n\
  • Seven-day fundamentals cache in the local DuckDB warehouse\n\
  • Call pacing and a daily call budget for the free tier\n\
  • Quarterly snapshots with prior-period and prior-year comparisons\n\
\n\
Use 'fairval <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Log at debug level. `RUST_LOG` takes precedence when set.
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    /// Warehouse database file.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Minimum spacing between uncached provider calls, in seconds.
    #[arg(long, global = true)]
    pub min_call_interval_secs: Option<u64>,

    /// Provider calls allowed per 24 hours.
    #[arg(long, global = true)]
    pub daily_quota: Option<u32>,

    /// Provider request timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Keep fetched fundamentals in memory only for this invocation.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache_persist: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch fundamentals and revalue tracked securities.
    ///
    /// Without --symbols the stalest securities are picked first, up to --limit.
    ///
    /// # Examples
    ///
    ///   fairval calculate
    ///   fairval calculate --symbols KO,PEP
    ///   fairval calculate --force-all
    Calculate(CalculateArgs),

    /// Archive a dated snapshot of every calculated security.
    ///
    /// # Examples
    ///
    ///   fairval snapshot
    ///   fairval snapshot --date 2026-07-01 --force
    Snapshot(SnapshotArgs),

    /// Snapshot history for one symbol, newest first.
    History(SymbolArgs),

    /// Compare the latest snapshot with the prior period and prior year.
    Compare(SymbolArgs),

    /// Current effective intrinsic value with both method values.
    Value(SymbolArgs),

    /// Run the DCF engine on ad-hoc inputs and print the breakdown.
    ///
    /// # Examples
    ///
    ///   fairval dcf --base 6.42 --growth 10 --multiple 20 --return 15 --years 5
    Dcf(DcfArgs),

    /// Start tracking a symbol, or update its assumptions.
    ///
    /// Flags that are not given keep their stored value (or the default for
    /// a new security).
    Track(TrackArgs),

    /// Stop tracking a symbol and delete its snapshots.
    Untrack(SymbolArgs),

    /// List tracked securities with their effective values.
    List(ListArgs),

    /// Fundamentals cache maintenance.
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
pub struct CalculateArgs {
    /// Restrict the run to these tracked symbols (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<Symbol>,

    /// Maximum number of securities to value.
    #[arg(long, default_value_t = DEFAULT_RUN_LIMIT)]
    pub limit: usize,

    /// Value every active security, ignoring --limit.
    #[arg(long, default_value_t = false)]
    pub force_all: bool,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Snapshot date; defaults to the start of the current quarter.
    #[arg(long)]
    pub date: Option<SnapshotDate>,

    /// Overwrite snapshots that already exist for the date.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// Report what would happen without writing.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Restrict to these symbols (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    pub symbol: Symbol,
}

#[derive(Debug, Args)]
pub struct DcfArgs {
    /// Current per-share metric (EPS or FCF per share).
    #[arg(long, allow_hyphen_values = true)]
    pub base: Decimal,

    /// Annual growth rate in percent.
    #[arg(long, allow_hyphen_values = true)]
    pub growth: Decimal,

    /// Exit multiple applied to the final projected year.
    #[arg(long)]
    pub multiple: Decimal,

    /// Required annual return in percent.
    #[arg(long = "return", allow_hyphen_values = true)]
    pub required_return: Decimal,

    /// Projection horizon in years.
    #[arg(long)]
    pub years: i32,
}

#[derive(Debug, Args)]
pub struct TrackArgs {
    pub symbol: Symbol,

    /// Display name.
    #[arg(long)]
    pub name: Option<String>,

    /// Keep the security but exclude it from calculation runs.
    #[arg(long, default_value_t = false, conflicts_with = "active")]
    pub inactive: bool,

    /// Re-include a previously inactive security.
    #[arg(long, default_value_t = false)]
    pub active: bool,

    #[arg(long, allow_hyphen_values = true)]
    pub eps_growth: Option<Decimal>,

    #[arg(long)]
    pub eps_multiple: Option<Decimal>,

    #[arg(long, allow_hyphen_values = true)]
    pub fcf_growth: Option<Decimal>,

    #[arg(long)]
    pub fcf_multiple: Option<Decimal>,

    #[arg(long, allow_hyphen_values = true)]
    pub required_return: Option<Decimal>,

    #[arg(long)]
    pub years: Option<i32>,

    /// Which variant supplies the effective value (EPS or FCF).
    #[arg(long)]
    pub method: Option<PreferredMethod>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Omit inactive securities.
    #[arg(long, default_value_t = false)]
    pub active_only: bool,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Delete cache entries whose TTL has passed.
    Purge,
}
