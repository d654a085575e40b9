mod cache;
mod calculate;
mod dcf;
mod history;
mod list;
mod snapshot;
mod track;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fairval_core::{
    adapters, AlphaVantageSource, Envelope, EnvelopeError, FundamentalCache, FundamentalsClient,
    ProviderPolicy, ReqwestHttpClient, ValuationStore, Warehouse, WarehouseConfig,
};
use serde_json::Value;
use tracing::debug;

use crate::cli::{CacheCommand, Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }
}

/// Resources shared by commands that touch the warehouse.
pub struct Context {
    warehouse: Warehouse,
    policy: ProviderPolicy,
    persist_cache: bool,
}

impl Context {
    fn open(cli: &Cli) -> Result<Self, CliError> {
        let config = match &cli.db_path {
            Some(path) => warehouse_config_at(path),
            None => WarehouseConfig::default(),
        };
        let warehouse = Warehouse::open(config)?;
        debug!(db_path = %warehouse.db_path().display(), "warehouse opened");

        Ok(Self {
            warehouse,
            policy: provider_policy(cli),
            persist_cache: !cli.no_cache_persist,
        })
    }

    #[cfg(test)]
    pub fn with_warehouse(warehouse: Warehouse) -> Self {
        Self {
            warehouse,
            policy: ProviderPolicy::unthrottled(25),
            persist_cache: true,
        }
    }

    pub fn store(&self) -> Arc<dyn ValuationStore> {
        Arc::new(self.warehouse.clone())
    }

    pub fn cache(&self) -> FundamentalCache {
        if self.persist_cache {
            FundamentalCache::new(Arc::new(self.warehouse.clone()))
        } else {
            FundamentalCache::in_memory()
        }
    }

    pub fn fundamentals_client(&self) -> FundamentalsClient {
        let source = AlphaVantageSource::from_policy(
            Arc::new(ReqwestHttpClient::default()),
            adapters::api_key_from_env(),
            &self.policy,
        );
        FundamentalsClient::from_policy(Arc::new(source), self.cache(), &self.policy)
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let started = Instant::now();

    // `dcf` is pure computation and never opens the warehouse.
    let command_result = match &cli.command {
        Command::Dcf(args) => dcf::run(args)?,
        Command::Calculate(args) => calculate::run(args, &Context::open(cli)?).await?,
        Command::Snapshot(args) => snapshot::run(args, &Context::open(cli)?)?,
        Command::History(args) => history::history(args, &Context::open(cli)?)?,
        Command::Compare(args) => history::compare(args, &Context::open(cli)?)?,
        Command::Value(args) => history::value(args, &Context::open(cli)?)?,
        Command::Track(args) => track::track(args, &Context::open(cli)?)?,
        Command::Untrack(args) => track::untrack(args, &Context::open(cli)?)?,
        Command::List(args) => list::run(args, &Context::open(cli)?)?,
        Command::Cache(args) => match args.command {
            CacheCommand::Purge => cache::purge(&Context::open(cli)?)?,
        },
    };

    let CommandResult {
        data,
        warnings,
        errors,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut metadata = Metadata::new(latency_ms);
    for warning in warnings {
        metadata.push_warning(warning);
    }
    let meta = metadata.into_envelope_meta()?;

    Ok(Envelope::with_errors(meta, data, errors))
}

/// Global flags override the Alpha Vantage free-tier defaults.
fn provider_policy(cli: &Cli) -> ProviderPolicy {
    let mut policy = ProviderPolicy::alphavantage_default();
    if let Some(seconds) = cli.min_call_interval_secs {
        policy.min_call_interval = Duration::from_secs(seconds);
    }
    if let Some(quota) = cli.daily_quota {
        policy.quota_limit = quota;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        policy.request_timeout = Duration::from_millis(timeout_ms);
    }
    policy
}

fn warehouse_config_at(db_path: &Path) -> WarehouseConfig {
    let home = db_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    WarehouseConfig {
        fairval_home: home,
        db_path: db_path.to_path_buf(),
        ..WarehouseConfig::default()
    }
}
