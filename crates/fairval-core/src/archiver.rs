//! Dated snapshots of valuation state and comparisons across them.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::store::{StoreError, ValuationStore};
use crate::{
    PreferredMethod, SnapshotDate, Symbol, TrackedSecurity, UtcDateTime, ValuationSnapshot,
    ValueDelta,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyExists,
    NotCalculated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum SnapshotOutcome {
    Created,
    Overwritten,
    Skipped(SkipReason),
    WouldCreate,
    WouldOverwrite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Defaults to the start of the current calendar quarter.
    pub date: Option<SnapshotDate>,
    pub force: bool,
    pub dry_run: bool,
    pub symbols: Option<Vec<Symbol>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub symbol: Symbol,
    pub outcome: SnapshotOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveFailure {
    pub symbol: Symbol,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveCounts {
    pub created: usize,
    pub overwritten: usize,
    pub skipped_existing: usize,
    pub skipped_not_calculated: usize,
    pub planned: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub snapshot_date: SnapshotDate,
    pub dry_run: bool,
    pub entries: Vec<ArchiveEntry>,
    pub errors: Vec<ArchiveFailure>,
    pub counts: ArchiveCounts,
    pub warnings: Vec<String>,
}

/// Deltas of the three tracked values between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonDeltas {
    pub intrinsic_value_eps: ValueDelta,
    pub intrinsic_value_fcf: ValueDelta,
    pub effective_value: ValueDelta,
}

impl ComparisonDeltas {
    fn between(from: Option<&ValuationSnapshot>, to: Option<&ValuationSnapshot>) -> Self {
        Self {
            intrinsic_value_eps: ValueDelta::between(
                from.map(|s| s.outputs.intrinsic_value_eps),
                to.map(|s| s.outputs.intrinsic_value_eps),
            ),
            intrinsic_value_fcf: ValueDelta::between(
                from.map(|s| s.outputs.intrinsic_value_fcf),
                to.map(|s| s.outputs.intrinsic_value_fcf),
            ),
            effective_value: ValueDelta::between(
                from.map(ValuationSnapshot::effective_intrinsic_value),
                to.map(ValuationSnapshot::effective_intrinsic_value),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveValue {
    pub symbol: Symbol,
    pub method: PreferredMethod,
    pub value: Option<Decimal>,
    pub last_calculated_at: Option<UtcDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonView {
    pub symbol: Symbol,
    pub current: EffectiveValue,
    pub latest: Option<ValuationSnapshot>,
    pub prior_period: Option<ValuationSnapshot>,
    pub prior_year: Option<ValuationSnapshot>,
    pub vs_prior_period: ComparisonDeltas,
    pub vs_prior_year: ComparisonDeltas,
}

pub struct SnapshotArchiver {
    store: Arc<dyn ValuationStore>,
}

impl SnapshotArchiver {
    pub fn new(store: Arc<dyn ValuationStore>) -> Self {
        Self { store }
    }

    /// Snapshot one security. An existing snapshot is left alone unless `force`.
    pub fn create_snapshot(
        &self,
        security: &TrackedSecurity,
        snapshot_date: SnapshotDate,
        force: bool,
    ) -> Result<SnapshotOutcome, StoreError> {
        let Some(snapshot) = ValuationSnapshot::capture(security, snapshot_date, UtcDateTime::now())
        else {
            return Ok(SnapshotOutcome::Skipped(SkipReason::NotCalculated));
        };

        let exists = self
            .store
            .find_snapshot(&security.symbol, snapshot_date)?
            .is_some();
        if exists {
            if !force {
                return Ok(SnapshotOutcome::Skipped(SkipReason::AlreadyExists));
            }
            if self.store.replace_snapshot(&snapshot)? {
                return Ok(SnapshotOutcome::Overwritten);
            }
        }

        match self.store.insert_snapshot(&snapshot) {
            Ok(()) => Ok(SnapshotOutcome::Created),
            // Lost a race with another writer; the stored row wins.
            Err(StoreError::DuplicateSnapshot { .. }) if !force => {
                Ok(SnapshotOutcome::Skipped(SkipReason::AlreadyExists))
            }
            Err(error) => Err(error),
        }
    }

    /// What [`create_snapshot`](Self::create_snapshot) would do, without writing.
    pub fn plan_snapshot(
        &self,
        security: &TrackedSecurity,
        snapshot_date: SnapshotDate,
        force: bool,
    ) -> Result<SnapshotOutcome, StoreError> {
        if security.outputs.is_none() {
            return Ok(SnapshotOutcome::Skipped(SkipReason::NotCalculated));
        }
        let exists = self
            .store
            .find_snapshot(&security.symbol, snapshot_date)?
            .is_some();
        Ok(match (exists, force) {
            (false, _) => SnapshotOutcome::WouldCreate,
            (true, true) => SnapshotOutcome::WouldOverwrite,
            (true, false) => SnapshotOutcome::Skipped(SkipReason::AlreadyExists),
        })
    }

    /// Snapshot every active security (or the named ones).
    ///
    /// Store failures for one security are reported and do not stop the rest;
    /// only a failure to load the universe is returned as an error.
    pub fn archive(&self, options: &ArchiveOptions) -> Result<ArchiveReport, StoreError> {
        let snapshot_date = options.date.unwrap_or_else(SnapshotDate::current_quarter_start);
        let mut warnings = Vec::new();
        if !snapshot_date.is_quarter_start() {
            warn!(%snapshot_date, "snapshot date is not a calendar quarter start");
            warnings.push(format!(
                "snapshot date {snapshot_date} is not a calendar quarter start"
            ));
        }

        let universe = self.store.load_universe()?;
        let targets: Vec<&TrackedSecurity> = match &options.symbols {
            Some(symbols) => {
                for symbol in symbols {
                    if !universe.iter().any(|s| &s.symbol == symbol) {
                        warnings.push(format!("{symbol} is not tracked"));
                    }
                }
                universe
                    .iter()
                    .filter(|s| symbols.contains(&s.symbol))
                    .collect()
            }
            None => universe.iter().filter(|s| s.is_active).collect(),
        };

        let mut entries = Vec::new();
        let mut errors = Vec::new();
        let mut counts = ArchiveCounts::default();
        for security in targets {
            let result = if options.dry_run {
                self.plan_snapshot(security, snapshot_date, options.force)
            } else {
                self.create_snapshot(security, snapshot_date, options.force)
            };
            match result {
                Ok(outcome) => {
                    info!(symbol = %security.symbol, ?outcome, %snapshot_date, "snapshot");
                    counts.record(outcome);
                    entries.push(ArchiveEntry {
                        symbol: security.symbol.clone(),
                        outcome,
                    });
                }
                Err(error) => {
                    warn!(symbol = %security.symbol, %error, "snapshot failed");
                    counts.failed += 1;
                    errors.push(ArchiveFailure {
                        symbol: security.symbol.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(ArchiveReport {
            snapshot_date,
            dry_run: options.dry_run,
            entries,
            errors,
            counts,
            warnings,
        })
    }

    pub fn history(&self, symbol: &Symbol) -> Result<Vec<ValuationSnapshot>, StoreError> {
        self.store.snapshot_history(symbol)
    }

    pub fn effective_value(&self, symbol: &Symbol) -> Result<EffectiveValue, StoreError> {
        let security = self.require(symbol)?;
        Ok(effective_of(&security))
    }

    pub fn compare(&self, symbol: &Symbol) -> Result<ComparisonView, StoreError> {
        let security = self.require(symbol)?;
        let history = self.store.snapshot_history(symbol)?;

        let latest = history.first().cloned();
        let prior_period = latest.as_ref().and_then(|latest| {
            history
                .iter()
                .find(|s| s.snapshot_date < latest.snapshot_date)
                .cloned()
        });
        let prior_year = latest.as_ref().and_then(|latest| {
            let cutoff = latest.snapshot_date.one_year_earlier();
            history.iter().find(|s| s.snapshot_date <= cutoff).cloned()
        });

        Ok(ComparisonView {
            symbol: symbol.clone(),
            current: effective_of(&security),
            vs_prior_period: ComparisonDeltas::between(prior_period.as_ref(), latest.as_ref()),
            vs_prior_year: ComparisonDeltas::between(prior_year.as_ref(), latest.as_ref()),
            latest,
            prior_period,
            prior_year,
        })
    }

    fn require(&self, symbol: &Symbol) -> Result<TrackedSecurity, StoreError> {
        self.store
            .load_security(symbol)?
            .ok_or_else(|| StoreError::UnknownSecurity {
                symbol: symbol.clone(),
            })
    }
}

impl ArchiveCounts {
    fn record(&mut self, outcome: SnapshotOutcome) {
        match outcome {
            SnapshotOutcome::Created => self.created += 1,
            SnapshotOutcome::Overwritten => self.overwritten += 1,
            SnapshotOutcome::Skipped(SkipReason::AlreadyExists) => self.skipped_existing += 1,
            SnapshotOutcome::Skipped(SkipReason::NotCalculated) => self.skipped_not_calculated += 1,
            SnapshotOutcome::WouldCreate | SnapshotOutcome::WouldOverwrite => self.planned += 1,
        }
    }
}

fn effective_of(security: &TrackedSecurity) -> EffectiveValue {
    EffectiveValue {
        symbol: security.symbol.clone(),
        method: security.assumptions.preferred_method,
        value: security.effective_intrinsic_value(),
        last_calculated_at: security.last_calculated_at(),
    }
}
