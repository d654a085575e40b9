//! Persistence port for tracked securities and snapshots.
//!
//! The pipeline only talks to [`ValuationStore`]. [`MemoryStore`] backs tests;
//! the DuckDB [`Warehouse`](fairval_warehouse::Warehouse) backs the CLI.

mod memory;
mod warehouse;

use fairval_warehouse::WarehouseError;
use thiserror::Error;

use crate::{
    SnapshotDate, Symbol, TrackedSecurity, ValidationError, ValuationOutputs, ValuationSnapshot,
};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("stored row for {symbol} is invalid: {source}")]
    InvalidRecord {
        symbol: String,
        #[source]
        source: ValidationError,
    },

    #[error("security {symbol} is not tracked")]
    UnknownSecurity { symbol: Symbol },

    #[error("snapshot for {symbol} on {snapshot_date} already exists")]
    DuplicateSnapshot {
        symbol: Symbol,
        snapshot_date: SnapshotDate,
    },
}

pub trait ValuationStore: Send + Sync {
    /// Every tracked security, ordered by symbol.
    fn load_universe(&self) -> Result<Vec<TrackedSecurity>, StoreError>;

    fn load_security(&self, symbol: &Symbol) -> Result<Option<TrackedSecurity>, StoreError>;

    /// Insert or update name, activity flag, and assumptions. Existing
    /// outputs are preserved.
    fn save_security(&self, security: &TrackedSecurity) -> Result<(), StoreError>;

    /// Overwrite all outputs of one security together.
    fn record_valuation(
        &self,
        symbol: &Symbol,
        outputs: &ValuationOutputs,
    ) -> Result<(), StoreError>;

    /// Delete a security and its snapshots. `false` if it was not tracked.
    fn remove_security(&self, symbol: &Symbol) -> Result<bool, StoreError>;

    fn find_snapshot(
        &self,
        symbol: &Symbol,
        snapshot_date: SnapshotDate,
    ) -> Result<Option<ValuationSnapshot>, StoreError>;

    /// Fails with [`StoreError::DuplicateSnapshot`] if the key is taken.
    fn insert_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<(), StoreError>;

    /// `false` if there was no snapshot to overwrite.
    fn replace_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<bool, StoreError>;

    /// Newest first.
    fn snapshot_history(&self, symbol: &Symbol) -> Result<Vec<ValuationSnapshot>, StoreError>;
}
