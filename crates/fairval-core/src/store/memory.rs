use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use fairval_warehouse::WarehouseError;

use super::{StoreError, ValuationStore};
use crate::{SnapshotDate, Symbol, TrackedSecurity, ValuationOutputs, ValuationSnapshot};

#[derive(Debug, Default)]
struct State {
    securities: BTreeMap<Symbol, TrackedSecurity>,
    snapshots: BTreeMap<(Symbol, SnapshotDate), ValuationSnapshot>,
    failing_writes: BTreeSet<Symbol>,
}

/// In-process store with the same semantics as the warehouse.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_securities(securities: impl IntoIterator<Item = TrackedSecurity>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for security in securities {
                state.securities.insert(security.symbol.clone(), security);
            }
        }
        store
    }

    /// Make every write for `symbol` fail, to exercise error isolation.
    pub fn fail_writes_for(&self, symbol: &Symbol) {
        self.lock().failing_writes.insert(symbol.clone());
    }

    pub fn snapshot_count(&self) -> usize {
        self.lock().snapshots.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_writable(state: &State, symbol: &Symbol) -> Result<(), StoreError> {
    if state.failing_writes.contains(symbol) {
        return Err(StoreError::Warehouse(WarehouseError::Io(std::io::Error::other(
            format!("write rejected for {symbol}"),
        ))));
    }
    Ok(())
}

impl ValuationStore for MemoryStore {
    fn load_universe(&self) -> Result<Vec<TrackedSecurity>, StoreError> {
        Ok(self.lock().securities.values().cloned().collect())
    }

    fn load_security(&self, symbol: &Symbol) -> Result<Option<TrackedSecurity>, StoreError> {
        Ok(self.lock().securities.get(symbol).cloned())
    }

    fn save_security(&self, security: &TrackedSecurity) -> Result<(), StoreError> {
        let mut state = self.lock();
        check_writable(&state, &security.symbol)?;
        let outputs = state
            .securities
            .get(&security.symbol)
            .and_then(|existing| existing.outputs.clone());
        let mut saved = security.clone();
        saved.outputs = outputs;
        state.securities.insert(saved.symbol.clone(), saved);
        Ok(())
    }

    fn record_valuation(
        &self,
        symbol: &Symbol,
        outputs: &ValuationOutputs,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        check_writable(&state, symbol)?;
        let security = state
            .securities
            .get_mut(symbol)
            .ok_or_else(|| StoreError::UnknownSecurity {
                symbol: symbol.clone(),
            })?;
        security.outputs = Some(outputs.clone());
        Ok(())
    }

    fn remove_security(&self, symbol: &Symbol) -> Result<bool, StoreError> {
        let mut state = self.lock();
        check_writable(&state, symbol)?;
        state.snapshots.retain(|(owner, _), _| owner != symbol);
        Ok(state.securities.remove(symbol).is_some())
    }

    fn find_snapshot(
        &self,
        symbol: &Symbol,
        snapshot_date: SnapshotDate,
    ) -> Result<Option<ValuationSnapshot>, StoreError> {
        Ok(self
            .lock()
            .snapshots
            .get(&(symbol.clone(), snapshot_date))
            .cloned())
    }

    fn insert_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<(), StoreError> {
        let mut state = self.lock();
        check_writable(&state, &snapshot.symbol)?;
        let key = (snapshot.symbol.clone(), snapshot.snapshot_date);
        if state.snapshots.contains_key(&key) {
            return Err(StoreError::DuplicateSnapshot {
                symbol: snapshot.symbol.clone(),
                snapshot_date: snapshot.snapshot_date,
            });
        }
        state.snapshots.insert(key, snapshot.clone());
        Ok(())
    }

    fn replace_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<bool, StoreError> {
        let mut state = self.lock();
        check_writable(&state, &snapshot.symbol)?;
        let key = (snapshot.symbol.clone(), snapshot.snapshot_date);
        match state.snapshots.get_mut(&key) {
            Some(existing) => {
                *existing = snapshot.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn snapshot_history(&self, symbol: &Symbol) -> Result<Vec<ValuationSnapshot>, StoreError> {
        let state = self.lock();
        Ok(state
            .snapshots
            .iter()
            .rev()
            .filter(|((owner, _), _)| owner == symbol)
            .map(|(_, snapshot)| snapshot.clone())
            .collect())
    }
}
