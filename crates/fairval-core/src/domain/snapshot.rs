use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    SnapshotDate, Symbol, TrackedSecurity, UtcDateTime, ValuationAssumptions, ValuationOutputs,
};

/// Dated, immutable copy of a security's valuation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub symbol: Symbol,
    pub snapshot_date: SnapshotDate,
    pub captured_at: UtcDateTime,
    pub assumptions: ValuationAssumptions,
    pub outputs: ValuationOutputs,
}

impl ValuationSnapshot {
    /// Capture `security` under `snapshot_date`; `None` if it was never calculated.
    pub fn capture(
        security: &TrackedSecurity,
        snapshot_date: SnapshotDate,
        captured_at: UtcDateTime,
    ) -> Option<Self> {
        let outputs = security.outputs.clone()?;
        Some(Self {
            symbol: security.symbol.clone(),
            snapshot_date,
            captured_at,
            assumptions: security.assumptions.clone(),
            outputs,
        })
    }

    pub fn effective_intrinsic_value(&self) -> Decimal {
        self.outputs.value_for(self.assumptions.preferred_method)
    }
}
