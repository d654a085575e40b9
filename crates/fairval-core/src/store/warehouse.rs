use std::str::FromStr;

use fairval_warehouse::{
    SecurityRecord, SnapshotRecord, ValuationRecord, Warehouse, WarehouseError,
};
use rust_decimal::Decimal;
use tracing::warn;

use super::{StoreError, ValuationStore};
use crate::valuation::round_currency;
use crate::{
    PreferredMethod, SnapshotDate, Symbol, TrackedSecurity, UtcDateTime, ValidationError,
    ValuationAssumptions, ValuationOutputs, ValuationSnapshot,
};

impl ValuationStore for Warehouse {
    fn load_universe(&self) -> Result<Vec<TrackedSecurity>, StoreError> {
        self.list_securities()?
            .into_iter()
            .map(security_from_record)
            .collect()
    }

    fn load_security(&self, symbol: &Symbol) -> Result<Option<TrackedSecurity>, StoreError> {
        self.get_security(symbol.as_str())?
            .map(security_from_record)
            .transpose()
    }

    fn save_security(&self, security: &TrackedSecurity) -> Result<(), StoreError> {
        Ok(self.upsert_security(&security_to_record(security))?)
    }

    fn record_valuation(
        &self,
        symbol: &Symbol,
        outputs: &ValuationOutputs,
    ) -> Result<(), StoreError> {
        let record = ValuationRecord {
            current_eps: outputs.current_eps.to_string(),
            intrinsic_value_eps: outputs.intrinsic_value_eps.to_string(),
            current_fcf_per_share: outputs.current_fcf_per_share.to_string(),
            intrinsic_value_fcf: outputs.intrinsic_value_fcf.to_string(),
            calculated_at: outputs.last_calculated_at.to_storage(),
        };
        if Warehouse::record_valuation(self, symbol.as_str(), &record)? {
            Ok(())
        } else {
            Err(StoreError::UnknownSecurity {
                symbol: symbol.clone(),
            })
        }
    }

    fn remove_security(&self, symbol: &Symbol) -> Result<bool, StoreError> {
        Ok(self.delete_security(symbol.as_str())?)
    }

    fn find_snapshot(
        &self,
        symbol: &Symbol,
        snapshot_date: SnapshotDate,
    ) -> Result<Option<ValuationSnapshot>, StoreError> {
        Warehouse::find_snapshot(self, symbol.as_str(), &snapshot_date.format())?
            .map(snapshot_from_record)
            .transpose()
    }

    fn insert_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<(), StoreError> {
        match Warehouse::insert_snapshot(self, &snapshot_to_record(snapshot)) {
            Ok(()) => Ok(()),
            Err(WarehouseError::DuplicateSnapshot { .. }) => Err(StoreError::DuplicateSnapshot {
                symbol: snapshot.symbol.clone(),
                snapshot_date: snapshot.snapshot_date,
            }),
            Err(error) => Err(error.into()),
        }
    }

    fn replace_snapshot(&self, snapshot: &ValuationSnapshot) -> Result<bool, StoreError> {
        Ok(Warehouse::replace_snapshot(self, &snapshot_to_record(snapshot))?)
    }

    fn snapshot_history(&self, symbol: &Symbol) -> Result<Vec<ValuationSnapshot>, StoreError> {
        Warehouse::snapshot_history(self, symbol.as_str())?
            .into_iter()
            .map(snapshot_from_record)
            .collect()
    }
}

fn security_to_record(security: &TrackedSecurity) -> SecurityRecord {
    let assumptions = &security.assumptions;
    let outputs = security.outputs.as_ref();
    SecurityRecord {
        symbol: security.symbol.as_str().to_owned(),
        name: security.name.clone(),
        is_active: security.is_active,
        eps_growth_rate: assumptions.eps_growth_rate.to_string(),
        eps_exit_multiple: assumptions.eps_exit_multiple.to_string(),
        fcf_growth_rate: assumptions.fcf_growth_rate.to_string(),
        fcf_exit_multiple: assumptions.fcf_exit_multiple.to_string(),
        required_return_rate: assumptions.required_return_rate.to_string(),
        projection_years: assumptions.projection_years,
        preferred_method: assumptions.preferred_method.as_str().to_owned(),
        current_eps: outputs.map(|o| o.current_eps.to_string()),
        intrinsic_value_eps: outputs.map(|o| o.intrinsic_value_eps.to_string()),
        current_fcf_per_share: outputs.map(|o| o.current_fcf_per_share.to_string()),
        intrinsic_value_fcf: outputs.map(|o| o.intrinsic_value_fcf.to_string()),
        last_calculated_at: outputs.map(|o| o.last_calculated_at.to_storage()),
    }
}

fn security_from_record(record: SecurityRecord) -> Result<TrackedSecurity, StoreError> {
    let row = Row(&record.symbol);
    let symbol = Symbol::parse(&record.symbol).map_err(|source| row.invalid(source))?;
    let assumptions = row.assumptions(
        [
            &record.eps_growth_rate,
            &record.eps_exit_multiple,
            &record.fcf_growth_rate,
            &record.fcf_exit_multiple,
            &record.required_return_rate,
        ],
        record.projection_years,
        &record.preferred_method,
    )?;

    let outputs = match (
        &record.current_eps,
        &record.intrinsic_value_eps,
        &record.current_fcf_per_share,
        &record.intrinsic_value_fcf,
        &record.last_calculated_at,
    ) {
        (None, None, None, None, None) => None,
        (Some(eps), Some(value_eps), Some(fcf), Some(value_fcf), Some(at)) => {
            Some(row.outputs([eps, value_eps, fcf, value_fcf], at)?)
        }
        _ => {
            warn!(
                symbol = %record.symbol,
                "partially populated outputs; treating as never calculated"
            );
            None
        }
    };

    Ok(TrackedSecurity {
        symbol,
        name: record.name,
        is_active: record.is_active,
        assumptions,
        outputs,
    })
}

fn snapshot_to_record(snapshot: &ValuationSnapshot) -> SnapshotRecord {
    let assumptions = &snapshot.assumptions;
    let outputs = &snapshot.outputs;
    SnapshotRecord {
        symbol: snapshot.symbol.as_str().to_owned(),
        snapshot_date: snapshot.snapshot_date.format(),
        captured_at: snapshot.captured_at.to_storage(),
        eps_growth_rate: assumptions.eps_growth_rate.to_string(),
        eps_exit_multiple: assumptions.eps_exit_multiple.to_string(),
        fcf_growth_rate: assumptions.fcf_growth_rate.to_string(),
        fcf_exit_multiple: assumptions.fcf_exit_multiple.to_string(),
        required_return_rate: assumptions.required_return_rate.to_string(),
        projection_years: assumptions.projection_years,
        preferred_method: assumptions.preferred_method.as_str().to_owned(),
        current_eps: outputs.current_eps.to_string(),
        intrinsic_value_eps: outputs.intrinsic_value_eps.to_string(),
        current_fcf_per_share: outputs.current_fcf_per_share.to_string(),
        intrinsic_value_fcf: outputs.intrinsic_value_fcf.to_string(),
        calculated_at: outputs.last_calculated_at.to_storage(),
    }
}

fn snapshot_from_record(record: SnapshotRecord) -> Result<ValuationSnapshot, StoreError> {
    let row = Row(&record.symbol);
    Ok(ValuationSnapshot {
        symbol: Symbol::parse(&record.symbol).map_err(|source| row.invalid(source))?,
        snapshot_date: SnapshotDate::parse(&record.snapshot_date)
            .map_err(|source| row.invalid(source))?,
        captured_at: UtcDateTime::parse_storage(&record.captured_at)
            .map_err(|source| row.invalid(source))?,
        assumptions: row.assumptions(
            [
                &record.eps_growth_rate,
                &record.eps_exit_multiple,
                &record.fcf_growth_rate,
                &record.fcf_exit_multiple,
                &record.required_return_rate,
            ],
            record.projection_years,
            &record.preferred_method,
        )?,
        outputs: row.outputs(
            [
                &record.current_eps,
                &record.intrinsic_value_eps,
                &record.current_fcf_per_share,
                &record.intrinsic_value_fcf,
            ],
            &record.calculated_at,
        )?,
    })
}

/// Reads typed values out of one stored row, tagging failures with its symbol.
struct Row<'a>(&'a str);

impl Row<'_> {
    /// Columns in the order growth, exit multiple for EPS then FCF, then required return.
    fn assumptions(
        &self,
        [eps_growth, eps_exit, fcf_growth, fcf_exit, required]: [&String; 5],
        projection_years: i32,
        preferred_method: &str,
    ) -> Result<ValuationAssumptions, StoreError> {
        Ok(ValuationAssumptions {
            eps_growth_rate: self.decimal("eps_growth_rate", eps_growth)?,
            eps_exit_multiple: self.decimal("eps_exit_multiple", eps_exit)?,
            fcf_growth_rate: self.decimal("fcf_growth_rate", fcf_growth)?,
            fcf_exit_multiple: self.decimal("fcf_exit_multiple", fcf_exit)?,
            required_return_rate: self.decimal("required_return_rate", required)?,
            projection_years,
            preferred_method: PreferredMethod::from_str(preferred_method)
                .map_err(|source| self.invalid(source))?,
        })
    }

    /// Columns in the order EPS, EPS value, FCF per share, FCF value.
    fn outputs(
        &self,
        [eps, value_eps, fcf, value_fcf]: [&String; 4],
        calculated_at: &str,
    ) -> Result<ValuationOutputs, StoreError> {
        Ok(ValuationOutputs {
            current_eps: self.decimal("current_eps", eps)?,
            intrinsic_value_eps: self.currency("intrinsic_value_eps", value_eps)?,
            current_fcf_per_share: self.decimal("current_fcf_per_share", fcf)?,
            intrinsic_value_fcf: self.currency("intrinsic_value_fcf", value_fcf)?,
            last_calculated_at: UtcDateTime::parse_storage(calculated_at)
                .map_err(|source| self.invalid(source))?,
        })
    }

    /// Stored decimals carry the column's scale (`130.96000000`); strip it.
    fn decimal(&self, field: &'static str, value: &str) -> Result<Decimal, StoreError> {
        Decimal::from_str(value.trim())
            .map(|parsed| parsed.normalize())
            .map_err(|_| {
                self.invalid(ValidationError::InvalidDecimal {
                    field,
                    value: value.to_owned(),
                })
            })
    }

    /// Intrinsic values keep two places so `90.00` reads back as `90.00`.
    fn currency(&self, field: &'static str, value: &str) -> Result<Decimal, StoreError> {
        self.decimal(field, value).map(round_currency)
    }

    fn invalid(&self, source: ValidationError) -> StoreError {
        StoreError::InvalidRecord {
            symbol: self.0.to_owned(),
            source,
        }
    }
}
