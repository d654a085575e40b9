//! Read-side commands: history, comparison view, and current value.

use fairval_core::{
    EffectiveValue, SnapshotArchiver, StoreError, Symbol, ValuationAssumptions, ValuationSnapshot,
};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cli::SymbolArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct HistoryResponse {
    symbol: Symbol,
    snapshots: Vec<ValuationSnapshot>,
}

#[derive(Debug, Serialize)]
struct ValueResponse {
    effective: EffectiveValue,
    name: Option<String>,
    is_active: bool,
    intrinsic_value_eps: Option<Decimal>,
    intrinsic_value_fcf: Option<Decimal>,
    current_eps: Option<Decimal>,
    current_fcf_per_share: Option<Decimal>,
    assumptions: ValuationAssumptions,
}

pub fn history(args: &SymbolArgs, context: &Context) -> Result<CommandResult, CliError> {
    let archiver = SnapshotArchiver::new(context.store());
    let snapshots = archiver.history(&args.symbol)?;
    let empty = snapshots.is_empty();

    let mut result = CommandResult::ok(serde_json::to_value(HistoryResponse {
        symbol: args.symbol.clone(),
        snapshots,
    })?);
    if empty {
        result = result.with_warning(format!("no snapshots recorded for {}", args.symbol));
    }
    Ok(result)
}

pub fn compare(args: &SymbolArgs, context: &Context) -> Result<CommandResult, CliError> {
    let archiver = SnapshotArchiver::new(context.store());
    let view = archiver.compare(&args.symbol)?;

    let mut result = CommandResult::ok(serde_json::to_value(&view)?);
    if view.latest.is_none() {
        result = result.with_warning(format!("no snapshots recorded for {}", args.symbol));
    }
    Ok(result)
}

pub fn value(args: &SymbolArgs, context: &Context) -> Result<CommandResult, CliError> {
    let store = context.store();
    let security = store
        .load_security(&args.symbol)?
        .ok_or_else(|| StoreError::UnknownSecurity {
            symbol: args.symbol.clone(),
        })?;
    let effective = SnapshotArchiver::new(store).effective_value(&args.symbol)?;

    let outputs = security.outputs.as_ref();
    let response = ValueResponse {
        effective,
        name: security.name.clone(),
        is_active: security.is_active,
        intrinsic_value_eps: security.intrinsic_value_eps(),
        intrinsic_value_fcf: security.intrinsic_value_fcf(),
        current_eps: outputs.map(|o| o.current_eps),
        current_fcf_per_share: outputs.map(|o| o.current_fcf_per_share),
        assumptions: security.assumptions.clone(),
    };

    let mut result = CommandResult::ok(serde_json::to_value(&response)?);
    if response.effective.value.is_none() {
        result = result.with_warning(format!("{} has not been calculated yet", args.symbol));
    }
    Ok(result)
}
