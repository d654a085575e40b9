use fairval_core::{StoreError, Symbol, TrackedSecurity, ValuationAssumptions};
use serde::Serialize;
use tracing::info;

use crate::cli::{SymbolArgs, TrackArgs};
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct TrackResponse {
    created: bool,
    security: TrackedSecurity,
}

#[derive(Debug, Serialize)]
struct UntrackResponse {
    symbol: Symbol,
    removed: bool,
}

pub fn track(args: &TrackArgs, context: &Context) -> Result<CommandResult, CliError> {
    let store = context.store();
    let existing = store.load_security(&args.symbol)?;
    let created = existing.is_none();

    let mut security = existing.unwrap_or_else(|| {
        TrackedSecurity::new(args.symbol.clone(), ValuationAssumptions::default())
    });
    apply(args, &mut security);
    security.assumptions.check_precision()?;
    store.save_security(&security)?;
    info!(symbol = %security.symbol, created, "security tracked");

    // Re-read so the response carries whatever outputs the row already had.
    let security = store
        .load_security(&args.symbol)?
        .ok_or_else(|| StoreError::UnknownSecurity {
            symbol: args.symbol.clone(),
        })?;

    let mut result = CommandResult::ok(serde_json::to_value(TrackResponse { created, security })?);
    if !created && has_assumption_flags(args) {
        result = result.with_warning(format!(
            "assumptions for {} changed; stored values reflect the previous assumptions \
             until the next calculate",
            args.symbol
        ));
    }
    Ok(result)
}

pub fn untrack(args: &SymbolArgs, context: &Context) -> Result<CommandResult, CliError> {
    let removed = context.store().remove_security(&args.symbol)?;
    info!(symbol = %args.symbol, removed, "security untracked");

    let mut result = CommandResult::ok(serde_json::to_value(UntrackResponse {
        symbol: args.symbol.clone(),
        removed,
    })?);
    if !removed {
        result = result.with_warning(format!("{} was not tracked", args.symbol));
    }
    Ok(result)
}

fn apply(args: &TrackArgs, security: &mut TrackedSecurity) {
    if let Some(name) = &args.name {
        security.name = Some(name.clone());
    }
    if args.inactive {
        security.is_active = false;
    }
    if args.active {
        security.is_active = true;
    }

    let assumptions = &mut security.assumptions;
    if let Some(value) = args.eps_growth {
        assumptions.eps_growth_rate = value;
    }
    if let Some(value) = args.eps_multiple {
        assumptions.eps_exit_multiple = value;
    }
    if let Some(value) = args.fcf_growth {
        assumptions.fcf_growth_rate = value;
    }
    if let Some(value) = args.fcf_multiple {
        assumptions.fcf_exit_multiple = value;
    }
    if let Some(value) = args.required_return {
        assumptions.required_return_rate = value;
    }
    if let Some(value) = args.years {
        assumptions.projection_years = value;
    }
    if let Some(method) = args.method {
        assumptions.preferred_method = method;
    }
}

fn has_assumption_flags(args: &TrackArgs) -> bool {
    args.eps_growth.is_some()
        || args.eps_multiple.is_some()
        || args.fcf_growth.is_some()
        || args.fcf_multiple.is_some()
        || args.required_return.is_some()
        || args.years.is_some()
        || args.method.is_some()
}
