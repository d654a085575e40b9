use fairval_core::{PreferredMethod, Symbol, TrackedSecurity, UtcDateTime};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cli::ListArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

#[derive(Debug, Serialize)]
struct ListEntry {
    symbol: Symbol,
    name: Option<String>,
    is_active: bool,
    preferred_method: PreferredMethod,
    effective_value: Option<Decimal>,
    last_calculated_at: Option<UtcDateTime>,
}

impl From<&TrackedSecurity> for ListEntry {
    fn from(security: &TrackedSecurity) -> Self {
        Self {
            symbol: security.symbol.clone(),
            name: security.name.clone(),
            is_active: security.is_active,
            preferred_method: security.assumptions.preferred_method,
            effective_value: security.effective_intrinsic_value(),
            last_calculated_at: security.last_calculated_at(),
        }
    }
}

pub fn run(args: &ListArgs, context: &Context) -> Result<CommandResult, CliError> {
    let universe = context.store().load_universe()?;
    let entries: Vec<ListEntry> = universe
        .iter()
        .filter(|security| security.is_active || !args.active_only)
        .map(ListEntry::from)
        .collect();

    Ok(CommandResult::ok(serde_json::json!({
        "count": entries.len(),
        "securities": serde_json::to_value(&entries)?,
    })))
}
