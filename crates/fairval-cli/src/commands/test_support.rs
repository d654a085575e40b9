use fairval_core::{
    Symbol, TrackedSecurity, UtcDateTime, ValuationAssumptions, ValuationOutputs, Warehouse,
    WarehouseConfig,
};
use rust_decimal::Decimal;

use super::Context;

pub fn temp_context() -> (tempfile::TempDir, Context) {
    let dir = tempfile::tempdir().expect("tempdir");
    let warehouse = Warehouse::open(WarehouseConfig::at(dir.path())).expect("warehouse");
    (dir, Context::with_warehouse(warehouse))
}

pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

pub fn seed_tracked(context: &Context, raw: &str) -> Symbol {
    let symbol = symbol(raw);
    context
        .store()
        .save_security(&TrackedSecurity::new(
            symbol.clone(),
            ValuationAssumptions::default(),
        ))
        .expect("save");
    symbol
}

/// Track `raw` and give it EPS 130.96 and FCF 90.00 outputs.
pub fn seed_calculated(context: &Context, raw: &str) -> Symbol {
    let symbol = seed_tracked(context, raw);
    context
        .store()
        .record_valuation(
            &symbol,
            &ValuationOutputs {
                current_eps: Decimal::new(642, 2),
                intrinsic_value_eps: Decimal::new(13096, 2),
                current_fcf_per_share: Decimal::new(500, 2),
                intrinsic_value_fcf: Decimal::new(9000, 2),
                last_calculated_at: UtcDateTime::now(),
            },
        )
        .expect("record");
    symbol
}
