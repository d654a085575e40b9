use std::cmp::Ordering;

use crate::TrackedSecurity;

/// Pick the securities most in need of revaluation.
///
/// Inactive rows are dropped. Never-calculated securities come first (by
/// symbol), then the stalest calculations; ties break on symbol so the order
/// is total. `force_all` returns every active security in symbol order and
/// ignores `limit`.
pub fn select(universe: &[TrackedSecurity], limit: usize, force_all: bool) -> Vec<TrackedSecurity> {
    let mut active: Vec<TrackedSecurity> = universe
        .iter()
        .filter(|security| security.is_active)
        .cloned()
        .collect();

    if force_all {
        active.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        return active;
    }

    active.sort_by(staleness_order);
    active.truncate(limit);
    active
}

fn staleness_order(a: &TrackedSecurity, b: &TrackedSecurity) -> Ordering {
    let by_age = match (a.last_calculated_at(), b.last_calculated_at()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => left.cmp(&right),
    };
    by_age.then_with(|| a.symbol.cmp(&b.symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Symbol, UtcDateTime, ValuationAssumptions, ValuationOutputs};
    use rust_decimal::Decimal;

    fn security(symbol: &str, calculated_at: Option<&str>) -> TrackedSecurity {
        let base = TrackedSecurity::new(
            Symbol::parse(symbol).expect("symbol"),
            ValuationAssumptions::default(),
        );
        match calculated_at {
            None => base,
            Some(ts) => base.with_outputs(ValuationOutputs {
                current_eps: Decimal::ONE,
                intrinsic_value_eps: Decimal::TEN,
                current_fcf_per_share: Decimal::ONE,
                intrinsic_value_fcf: Decimal::TEN,
                last_calculated_at: UtcDateTime::parse(ts).expect("ts"),
            }),
        }
    }

    fn symbols(selected: &[TrackedSecurity]) -> Vec<&str> {
        selected.iter().map(|s| s.symbol.as_str()).collect()
    }

    #[test]
    fn never_calculated_then_stalest() {
        let universe = vec![
            security("C", Some("2026-02-19T00:00:00Z")),
            security("B", Some("2026-02-10T00:00:00Z")),
            security("A", None),
        ];

        assert_eq!(symbols(&select(&universe, 2, false)), vec!["A", "B"]);
    }

    #[test]
    fn ties_break_on_symbol() {
        let universe = vec![
            security("ZZ", None),
            security("MM", Some("2026-01-01T00:00:00Z")),
            security("AA", None),
            security("BB", Some("2026-01-01T00:00:00Z")),
        ];

        assert_eq!(
            symbols(&select(&universe, 10, false)),
            vec!["AA", "ZZ", "BB", "MM"]
        );
    }

    #[test]
    fn inactive_securities_are_never_selected() {
        let mut paused = security("A", None);
        paused.is_active = false;
        let universe = vec![paused, security("B", None)];

        assert_eq!(symbols(&select(&universe, 5, false)), vec!["B"]);
        assert_eq!(symbols(&select(&universe, 5, true)), vec!["B"]);
    }

    #[test]
    fn force_all_ignores_limit_and_uses_symbol_order() {
        let universe = vec![
            security("C", None),
            security("A", Some("2026-02-19T00:00:00Z")),
            security("B", Some("2025-01-01T00:00:00Z")),
        ];

        assert_eq!(symbols(&select(&universe, 1, true)), vec!["A", "B", "C"]);
    }

    #[test]
    fn zero_limit_selects_nothing() {
        assert!(select(&[security("A", None)], 0, false).is_empty());
    }
}
