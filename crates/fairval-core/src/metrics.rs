//! Per-share base metrics derived from raw provider payloads.
//!
//! Both metrics are trailing-twelve-month figures: the four most recent
//! quarters by `fiscalDateEnding`. A missing or unparsable value in any of
//! those four quarters is an error rather than a silently smaller sum.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use thiserror::Error;

use crate::source::FundamentalEndpoint;

pub const TTM_QUARTERS: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricsError {
    #[error("{endpoint} payload has no '{field}' list")]
    MissingSeries {
        endpoint: FundamentalEndpoint,
        field: &'static str,
    },
    #[error("{endpoint} has {found} quarterly reports, need 4")]
    InsufficientQuarters {
        endpoint: FundamentalEndpoint,
        found: usize,
    },
    #[error("{endpoint} field '{field}' is missing or not numeric for {period}")]
    InvalidValue {
        endpoint: FundamentalEndpoint,
        field: &'static str,
        period: String,
    },
    #[error("{endpoint} trailing sum of '{field}' is out of range")]
    Overflow {
        endpoint: FundamentalEndpoint,
        field: &'static str,
    },
    #[error("shares outstanding must be positive")]
    NoSharesOutstanding,
}

/// Sum of `reportedEPS` over the last four quarters.
pub fn ttm_eps(earnings: &Value) -> Result<Decimal, MetricsError> {
    let endpoint = FundamentalEndpoint::Earnings;
    let quarters = latest_quarters(earnings, endpoint, "quarterlyEarnings")?;

    quarters.iter().try_fold(Decimal::ZERO, |total, quarter| {
        let eps = decimal_field(quarter, endpoint, "reportedEPS")?;
        total
            .checked_add(eps)
            .ok_or(MetricsError::Overflow {
                endpoint,
                field: "reportedEPS",
            })
    })
}

/// Sum of `operatingCashflow - |capitalExpenditures|` over the last four quarters.
///
/// Capex is an outflow whatever sign the provider reports it with.
pub fn ttm_free_cash_flow(cash_flow: &Value) -> Result<Decimal, MetricsError> {
    let endpoint = FundamentalEndpoint::CashFlow;
    let quarters = latest_quarters(cash_flow, endpoint, "quarterlyReports")?;

    quarters.iter().try_fold(Decimal::ZERO, |total, quarter| {
        let operating = decimal_field(quarter, endpoint, "operatingCashflow")?;
        let capex = decimal_field(quarter, endpoint, "capitalExpenditures")?;
        operating
            .checked_sub(capex.abs())
            .and_then(|free| total.checked_add(free))
            .ok_or(MetricsError::Overflow {
                endpoint,
                field: "operatingCashflow",
            })
    })
}

pub fn shares_outstanding(overview: &Value) -> Result<Decimal, MetricsError> {
    let shares = overview
        .get("SharesOutstanding")
        .and_then(parse_decimal)
        .ok_or(MetricsError::InvalidValue {
            endpoint: FundamentalEndpoint::Overview,
            field: "SharesOutstanding",
            period: String::from("latest"),
        })?;
    if shares <= Decimal::ZERO {
        return Err(MetricsError::NoSharesOutstanding);
    }
    Ok(shares)
}

/// TTM free cash flow divided by shares outstanding, rounded to 4 dp.
pub fn fcf_per_share(cash_flow: &Value, overview: &Value) -> Result<Decimal, MetricsError> {
    let fcf = ttm_free_cash_flow(cash_flow)?;
    let shares = shares_outstanding(overview)?;
    let per_share = fcf
        .checked_div(shares)
        .ok_or(MetricsError::NoSharesOutstanding)?;
    Ok(per_share.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero))
}

fn latest_quarters<'a>(
    payload: &'a Value,
    endpoint: FundamentalEndpoint,
    field: &'static str,
) -> Result<Vec<&'a Value>, MetricsError> {
    let reports = payload
        .get(field)
        .and_then(Value::as_array)
        .ok_or(MetricsError::MissingSeries { endpoint, field })?;

    let mut quarters: Vec<&Value> = reports.iter().collect();
    // ISO dates sort lexically; newest first.
    quarters.sort_by(|a, b| fiscal_date(b).cmp(fiscal_date(a)));
    quarters.truncate(TTM_QUARTERS);

    if quarters.len() < TTM_QUARTERS {
        return Err(MetricsError::InsufficientQuarters {
            endpoint,
            found: quarters.len(),
        });
    }
    Ok(quarters)
}

fn fiscal_date(report: &Value) -> &str {
    report
        .get("fiscalDateEnding")
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn decimal_field(
    report: &Value,
    endpoint: FundamentalEndpoint,
    field: &'static str,
) -> Result<Decimal, MetricsError> {
    report
        .get(field)
        .and_then(parse_decimal)
        .ok_or_else(|| MetricsError::InvalidValue {
            endpoint,
            field,
            period: fiscal_date(report).to_owned(),
        })
}

/// Provider numbers arrive as strings; `"None"` marks a missing value.
fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .ok()
        }
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn earnings(rows: &[(&str, &str)]) -> Value {
        let quarters: Vec<Value> = rows
            .iter()
            .map(|(date, eps)| json!({"fiscalDateEnding": date, "reportedEPS": eps}))
            .collect();
        json!({"symbol": "IBM", "quarterlyEarnings": quarters})
    }

    fn cash_flow(rows: &[(&str, &str, &str)]) -> Value {
        let quarters: Vec<Value> = rows
            .iter()
            .map(|(date, operating, capex)| {
                json!({
                    "fiscalDateEnding": date,
                    "operatingCashflow": operating,
                    "capitalExpenditures": capex,
                })
            })
            .collect();
        json!({"symbol": "IBM", "quarterlyReports": quarters})
    }

    #[test]
    fn ttm_eps_sums_four_newest_quarters_regardless_of_order() {
        let payload = earnings(&[
            ("2024-03-31", "1.68"),
            ("2024-12-31", "3.92"),
            ("2023-12-31", "3.87"),
            ("2024-06-30", "2.43"),
            ("2024-09-30", "2.30"),
        ]);

        assert_eq!(ttm_eps(&payload), Ok(dec!(10.33)));
    }

    #[test]
    fn fewer_than_four_quarters_is_insufficient() {
        let payload = earnings(&[("2024-12-31", "1.0"), ("2024-09-30", "1.0")]);
        assert_eq!(
            ttm_eps(&payload),
            Err(MetricsError::InsufficientQuarters {
                endpoint: FundamentalEndpoint::Earnings,
                found: 2
            })
        );
    }

    #[test]
    fn none_marker_in_window_is_an_error() {
        let payload = earnings(&[
            ("2024-12-31", "1.0"),
            ("2024-09-30", "None"),
            ("2024-06-30", "1.0"),
            ("2024-03-31", "1.0"),
        ]);
        assert!(matches!(
            ttm_eps(&payload),
            Err(MetricsError::InvalidValue { period, .. }) if period == "2024-09-30"
        ));
    }

    #[test]
    fn missing_list_is_reported() {
        assert!(matches!(
            ttm_eps(&json!({"Information": "x"})),
            Err(MetricsError::MissingSeries { .. })
        ));
    }

    #[test]
    fn fcf_per_share_subtracts_capex_and_rounds() {
        let cash_flow = cash_flow(&[
            ("2024-12-31", "4000", "1000"),
            ("2024-09-30", "3000", "-500"),
            ("2024-06-30", "2000", "500"),
            ("2024-03-31", "1000", "0"),
        ]);
        let overview = json!({"SharesOutstanding": "3000"});

        assert_eq!(ttm_free_cash_flow(&cash_flow), Ok(dec!(8000)));
        assert_eq!(fcf_per_share(&cash_flow, &overview), Ok(dec!(2.6667)));
    }

    #[test]
    fn overflowing_eps_quarters_are_an_error() {
        let payload = earnings(&[
            ("2024-12-31", "70000000000000000000000000000"),
            ("2024-09-30", "70000000000000000000000000000"),
            ("2024-06-30", "1.0"),
            ("2024-03-31", "1.0"),
        ]);
        assert_eq!(
            ttm_eps(&payload),
            Err(MetricsError::Overflow {
                endpoint: FundamentalEndpoint::Earnings,
                field: "reportedEPS"
            })
        );
    }

    #[test]
    fn overflowing_cash_flow_is_an_error() {
        let cash_flow = cash_flow(&[
            (
                "2024-12-31",
                "-70000000000000000000000000000",
                "70000000000000000000000000000",
            ),
            ("2024-09-30", "1", "0"),
            ("2024-06-30", "1", "0"),
            ("2024-03-31", "1", "0"),
        ]);
        assert!(matches!(
            ttm_free_cash_flow(&cash_flow),
            Err(MetricsError::Overflow { .. })
        ));
    }

    #[test]
    fn zero_shares_is_rejected() {
        assert_eq!(
            shares_outstanding(&json!({"SharesOutstanding": "0"})),
            Err(MetricsError::NoSharesOutstanding)
        );
        assert!(shares_outstanding(&json!({})).is_err());
    }
}
