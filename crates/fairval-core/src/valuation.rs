//! DCF valuation engine.
//!
//! A per-share metric is projected forward at a constant growth rate, a
//! terminal value is attached to the last projected year through an exit
//! multiple, and every amount is discounted back at the required return:
//!
//! ```text
//! projected[i] = base * (1 + g/100)^i                 i = 1..=years
//! terminal     = projected[years] * exit_multiple
//! value        = Σ projected[i] / (1 + r/100)^i  +  terminal / (1 + r/100)^years
//! ```
//!
//! All arithmetic is `Decimal`. Only the final intrinsic value is rounded
//! (2 dp, half away from zero); intermediates keep full precision.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::{PreferredMethod, UtcDateTime, ValuationAssumptions, ValuationOutputs};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValuationError {
    #[error("invalid assumption '{field}': {reason}")]
    InvalidAssumption { field: &'static str, reason: String },
}

impl ValuationError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidAssumption {
            field,
            reason: reason.into(),
        }
    }

    fn overflow(field: &'static str) -> Self {
        Self::invalid(field, "value exceeds the supported decimal range")
    }
}

/// Inputs for one DCF computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DcfInputs {
    pub base_metric: Decimal,
    pub growth_rate_pct: Decimal,
    pub exit_multiple: Decimal,
    pub required_return_pct: Decimal,
    pub years: i32,
}

/// Full breakdown of one DCF computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DcfValuation {
    pub inputs: DcfInputs,
    pub projected: Vec<Decimal>,
    pub present_values: Vec<Decimal>,
    pub terminal_value: Decimal,
    pub terminal_present_value: Decimal,
    pub intrinsic_value: Decimal,
}

/// Both variants computed for one security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityValuation {
    pub eps: DcfValuation,
    pub fcf: DcfValuation,
}

impl SecurityValuation {
    pub fn intrinsic_value(&self, method: PreferredMethod) -> Decimal {
        match method {
            PreferredMethod::Eps => self.eps.intrinsic_value,
            PreferredMethod::Fcf => self.fcf.intrinsic_value,
        }
    }

    pub fn into_outputs(self, calculated_at: UtcDateTime) -> ValuationOutputs {
        ValuationOutputs {
            current_eps: self.eps.inputs.base_metric,
            intrinsic_value_eps: self.eps.intrinsic_value,
            current_fcf_per_share: self.fcf.inputs.base_metric,
            intrinsic_value_fcf: self.fcf.intrinsic_value,
            last_calculated_at: calculated_at,
        }
    }
}

/// `base * (1 + g/100)^i` for `i` in `1..=years`, unrounded.
pub fn project(
    base_metric: Decimal,
    growth_rate_pct: Decimal,
    years: i32,
) -> Result<Vec<Decimal>, ValuationError> {
    let years = validate_years(years)?;
    let factor = rate_factor(growth_rate_pct, "growth_rate")?;

    let mut projected = Vec::with_capacity(years);
    let mut compounded = Decimal::ONE;
    for _ in 0..years {
        compounded = compounded
            .checked_mul(factor)
            .ok_or_else(|| ValuationError::overflow("growth_rate"))?;
        let value = base_metric
            .checked_mul(compounded)
            .ok_or_else(|| ValuationError::overflow("base_metric"))?;
        projected.push(value);
    }
    Ok(projected)
}

/// Run one DCF computation and keep the intermediate amounts.
pub fn calculate(inputs: &DcfInputs) -> Result<DcfValuation, ValuationError> {
    if inputs.required_return_pct <= -Decimal::ONE_HUNDRED {
        return Err(ValuationError::invalid(
            "required_return_rate",
            format!(
                "must be greater than -100, got {}",
                inputs.required_return_pct
            ),
        ));
    }

    let projected = project(inputs.base_metric, inputs.growth_rate_pct, inputs.years)?;
    let discount = rate_factor(inputs.required_return_pct, "required_return_rate")?;

    let mut present_values = Vec::with_capacity(projected.len());
    let mut compounded = Decimal::ONE;
    let mut total = Decimal::ZERO;
    for value in &projected {
        compounded = compounded
            .checked_mul(discount)
            .ok_or_else(|| ValuationError::overflow("required_return_rate"))?;
        let present = value
            .checked_div(compounded)
            .ok_or_else(|| ValuationError::overflow("required_return_rate"))?;
        total = total
            .checked_add(present)
            .ok_or_else(|| ValuationError::overflow("base_metric"))?;
        present_values.push(present);
    }

    // `project` guarantees at least one year.
    let last = projected.last().copied().unwrap_or_default();
    let terminal_value = last
        .checked_mul(inputs.exit_multiple)
        .ok_or_else(|| ValuationError::overflow("exit_multiple"))?;
    let terminal_present_value = terminal_value
        .checked_div(compounded)
        .ok_or_else(|| ValuationError::overflow("required_return_rate"))?;
    let total = total
        .checked_add(terminal_present_value)
        .ok_or_else(|| ValuationError::overflow("exit_multiple"))?;

    Ok(DcfValuation {
        inputs: inputs.clone(),
        projected,
        present_values,
        terminal_value,
        terminal_present_value,
        intrinsic_value: round_currency(total),
    })
}

pub fn intrinsic_value(inputs: &DcfInputs) -> Result<Decimal, ValuationError> {
    calculate(inputs).map(|valuation| valuation.intrinsic_value)
}

/// Round to cents, half away from zero. The result always carries scale 2.
pub fn round_currency(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl ValuationAssumptions {
    pub fn eps_inputs(&self, current_eps: Decimal) -> DcfInputs {
        DcfInputs {
            base_metric: current_eps,
            growth_rate_pct: self.eps_growth_rate,
            exit_multiple: self.eps_exit_multiple,
            required_return_pct: self.required_return_rate,
            years: self.projection_years,
        }
    }

    pub fn fcf_inputs(&self, current_fcf_per_share: Decimal) -> DcfInputs {
        DcfInputs {
            base_metric: current_fcf_per_share,
            growth_rate_pct: self.fcf_growth_rate,
            exit_multiple: self.fcf_exit_multiple,
            required_return_pct: self.required_return_rate,
            years: self.projection_years,
        }
    }
}

/// Run the EPS and FCF variants; fails if either one does.
pub fn value_security(
    assumptions: &ValuationAssumptions,
    current_eps: Decimal,
    current_fcf_per_share: Decimal,
) -> Result<SecurityValuation, ValuationError> {
    let eps = calculate(&assumptions.eps_inputs(current_eps))?;
    let fcf = calculate(&assumptions.fcf_inputs(current_fcf_per_share))?;
    Ok(SecurityValuation { eps, fcf })
}

fn validate_years(years: i32) -> Result<usize, ValuationError> {
    if years <= 0 {
        return Err(ValuationError::invalid(
            "projection_years",
            format!("must be a positive integer, got {years}"),
        ));
    }
    usize::try_from(years).map_err(|_| ValuationError::overflow("projection_years"))
}

fn rate_factor(rate_pct: Decimal, field: &'static str) -> Result<Decimal, ValuationError> {
    rate_pct
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|fraction| Decimal::ONE.checked_add(fraction))
        .ok_or_else(|| ValuationError::overflow(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inputs(
        base: Decimal,
        growth: Decimal,
        multiple: Decimal,
        ret: Decimal,
        years: i32,
    ) -> DcfInputs {
        DcfInputs {
            base_metric: base,
            growth_rate_pct: growth,
            exit_multiple: multiple,
            required_return_pct: ret,
            years,
        }
    }

    #[test]
    fn projection_keeps_full_precision() {
        let projected = project(dec!(5.00), dec!(10), 3).expect("valid projection");
        assert_eq!(projected, vec![dec!(5.50), dec!(6.05), dec!(6.655)]);
    }

    #[test]
    fn negative_growth_declines() {
        let projected = project(dec!(4), dec!(-25), 2).expect("valid projection");
        assert_eq!(projected, vec![dec!(3), dec!(2.25)]);
    }

    #[test]
    fn breakdown_matches_hand_computation() {
        let valuation =
            calculate(&inputs(dec!(5.00), dec!(10), dec!(15), dec!(10), 3)).expect("valid");

        assert_eq!(valuation.present_values, vec![dec!(5), dec!(5), dec!(5)]);
        assert_eq!(valuation.terminal_value, dec!(99.825));
        assert_eq!(valuation.terminal_present_value, dec!(75));
        assert_eq!(valuation.intrinsic_value, dec!(90.00));
    }

    #[test]
    fn single_year_without_discounting() {
        let value =
            intrinsic_value(&inputs(dec!(5.00), dec!(0), dec!(10), dec!(0), 1)).expect("valid");
        assert_eq!(value, dec!(55.00));
    }

    #[test]
    fn rejects_non_positive_years() {
        for years in [0, -3] {
            let err = calculate(&inputs(dec!(1), dec!(5), dec!(10), dec!(10), years))
                .expect_err("years must be positive");
            assert!(matches!(
                err,
                ValuationError::InvalidAssumption {
                    field: "projection_years",
                    ..
                }
            ));
        }
    }

    #[test]
    fn rejects_return_at_or_below_minus_one_hundred() {
        for rate in [dec!(-100), dec!(-150)] {
            let err = calculate(&inputs(dec!(1), dec!(5), dec!(10), rate, 5))
                .expect_err("return must exceed -100");
            assert!(matches!(
                err,
                ValuationError::InvalidAssumption {
                    field: "required_return_rate",
                    ..
                }
            ));
        }
    }

    #[test]
    fn absurd_horizon_is_an_assumption_error_not_a_panic() {
        let err = calculate(&inputs(dec!(1000), dec!(900), dec!(50), dec!(10), 200))
            .expect_err("must overflow");
        assert!(matches!(err, ValuationError::InvalidAssumption { .. }));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_currency(dec!(2.345)), dec!(2.35));
        assert_eq!(round_currency(dec!(-2.345)), dec!(-2.35));
        assert_eq!(round_currency(dec!(2.344999)), dec!(2.34));
    }

    #[test]
    fn either_variant_failing_fails_the_security() {
        let assumptions = ValuationAssumptions {
            projection_years: 0,
            ..ValuationAssumptions::default()
        };
        assert!(value_security(&assumptions, dec!(2), dec!(3)).is_err());
    }
}
