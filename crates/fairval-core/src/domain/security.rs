use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Symbol, UtcDateTime, ValidationError};

/// Which DCF variant supplies a security's effective intrinsic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PreferredMethod {
    Eps,
    Fcf,
}

impl PreferredMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eps => "EPS",
            Self::Fcf => "FCF",
        }
    }
}

impl Display for PreferredMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferredMethod {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "EPS" => Ok(Self::Eps),
            "FCF" => Ok(Self::Fcf),
            _ => Err(ValidationError::InvalidMethod {
                value: value.to_owned(),
            }),
        }
    }
}

/// Operator-set inputs for both DCF variants of one security.
///
/// Rates are percentages (`10` means 10%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationAssumptions {
    pub eps_growth_rate: Decimal,
    pub eps_exit_multiple: Decimal,
    pub fcf_growth_rate: Decimal,
    pub fcf_exit_multiple: Decimal,
    pub required_return_rate: Decimal,
    pub projection_years: i32,
    pub preferred_method: PreferredMethod,
}

impl Default for ValuationAssumptions {
    fn default() -> Self {
        Self {
            eps_growth_rate: Decimal::from(10),
            eps_exit_multiple: Decimal::from(15),
            fcf_growth_rate: Decimal::from(10),
            fcf_exit_multiple: Decimal::from(15),
            required_return_rate: Decimal::from(10),
            projection_years: 5,
            preferred_method: PreferredMethod::Eps,
        }
    }
}

impl ValuationAssumptions {
    /// Decimal places the warehouse keeps for every assumption.
    pub const MAX_SCALE: u32 = 8;

    /// Reject rates or multiples that storage would silently round.
    pub fn check_precision(&self) -> Result<(), ValidationError> {
        let fields = [
            ("eps_growth_rate", self.eps_growth_rate),
            ("eps_exit_multiple", self.eps_exit_multiple),
            ("fcf_growth_rate", self.fcf_growth_rate),
            ("fcf_exit_multiple", self.fcf_exit_multiple),
            ("required_return_rate", self.required_return_rate),
        ];
        match fields
            .into_iter()
            .find(|(_, value)| value.normalize().scale() > Self::MAX_SCALE)
        {
            Some((field, _)) => Err(ValidationError::DecimalTooPrecise {
                field,
                max_scale: Self::MAX_SCALE,
            }),
            None => Ok(()),
        }
    }
}

/// Engine outputs, present only as a complete set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationOutputs {
    pub current_eps: Decimal,
    pub intrinsic_value_eps: Decimal,
    pub current_fcf_per_share: Decimal,
    pub intrinsic_value_fcf: Decimal,
    pub last_calculated_at: UtcDateTime,
}

impl ValuationOutputs {
    pub fn value_for(&self, method: PreferredMethod) -> Decimal {
        match method {
            PreferredMethod::Eps => self.intrinsic_value_eps,
            PreferredMethod::Fcf => self.intrinsic_value_fcf,
        }
    }
}

/// A monitored ticker with its assumptions and, once calculated, its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSecurity {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub is_active: bool,
    pub assumptions: ValuationAssumptions,
    pub outputs: Option<ValuationOutputs>,
}

impl TrackedSecurity {
    pub fn new(symbol: Symbol, assumptions: ValuationAssumptions) -> Self {
        Self {
            symbol,
            name: None,
            is_active: true,
            assumptions,
            outputs: None,
        }
    }

    pub fn with_outputs(mut self, outputs: ValuationOutputs) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn last_calculated_at(&self) -> Option<UtcDateTime> {
        self.outputs.as_ref().map(|outputs| outputs.last_calculated_at)
    }

    pub fn intrinsic_value_eps(&self) -> Option<Decimal> {
        self.outputs.as_ref().map(|outputs| outputs.intrinsic_value_eps)
    }

    pub fn intrinsic_value_fcf(&self) -> Option<Decimal> {
        self.outputs.as_ref().map(|outputs| outputs.intrinsic_value_fcf)
    }

    /// The value selected by `preferred_method`. Never falls back to the other method.
    pub fn effective_intrinsic_value(&self) -> Option<Decimal> {
        match self.assumptions.preferred_method {
            PreferredMethod::Eps => self.intrinsic_value_eps(),
            PreferredMethod::Fcf => self.intrinsic_value_fcf(),
        }
    }
}
