use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Change between two optional values.
///
/// `absolute` is `None` unless both sides are present; `percent` is also
/// `None` when the base is zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueDelta {
    pub from: Option<Decimal>,
    pub to: Option<Decimal>,
    pub absolute: Option<Decimal>,
    pub percent: Option<Decimal>,
}

impl ValueDelta {
    pub fn between(from: Option<Decimal>, to: Option<Decimal>) -> Self {
        let (absolute, percent) = match (from, to) {
            (Some(from), Some(to)) => {
                let absolute = to.checked_sub(from);
                let percent = absolute.and_then(|change| percent_change(change, from));
                (absolute, percent)
            }
            _ => (None, None),
        };

        Self {
            from,
            to,
            absolute,
            percent,
        }
    }
}

fn percent_change(change: Decimal, base: Decimal) -> Option<Decimal> {
    if base.is_zero() {
        return None;
    }
    change
        .checked_div(base.abs())?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|value| value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}
