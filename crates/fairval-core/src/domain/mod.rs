//! # Domain Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, uppercase ticker |
//! | [`TrackedSecurity`] | Monitored ticker: assumptions plus optional outputs |
//! | [`ValuationAssumptions`] | Operator-set DCF inputs for both variants |
//! | [`ValuationOutputs`] | Engine-written values, present only as a full set |
//! | [`PreferredMethod`] | EPS or FCF, selects the effective value |
//! | [`ValuationSnapshot`] | Dated copy of assumptions and outputs |
//! | [`SnapshotDate`] | Period boundary a snapshot is filed under |
//! | [`ValueDelta`] | Null-safe absolute and percent change |
//! | [`UtcDateTime`] | Second-precision UTC timestamp |
//!
//! Making the outputs a single `Option` keeps "never calculated" and "fully
//! calculated" the only representable states.

mod delta;
mod period;
mod security;
mod snapshot;
mod symbol;
mod timestamp;

pub use delta::ValueDelta;
pub use period::SnapshotDate;
pub use security::{PreferredMethod, TrackedSecurity, ValuationAssumptions, ValuationOutputs};
pub use snapshot::ValuationSnapshot;
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
