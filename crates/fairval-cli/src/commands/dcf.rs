use fairval_core::valuation::{self, DcfInputs};

use crate::cli::DcfArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &DcfArgs) -> Result<CommandResult, CliError> {
    let inputs = DcfInputs {
        base_metric: args.base,
        growth_rate_pct: args.growth,
        exit_multiple: args.multiple,
        required_return_pct: args.required_return,
        years: args.years,
    };

    let breakdown = valuation::calculate(&inputs)?;
    let mut result = CommandResult::ok(serde_json::to_value(&breakdown)?);
    if inputs.base_metric.is_sign_negative() {
        result = result.with_warning("negative base metric yields a negative intrinsic value");
    }
    Ok(result)
}
