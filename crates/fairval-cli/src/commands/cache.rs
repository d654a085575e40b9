use serde_json::json;

use crate::error::CliError;

use super::{CommandResult, Context};

pub fn purge(context: &Context) -> Result<CommandResult, CliError> {
    let purged = context.cache().purge_expired();
    Ok(CommandResult::ok(json!({ "purged": purged })))
}
