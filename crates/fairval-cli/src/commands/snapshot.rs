use fairval_core::{ArchiveOptions, EnvelopeError, SnapshotArchiver};

use crate::cli::SnapshotArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

pub fn run(args: &SnapshotArgs, context: &Context) -> Result<CommandResult, CliError> {
    let archiver = SnapshotArchiver::new(context.store());
    let options = ArchiveOptions {
        date: args.date,
        force: args.force,
        dry_run: args.dry_run,
        symbols: (!args.symbols.is_empty()).then(|| args.symbols.clone()),
    };

    let report = archiver.archive(&options)?;
    let errors = report
        .errors
        .iter()
        .map(|failure| {
            EnvelopeError::new("snapshot.failed", failure.reason.clone())
                .for_symbol(failure.symbol.as_str())
        })
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(&report)?)
        .with_warnings(report.warnings.clone())
        .with_errors(errors))
}
