use fairval_core::{EnvelopeError, RunOptions, RunReport, ValuationOrchestrator};

use crate::cli::CalculateArgs;
use crate::error::CliError;

use super::{CommandResult, Context};

pub async fn run(args: &CalculateArgs, context: &Context) -> Result<CommandResult, CliError> {
    let orchestrator = ValuationOrchestrator::new(context.store(), context.fundamentals_client());
    let options = RunOptions {
        symbols: (!args.symbols.is_empty()).then(|| args.symbols.clone()),
        limit: args.limit,
        force_all: args.force_all,
    };

    let report = orchestrator.run(&options).await?;
    Ok(into_result(&report)?)
}

fn into_result(report: &RunReport) -> Result<CommandResult, serde_json::Error> {
    let warnings = report
        .skipped
        .iter()
        .map(|issue| format!("{} skipped: {}", issue.symbol, issue.reason))
        .collect();
    let errors = report
        .errors
        .iter()
        .map(|issue| {
            EnvelopeError::new("run.security_failed", issue.reason.clone())
                .for_symbol(issue.symbol.as_str())
        })
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(report)?)
        .with_warnings(warnings)
        .with_errors(errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairval_core::{CallStats, SecurityIssue, Symbol, UtcDateTime};

    fn issue(symbol: &str, reason: &str) -> SecurityIssue {
        SecurityIssue {
            symbol: Symbol::parse(symbol).expect("symbol"),
            reason: String::from(reason),
        }
    }

    #[test]
    fn skips_become_warnings_and_failures_become_errors() {
        let now = UtcDateTime::now();
        let report = RunReport {
            started_at: now,
            finished_at: now,
            selected: vec![],
            processed: vec![],
            skipped: vec![issue("KO", "no earnings")],
            errors: vec![issue("PEP", "invalid assumption 'projection_years'")],
            stats: CallStats::default(),
            rate_limited: false,
            deltas: vec![],
        };

        let result = into_result(&report).expect("serializes");
        assert_eq!(result.warnings, vec![String::from("KO skipped: no earnings")]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].symbol.as_deref(), Some("PEP"));
        assert_eq!(result.data["stats"]["api_calls"], 0);
    }
}
