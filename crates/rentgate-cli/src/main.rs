mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

/// Returned when the envelope carries supplier errors.
const EXIT_DEGRADED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    rentgate_core::telemetry::init_tracing(&cli.log_level);

    match execute(&cli).await {
        Ok(code) => code,
        Err(error) => {
            tracing::debug!(?error, "command failed before producing an envelope");
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn execute(cli: &Cli) -> Result<ExitCode, CliError> {
    let envelope = commands::run(cli).await?;
    output::render(&envelope, cli.pretty)?;

    if envelope.has_errors() {
        tracing::info!(errors = envelope.errors.len(), "operation completed with errors");
        return Ok(ExitCode::from(EXIT_DEGRADED));
    }
    Ok(ExitCode::SUCCESS)
}
