mod booking;
mod locations;
mod rates;

use std::sync::Arc;
use std::time::Duration;

use rentgate_core::{Envelope, Gateway, GatewayConfig, JsonRestSupplier, ReqwestHttpClient};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let config = load_config(cli)?;
    tracing::debug!(
        base_url = %config.base_url,
        single_flight = config.cache.single_flight,
        "configuration loaded"
    );

    let gateway = Gateway::from_config(
        &config,
        JsonRestSupplier::new(),
        Arc::new(ReqwestHttpClient::new()),
    )?;

    match &cli.command {
        Command::Locations => locations::run(&gateway).await,
        Command::Rates(args) => rates::run(&gateway, args).await,
        Command::Book(args) => booking::book(&gateway, args).await,
        Command::Status(args) => booking::status(&gateway, args).await,
        Command::Cancel(args) => booking::cancel(&gateway, args).await,
    }
}

fn load_config(cli: &Cli) -> Result<GatewayConfig, CliError> {
    let config = match &cli.config {
        Some(path) => GatewayConfig::from_json_file(path)?,
        None => GatewayConfig::from_env()?,
    };

    match cli.timeout_ms {
        Some(ms) => {
            let config = config.with_default_timeout(Duration::from_millis(ms));
            config.validate()?;
            Ok(config)
        }
        None => Ok(config),
    }
}

/// Erases the payload type so every command renders through one path.
fn into_value<T: Serialize>(envelope: Envelope<T>) -> Result<Envelope<Value>, CliError> {
    let payload = serde_json::to_value(&envelope.payload)?;
    Ok(Envelope::new(
        payload,
        envelope.supplier_requests,
        envelope.errors,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn timeout_flag_overrides_file_configuration() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"base_url": "https://supplier.test"}}"#).expect("write config");
        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "rentgate",
            "--config",
            path.as_str(),
            "--timeout-ms",
            "1500",
            "locations",
        ])
        .expect("valid arguments");

        let config = load_config(&cli).expect("valid config");

        assert_eq!(config.timeouts.default_ms, 1_500);
    }

    #[test]
    fn zero_timeout_flag_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"base_url": "https://supplier.test"}}"#).expect("write config");
        let path = file.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "rentgate",
            "--config",
            path.as_str(),
            "--timeout-ms",
            "0",
            "locations",
        ])
        .expect("valid arguments");

        let error = load_config(&cli).expect_err("zero timeout");

        assert_eq!(error.exit_code(), 2);
    }
}
